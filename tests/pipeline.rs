use aqc::{BuildError, ExecutionTarget, Os};
use pretty_assertions::assert_eq;

mod common;
use common::*;

#[test]
fn executable_inits_once_then_runs_main() -> TestResult {
    let fixture = Fixture::new();
    fixture.file(
        "main.aq",
        "const LIMIT int = 10;\n\nfn main() {\n    println(\"start\");\n}\n",
    );

    let document = fixture.document(fixture.config("main.aq"));
    assert_eq!(document.matches("    _aq_init(argc, argv);").count(), 1);
    assert_eq!(document.matches("    main__main();").count(), 1);
    assert!(document.contains("int main__LIMIT;"));
    assert_in_order(
        &document,
        &[
            "void main__init_consts(void) {",
            "    main__LIMIT = 10;",
            "void _aq_init(int argc, char** argv) {",
            "    _aq_str_buf = malloc(AQ_STR_BUF_LEN);",
            "    main__init_consts();",
            "int main(int argc, char** argv) {",
            "    _aq_init(argc, argv);",
            "    main__main();",
            "    _aq_cleanup();",
            "    return 0;",
        ],
    )
}

#[test]
fn sections_precede_bodies_in_fixed_order() -> TestResult {
    let fixture = Fixture::new();
    fixture.file(
        "main.aq",
        "#include <math.h>\n#define SCALE 2\n\nstruct Point {\n    x int\n    y int\n}\n\ninterface Shape {\n    fn area() f64\n}\n\nconst ORIGIN int = 0;\n\nfn main() {\n}\n",
    );

    let document = fixture.document(fixture.config("main.aq"));
    assert_in_order(
        &document,
        &[
            "// defines",
            "#define SCALE 2",
            "// includes",
            "#include <math.h>",
            "// typedefs",
            "typedef struct main__Point main__Point;",
            "// type definitions",
            "struct main__Point {",
            "// str helpers",
            "string main__Point_str(main__Point _it);",
            "// function declarations",
            "void main__main(void);",
            "// interface tables",
            "    double (*area)(void* _self);",
            "// constants",
            "int main__ORIGIN;",
            "void main__main(void) {",
        ],
    )
}

#[test]
fn includes_are_deduplicated() {
    let fixture = Fixture::new();
    fixture
        .file("proj/a.aq", "#include <math.h>\n\nfn main() {\n}\n")
        .file("proj/b.aq", "#include <math.h>\n\nfn other() {\n}\n");

    let document = fixture.document(fixture.config("proj"));
    assert_eq!(document.matches("#include <math.h>").count(), 1);
}

#[test]
fn str_helpers_are_generated_for_structs() -> TestResult {
    let fixture = Fixture::new();
    fixture.file(
        "main.aq",
        "struct Point {\n    x int\n    label string\n}\n\nfn main() {\n}\n",
    );

    let document = fixture.document(fixture.config("main.aq"));
    assert_in_order(
        &document,
        &[
            "string main__Point_str(main__Point _it) {",
            "    string _buf = malloc(AQ_STR_BUF_LEN);",
            "    snprintf(_buf, AQ_STR_BUF_LEN, \"Point{x: %d, label: '%s'}\", _it.x, _it.label);",
            "    return _buf;",
        ],
    )
}

#[test]
fn user_written_str_helper_wins() {
    let fixture = Fixture::new();
    fixture.file(
        "main.aq",
        "struct Point {\n    x int\n}\n\nfn Point_str(p Point) string {\n    return \"point\";\n}\n\nfn main() {\n}\n",
    );

    let document = fixture.document(fixture.config("main.aq"));
    assert_eq!(document.matches("string main__Point_str(main__Point p) {").count(), 1);
    assert!(!document.contains("_it"));
}

#[test]
fn single_file_script_gets_a_main() -> TestResult {
    let fixture = Fixture::new();
    fixture.file("script.aq", "println(\"hello\");\nprintln(\"again\");\n");

    let document = fixture.document(fixture.config("script.aq"));
    assert_in_order(
        &document,
        &[
            "void main__main(void);",
            "void main__main(void) {",
            "    println(\"hello\");",
            "    println(\"again\");",
            "int main(int argc, char** argv) {",
            "    main__main();",
        ],
    )
}

#[test]
fn script_statements_need_a_single_file() {
    let fixture = Fixture::new();
    fixture
        .file("proj/a.aq", "println(\"hello\");\n")
        .file("proj/b.aq", "fn helper() {\n}\n");

    let error = fixture.error(fixture.config("proj"));
    assert!(matches!(error, BuildError::Structural(_)));
}

#[test]
fn script_statements_conflict_with_main() {
    let fixture = Fixture::new();
    fixture.file("main.aq", "println(\"hello\");\n\nfn main() {\n}\n");

    let error = fixture.error(fixture.config("main.aq"));
    assert!(matches!(error, BuildError::Structural(_)));
    assert!(error.message().contains("fn main"));
}

#[test]
fn missing_main_is_structural() {
    let fixture = Fixture::new();
    fixture.file("main.aq", "fn helper() {\n}\n");

    let error = fixture.error(fixture.config("main.aq"));
    assert!(matches!(error, BuildError::Structural(_)));
    assert!(error.message().contains("main"));
    assert!(!fixture.path("out/prog.c").exists());
}

#[test]
fn repl_builds_omit_main() {
    let fixture = Fixture::new();
    fixture.file("main.aq", "fn helper() {\n}\n");

    let mut config = fixture.config("main.aq");
    config.repl = true;
    let document = fixture.document(config);
    assert!(document.contains("void _aq_init(int argc, char** argv) {"));
    assert!(!document.contains("int main("));
}

#[test]
fn test_harness_runs_tests_in_discovery_order() -> TestResult {
    let fixture = Fixture::new();
    fixture
        .file("proj/math.aq", "fn double(x int) int {\n    return x * 2;\n}\n")
        .file(
            "proj/math_test.aq",
            "fn test_double() {\n    assert(double(2) == 4);\n}\n\nfn helper() {\n}\n\nfn test_zero() {\n    assert(double(0) == 0);\n}\n",
        );

    let document = fixture.document(fixture.test_config("proj"));
    assert_eq!(document.matches("    _aq_test_failed = 0;").count(), 2);
    assert!(!document.contains("    main__helper();"));
    assert!(document.contains("    AQ_ASSERT(main__double(2) == 4);"));
    assert_in_order(
        &document,
        &[
            "int main(int argc, char** argv) {",
            "    _aq_init(argc, argv);",
            "    main__test_double();",
            "    main__test_zero();",
            "    return failed != 0;",
        ],
    )
}

#[test]
fn test_stats_bracket_each_test() -> TestResult {
    let fixture = Fixture::new();
    fixture.file("proj/a_test.aq", "fn test_one() {\n}\n");

    let mut config = fixture.test_config("proj");
    config.stats = true;
    let document = fixture.document(config);
    assert_in_order(
        &document,
        &[
            "    _aq_test_start(\"test_one\");",
            "    main__test_one();",
            "    _aq_test_end(\"test_one\", !_aq_test_failed);",
        ],
    )
}

#[test]
fn test_build_without_tests_fails() {
    let fixture = Fixture::new();
    fixture
        .file("proj/a.aq", "fn helper() {\n}\n")
        .file("proj/a_test.aq", "fn not_a_test() {\n}\n");

    let error = fixture.error(fixture.test_config("proj"));
    assert!(matches!(error, BuildError::Structural(_)));
}

#[test]
fn test_build_rejects_main() {
    let fixture = Fixture::new();
    fixture
        .file("proj/a.aq", "fn main() {\n}\n")
        .file("proj/a_test.aq", "fn test_one() {\n}\n");

    let error = fixture.error(fixture.test_config("proj"));
    assert!(matches!(error, BuildError::Structural(_)));
    assert!(error.message().contains("main"));
}

#[test]
fn test_files_are_ignored_outside_test_builds() {
    let fixture = Fixture::new();
    fixture
        .file("proj/a.aq", "fn main() {\n}\n")
        .file("proj/a_test.aq", "fn test_one() {\n}\n");

    let document = fixture.document(fixture.config("proj"));
    assert!(!document.contains("test_one"));
}

#[test]
fn library_has_one_initializer_and_no_main() -> TestResult {
    let fixture = Fixture::new();
    fixture.file(
        "util/util.aq",
        "module util\n\npub const LIMIT int = 3;\n\npub fn twice(x int) int {\n    return x * 2;\n}\n\nfn init() {\n}\n",
    );

    let mut config = fixture.config("util");
    config.target = ExecutionTarget::Library;
    let document = fixture.document(config);

    assert_eq!(document.matches("__init_consts(void) {").count(), 1);
    assert!(!document.contains("int main("));
    assert!(!document.contains("_aq_init"));
    assert!(document.contains("void println(string s);"));
    assert!(!document.contains("void println(string s) {"));
    assert_in_order(
        &document,
        &[
            "int util__twice(int x) {",
            "void util__init_consts(void) {",
            "    util__LIMIT = 3;",
            "    util__init();",
        ],
    )
}

#[test]
fn struct_fields_by_value_are_defined_first() -> TestResult {
    let fixture = Fixture::new();
    fixture.file(
        "main.aq",
        "struct Outer {\n    inner Inner\n    next &Outer\n}\n\nstruct Node {\n    outer &Outer\n}\n\nstruct Inner {\n    x int\n}\n\nfn main() {\n}\n",
    );

    let document = fixture.document(fixture.config("main.aq"));
    assert_eq!(document.matches("struct main__Outer {").count(), 1);
    assert_in_order(
        &document,
        &[
            "// type definitions",
            "struct main__Inner {",
            "struct main__Outer {",
            "    main__Inner inner;",
            "struct main__Node {",
        ],
    )
}

#[test]
fn library_refers_to_runtime_globals_without_defining_them() {
    let fixture = Fixture::new();
    fixture.file("util/util.aq", "module util\n\npub fn twice(x int) int {\n    return x * 2;\n}\n");

    let mut config = fixture.config("util");
    config.target = ExecutionTarget::Library;
    let document = fixture.document(config);

    for global in &["int _aq_argc;", "char** _aq_argv;", "char* _aq_str_buf;", "int _aq_testing;", "int _aq_test_failed;"] {
        assert!(document.contains(&format!("extern {}", global)), "missing extern {}", global);
    }
    assert!(!document.contains("int _aq_testing = 0;"));
    assert!(document.contains("void _aq_assert_failed(const char* cond, const char* file, int line);"));
    assert!(!document.contains("void _aq_assert_failed(const char* cond, const char* file, int line) {"));
}

#[test]
fn program_defines_runtime_globals() {
    let fixture = Fixture::new();
    fixture.file("main.aq", "fn main() {\n}\n");

    let document = fixture.document(fixture.config("main.aq"));
    assert!(document.contains("int _aq_testing = 0;"));
    assert!(!document.contains("extern int _aq_argc;"));
    assert!(document.contains("void _aq_assert_failed(const char* cond, const char* file, int line) {"));
}

#[test]
fn module_init_runs_after_builtin() -> TestResult {
    let fixture = Fixture::new();
    fixture
        .file("lib/builtin/consts.aq", "module builtin\n\nconst VERSION int = 1;\n")
        .file("proj/main.aq", "import store\n\nfn main() {\n}\n")
        .file("proj/store/store.aq", "module store\n\nfn init() {\n}\n");

    let document = fixture.document(fixture.config("proj/main.aq"));
    assert!(!document.contains("main__init();"));
    assert_in_order(
        &document,
        &[
            "void _aq_init(int argc, char** argv) {",
            "    builtin__init_consts();",
            "    store__init();",
            "}",
        ],
    )
}

#[test]
fn go_statements_spawn_threads() -> TestResult {
    let fixture = Fixture::new();
    fixture.file(
        "main.aq",
        "fn worker(id int, name string) {\n}\n\nfn main() {\n    go worker(1, \"first\");\n}\n",
    );

    let document = fixture.document(fixture.config("main.aq"));
    assert!(document.contains("#include <pthread.h>"));
    assert_in_order(
        &document,
        &[
            "// thread arguments",
            "typedef struct thread_arg_main__worker {",
            "    int arg0;",
            "    string arg1;",
            "void* main__worker_thread_wrapper(thread_arg_main__worker* arg) {",
            "    main__worker(arg->arg0, arg->arg1);",
            "void main__main(void) {",
            "_go_arg->arg0 = 1; _go_arg->arg1 = \"first\";",
            "pthread_create(&_go_thread, NULL, (void* (*)(void*))main__worker_thread_wrapper, _go_arg);",
        ],
    )
}

#[test]
fn go_checks_argument_count() {
    let fixture = Fixture::new();
    fixture.file(
        "main.aq",
        "fn worker(id int) {\n}\n\nfn main() {\n    go worker();\n}\n",
    );

    let error = fixture.error(fixture.config("main.aq"));
    assert!(matches!(error, BuildError::Parse(_)));
}

#[test]
fn profiling_counts_calls() -> TestResult {
    let fixture = Fixture::new();
    fixture.file("main.aq", "fn main() {\n}\n");

    let mut config = fixture.config("main.aq");
    config.profile = true;
    let document = fixture.document(config);
    assert_in_order(
        &document,
        &[
            "// profiling counters",
            "uint64_t _aq_prof_main__main = 0;",
            "void main__main(void) {",
            "    _aq_prof_main__main++;",
            "void _aq_cleanup(void) {",
            "(unsigned long long)_aq_prof_main__main);",
        ],
    )
}

#[test]
fn profiling_section_is_absent_by_default() {
    let fixture = Fixture::new();
    fixture.file("main.aq", "fn main() {\n}\n");

    let document = fixture.document(fixture.config("main.aq"));
    assert!(!document.contains("// profiling counters"));
    assert!(!document.contains("_aq_prof_"));
}

#[test]
fn live_mode_loads_main_from_shared_library() -> TestResult {
    let fixture = Fixture::new();
    fixture.file("main.aq", "fn main() {\n}\n");

    let mut config = fixture.config("main.aq");
    config.os = Os::Linux;
    config.live = true;
    let document = fixture.document(config);

    assert!(document.contains("#include <dlfcn.h>"));
    assert!(document.contains("prog.so"));
    assert_in_order(
        &document,
        &[
            "typedef void (*_aq_main_fn)(void);",
            "void _aq_live_main(void) {",
            "dlsym(handle, \"main__main\");",
            "int main(int argc, char** argv) {",
            "    _aq_live_main();",
        ],
    )
}

#[test]
fn qualified_names_must_exist() {
    let fixture = Fixture::new();
    fixture
        .file("proj/main.aq", "import a\n\nfn main() {\n    a.nothing();\n}\n")
        .file("proj/a/a.aq", "module a\n\npub fn something() {\n}\n");

    let error = fixture.error(fixture.config("proj/main.aq"));
    assert!(matches!(error, BuildError::Parse(_)));
    assert_eq!(error.message(), "unknown symbol `a.nothing`");
}

#[test]
fn redefinitions_are_rejected() {
    let fixture = Fixture::new();
    fixture
        .file("proj/a.aq", "fn main() {\n}\n")
        .file("proj/b.aq", "fn main() {\n}\n");

    let error = fixture.error(fixture.config("proj"));
    assert!(matches!(error, BuildError::Parse(_)));
    assert!(error.message().contains("redefinition of `main`"));
}

#[test]
fn builds_are_deterministic() {
    let fixture = Fixture::new();
    fixture
        .file("proj/main.aq", "import a\n\nstruct P {\n    x int\n}\n\nfn main() {\n    a.f();\n}\n")
        .file("proj/a/a.aq", "module a\n\npub const N int = 2;\n\npub fn f() {\n}\n");

    let first = fixture.document(fixture.config("proj/main.aq"));
    let second = fixture.document(fixture.config("proj/main.aq"));
    assert_eq!(first, second);
    assert_eq!(first.matches("// function declarations").count(), 1);
}
