use aqc::{Config, ExecutionTarget};
use std::fs;

mod common;
use common::*;

const UTIL: &str = "module util\n\npub const LIMIT int = 3;\n\npub fn twice(x int) int {\n    return x * 2;\n}\n\nfn hidden() {\n}\n\nfn init() {\n}\n";

fn library_config(fixture: &Fixture) -> Config {
    let mut config = fixture.config("util");
    config.target = ExecutionTarget::Library;
    config.output = fixture.path("out/util");
    config.cache_root = Some(fixture.path("cache"));
    config
}

fn program_config(fixture: &Fixture) -> Config {
    let mut config = fixture.config("app/main.aq");
    config.cache_root = Some(fixture.path("cache"));
    config
}

fn project() -> Fixture {
    let fixture = Fixture::new();
    fixture.file("util/util.aq", UTIL).file(
        "app/main.aq",
        "import util\n\nfn main() {\n    int n = util.twice(util.LIMIT);\n}\n",
    );
    fixture
}

#[test]
fn library_build_publishes_header() {
    let fixture = project();
    let output = fixture.build(library_config(&fixture)).unwrap();

    let cached = output.cached.expect("cache artifact");
    assert_eq!(cached.header, fixture.path("cache/util/module.aqh"));
    assert_eq!(cached.object, None);

    let header = fs::read_to_string(&cached.header).unwrap();
    assert!(header.starts_with("module util\n"));
    assert!(header.contains("pub const LIMIT int;"));
    assert!(header.contains("pub fn twice(x int) int;"));
    assert!(!header.contains("hidden"));
    assert!(!header.contains("return"));
}

#[test]
fn program_build_uses_cached_module() -> TestResult {
    let fixture = project();
    fixture.build(library_config(&fixture)).unwrap();
    // Source that would no longer compile proves the header, not the source, was read.
    fixture.file("util/util.aq", "module util\n\nbroken {\n");

    let output = fixture.build(program_config(&fixture)).map_err(|e| e.to_string())?;
    let document = output.document.unwrap_or_default();

    assert!(document.contains("extern int util__LIMIT;"));
    assert!(document.contains("int util__twice(int x);"));
    assert!(!document.contains("int util__twice(int x) {"));
    assert!(!document.contains("util__init();"));
    assert!(document.contains("    int n = util__twice(util__LIMIT);"));
    assert_in_order(
        &document,
        &[
            "void util__init_consts(void);",
            "void _aq_init(int argc, char** argv) {",
            "    util__init_consts();",
            "int main(int argc, char** argv) {",
        ],
    )
}

#[test]
fn disabled_cache_compiles_from_source() {
    let fixture = project();
    fixture.build(library_config(&fixture)).unwrap();

    let mut config = program_config(&fixture);
    config.cache_enabled = false;
    // util is not next to app/main.aq, so it has to come from a search path.
    config.module_paths.push(fixture.root().to_path_buf());
    let document = fixture.document(config);

    assert!(document.contains("int util__twice(int x) {"));
    assert!(document.contains("    util__LIMIT = 3;"));
    assert!(document.contains("    util__init();"));
    assert!(!document.contains("extern int util__LIMIT;"));
}

#[test]
fn library_build_ignores_its_own_stale_artifact() {
    let fixture = project();
    fixture.file("cache/util/module.aqh", "module util\n\npub fn stale();\n");

    let output = fixture.build(library_config(&fixture)).unwrap();
    let document = output.document.unwrap();
    assert!(document.contains("int util__twice(int x) {"));
    assert!(!document.contains("stale"));

    let header = fs::read_to_string(fixture.path("cache/util/module.aqh")).unwrap();
    assert!(!header.contains("stale"));
}

#[test]
fn library_without_cache_root_writes_only_c() {
    let fixture = project();
    let mut config = library_config(&fixture);
    config.cache_root = None;

    let output = fixture.build(config).unwrap();
    assert!(output.cached.is_none());
    assert!(fixture.path("out/util.c").is_file());
    assert!(!fixture.path("cache").exists());
}

fn nested_project() -> Fixture {
    let fixture = Fixture::new();
    fixture
        .file("vendor/net/http/http.aq", "module http\n\npub fn get() {\n}\n")
        .file("app/main.aq", "import net.http\n\nfn main() {\n    http.get();\n}\n");
    fixture
}

fn nested_library_config(fixture: &Fixture) -> Config {
    let mut config = fixture.config("vendor/net/http");
    config.target = ExecutionTarget::Library;
    config.output = fixture.path("out/http");
    config.module_paths.push(fixture.path("vendor"));
    config.cache_root = Some(fixture.path("cache"));
    config
}

#[test]
fn nested_library_publishes_under_dotted_name() -> TestResult {
    let fixture = nested_project();
    let output = fixture.build(nested_library_config(&fixture)).map_err(|e| e.to_string())?;

    let cached = output.cached.expect("cache artifact");
    assert_eq!(cached.header, fixture.path("cache/net__http/module.aqh"));
    assert!(output.document.unwrap_or_default().contains("void net__http__get(void) {"));
    assert!(!fixture.path("cache/http").exists());

    // The program no longer sees the sources: only the cache can satisfy `net.http`.
    let document = fixture.document(program_config(&fixture));
    assert!(document.contains("void net__http__get(void);"));
    assert!(!document.contains("void net__http__get(void) {"));
    assert_in_order(&document, &["void main__main(void) {", "    net__http__get();"])
}

#[test]
fn explicit_module_name_overrides_location() {
    let fixture = Fixture::new();
    fixture.file("http/http.aq", "module http\n\npub fn get() {\n}\n");

    let mut config = fixture.config("http");
    config.target = ExecutionTarget::Library;
    config.output = fixture.path("out/http");
    config.cache_root = Some(fixture.path("cache"));
    config.module_name = Some(String::from("net.http"));

    let output = fixture.build(config).unwrap();
    assert_eq!(output.cached.unwrap().header, fixture.path("cache/net__http/module.aqh"));
}

#[test]
fn library_declaring_another_name_is_rejected() {
    let fixture = nested_project();
    fixture.file("vendor/net/http/http.aq", "module web\n\npub fn get() {\n}\n");

    let error = fixture.error(nested_library_config(&fixture));
    assert!(error.message().contains("declares module `web`, expected `http`"));
    assert!(!fixture.path("cache/net__http").exists());
}
