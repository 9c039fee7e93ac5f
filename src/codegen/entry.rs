use super::assembler::Section;
use super::c_emitter::CEmitter;
use crate::config::*;
use crate::error::{BuildError, BuildResult};
use crate::library::*;
use crate::registry::{FileKind, ParserId, ParserRegistry};
use log::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MainKind {
    /// `fn main()` declared in the top module.
    Declared,
    /// Top-level statements of a single-file program, wrapped into `main__main`.
    Script,
    /// Libraries and repl builds carry no `main`.
    Omitted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestCase {
    pub name: String,
    pub symbol: String,
}

/// What the structural checks learned about the program's entry.
#[derive(Clone, Debug)]
pub struct ProgramShape {
    pub main: MainKind,
    pub tests: Vec<TestCase>,
}

/// Checks the program's entry structure after the declarations sweep and emits init routines
/// and the entry point for the active execution target.
pub struct EntrySynthesizer<'a> {
    config: &'a Config,
    symbols: &'a SymbolTable,
    modules: &'a [Module],
}

impl<'a> EntrySynthesizer<'a> {
    pub fn new(config: &'a Config, symbols: &'a SymbolTable, modules: &'a [Module]) -> Self {
        EntrySynthesizer {
            config,
            symbols,
            modules,
        }
    }

    fn top(&self) -> BuildResult<&'a Module> {
        self.modules
            .iter()
            .find(|m| m.is_top)
            .ok_or_else(|| BuildError::structural(None, "no top module was resolved"))
    }

    fn declares_main(&self, top: &Module) -> Option<&'a Declaration> {
        self.symbols
            .lookup_exact(&top.name, "main")
            .filter(|d| d.as_function().is_some())
    }

    pub fn check(&self, registry: &ParserRegistry, files: &[ParserId]) -> BuildResult<ProgramShape> {
        let top = self.top()?;
        let main = self.declares_main(top);

        let top_parsers: Vec<_> = files
            .iter()
            .map(|id| registry.get(*id))
            .filter(|p| p.module == top.name && p.kind != FileKind::Synthesized)
            .collect();

        let mut script = false;
        for parser in registry.iter() {
            if let Some(statement) = parser.statements().next() {
                if parser.module != top.name {
                    return Err(BuildError::structural(
                        Some(&statement.span),
                        &format!("top-level statement in imported module `{}`", parser.module),
                    ));
                }
                if top_parsers.len() > 1 {
                    return Err(BuildError::structural(
                        Some(&statement.span),
                        "top-level statements are only allowed in single-file programs",
                    ));
                }
                if let Some(main) = main {
                    let message = format!(
                        "top-level statements cannot be combined with fn main (declared at {})",
                        main.span.location()
                    );
                    return Err(BuildError::structural(Some(&statement.span), &message));
                }
                script = true;
            }
        }

        let shape = match self.config.target {
            ExecutionTarget::Library => ProgramShape {
                main: MainKind::Omitted,
                tests: Vec::new(),
            },
            ExecutionTarget::Executable => {
                let kind = if main.is_some() {
                    MainKind::Declared
                } else if script {
                    MainKind::Script
                } else if self.config.repl {
                    MainKind::Omitted
                } else {
                    let span = top_parsers.first().map(|p| p.file_span());
                    return Err(BuildError::structural(
                        span.as_ref(),
                        "function `main` is undeclared in the main module",
                    ));
                };
                ProgramShape {
                    main: kind,
                    tests: Vec::new(),
                }
            }
            ExecutionTarget::Test => {
                if let Some(main) = main {
                    return Err(BuildError::structural(
                        Some(&main.span),
                        "test builds cannot declare fn main",
                    ));
                }
                let tests = self.discover_tests(registry, files);
                if tests.is_empty() {
                    let span = top_parsers.first().map(|p| p.file_span());
                    return Err(BuildError::structural(
                        span.as_ref(),
                        "no test_ functions found in _test.aq files",
                    ));
                }
                ProgramShape {
                    main: MainKind::Omitted,
                    tests,
                }
            }
        };

        debug!(target: "pipeline", "entry shape {:?}, {} tests", shape.main, shape.tests.len());
        Ok(shape)
    }

    fn discover_tests(&self, registry: &ParserRegistry, files: &[ParserId]) -> Vec<TestCase> {
        let mut tests = Vec::new();
        for id in files {
            let parser = registry.get(*id);
            for function in parser.test_functions() {
                tests.push(TestCase {
                    name: String::from(function.name()),
                    symbol: Symbol::in_module(&parser.module, function.name()).mangled(),
                });
            }
        }
        tests
    }

    fn user_init(&self, module: &Module) -> Option<String> {
        if module.is_top && self.config.build_mode() == BuildMode::Program {
            return None;
        }
        self.symbols
            .lookup_exact(&module.name, "init")
            .filter(|d| d.as_function().is_some())
            .map(|d| d.symbol.mangled())
    }

    fn init_consts_name(module: &Module) -> String {
        format!("{}__init_consts", module.mangled())
    }

    /// Routines `_aq_init` calls for `module`, in call order.
    fn init_calls(&self, module: &Module, emitter: &CEmitter) -> Vec<String> {
        let mut calls = Vec::new();
        if module.artifact.is_some() {
            calls.push(EntrySynthesizer::init_consts_name(module));
            return calls;
        }
        if emitter.const_init_lines(&module.name).is_some() {
            calls.push(EntrySynthesizer::init_consts_name(module));
        }
        if let Some(init) = self.user_init(module) {
            calls.push(init);
        }
        calls
    }

    /// Contributes every declaration the entry code needs. Runs before the assembler finalizes.
    pub fn declare(&self, emitter: &mut CEmitter, shape: &ProgramShape) -> BuildResult<()> {
        if self.config.build_mode() == BuildMode::Library {
            let name = EntrySynthesizer::init_consts_name(self.top()?);
            emitter
                .assembler
                .append(Section::FnDecls, &format!("void {}(void);", name));
            return Ok(());
        }

        for module in self.modules {
            let has_consts = module.artifact.is_some()
                || emitter.const_init_lines(&module.name).is_some();
            if has_consts {
                let name = EntrySynthesizer::init_consts_name(module);
                emitter
                    .assembler
                    .append(Section::FnDecls, &format!("void {}(void);", name));
            }
        }

        let assembler = &mut emitter.assembler;
        assembler.append(Section::FnDecls, "void _aq_init(int argc, char** argv);");
        assembler.append(Section::FnDecls, "void _aq_cleanup(void);");

        if shape.main == MainKind::Script {
            let main = Symbol::main_symbol().mangled();
            assembler.append(Section::FnDecls, &format!("void {}(void);", main));
        }

        if self.config.live {
            if self.config.os == Os::Windows {
                assembler.append_once(Section::Includes, "#include <windows.h>");
            } else {
                assembler.append_once(Section::Includes, "#include <dlfcn.h>");
            }
            assembler.append_once(Section::Typedefs, "typedef void (*_aq_main_fn)(void);");
            assembler.append(Section::FnDecls, "void _aq_live_main(void);");
        }

        if self.config.target == ExecutionTarget::Test {
            assembler.append(Section::ConstDecls, "clock_t _aq_test_clock;");
            assembler.append(Section::FnDecls, "void _aq_test_start(const char* name);");
            assembler.append(Section::FnDecls, "void _aq_test_end(const char* name, int ok);");
        }

        Ok(())
    }

    /// Appends init routines and the entry point to the statement stream.
    pub fn emit(&self, emitter: &mut CEmitter, shape: &ProgramShape) -> BuildResult<()> {
        self.emit_const_inits(emitter)?;

        if self.config.build_mode() == BuildMode::Library {
            return Ok(());
        }

        self.emit_init(emitter);
        self.emit_cleanup(emitter);

        if shape.main == MainKind::Script {
            let mut text = format!("\nvoid {}(void) {{\n", Symbol::main_symbol().mangled());
            for line in emitter.script_lines() {
                text.push_str(line);
                text.push('\n');
            }
            text.push('}');
            emitter.assembler.push(&text);
        }

        if self.config.live {
            self.emit_live_shim(emitter);
        }

        match self.config.target {
            ExecutionTarget::Test => self.emit_test_main(emitter, shape),
            ExecutionTarget::Executable if shape.main != MainKind::Omitted => {
                self.emit_program_main(emitter)
            }
            _ => (),
        }
        Ok(())
    }

    fn emit_const_inits(&self, emitter: &mut CEmitter) -> BuildResult<()> {
        if self.config.build_mode() == BuildMode::Library {
            let top = self.top()?;
            let mut text = format!("\nvoid {}(void) {{\n", EntrySynthesizer::init_consts_name(top));
            for line in emitter.const_init_lines(&top.name).unwrap_or_default() {
                text.push_str(&format!("    {}\n", line));
            }
            if let Some(init) = self.user_init(top) {
                text.push_str(&format!("    {}();\n", init));
            }
            text.push('}');
            emitter.assembler.push(&text);
            return Ok(());
        }

        for module in self.modules.iter().filter(|m| m.artifact.is_none()) {
            let lines = match emitter.const_init_lines(&module.name) {
                Some(lines) => lines.to_vec(),
                None => continue,
            };
            let mut text = format!("\nvoid {}(void) {{\n", EntrySynthesizer::init_consts_name(module));
            for line in lines {
                text.push_str(&format!("    {}\n", line));
            }
            text.push('}');
            emitter.assembler.push(&text);
        }
        Ok(())
    }

    fn emit_init(&self, emitter: &mut CEmitter) {
        let mut text = String::from(
            "\nvoid _aq_init(int argc, char** argv) {\n    _aq_argc = argc;\n    _aq_argv = argv;\n    _aq_str_buf = malloc(AQ_STR_BUF_LEN);\n",
        );

        let builtin_first = self
            .modules
            .iter()
            .filter(|m| m.is_builtin())
            .chain(self.modules.iter().filter(|m| !m.is_builtin()));
        for module in builtin_first {
            for call in self.init_calls(module, emitter) {
                text.push_str(&format!("    {}();\n", call));
            }
        }
        text.push('}');
        emitter.assembler.push(&text);
    }

    fn emit_cleanup(&self, emitter: &mut CEmitter) {
        let mut text = String::from("\nvoid _aq_cleanup(void) {\n");
        if self.config.profile {
            text.push_str("    fprintf(stderr, \"%-40s %s\\n\", \"function\", \"calls\");\n");
            for function in emitter.profiled_functions() {
                text.push_str(&format!(
                    "    fprintf(stderr, \"%-40s %llu\\n\", \"{f}\", (unsigned long long)_aq_prof_{f});\n",
                    f = function
                ));
            }
        }
        text.push_str("    free(_aq_str_buf);\n}");
        emitter.assembler.push(&text);
    }

    fn emit_live_shim(&self, emitter: &mut CEmitter) {
        let library = self.config.shared_output().display().to_string().replace('\\', "\\\\");
        let main = Symbol::main_symbol().mangled();
        let text = if self.config.os == Os::Windows {
            format!(
                "\nvoid _aq_live_main(void) {{\n    HMODULE handle = LoadLibraryA(\"{lib}\");\n    if (!handle) {{\n        fprintf(stderr, \"live: cannot load {lib}\\n\");\n        exit(1);\n    }}\n    _aq_main_fn entry = (_aq_main_fn)GetProcAddress(handle, \"{main}\");\n    if (!entry) {{\n        fprintf(stderr, \"live: {main} not found\\n\");\n        exit(1);\n    }}\n    entry();\n    FreeLibrary(handle);\n}}",
                lib = library,
                main = main
            )
        } else {
            format!(
                "\nvoid _aq_live_main(void) {{\n    void* handle = dlopen(\"{lib}\", RTLD_NOW);\n    if (!handle) {{\n        fprintf(stderr, \"live: %s\\n\", dlerror());\n        exit(1);\n    }}\n    _aq_main_fn entry = (_aq_main_fn)dlsym(handle, \"{main}\");\n    if (!entry) {{\n        fprintf(stderr, \"live: %s\\n\", dlerror());\n        exit(1);\n    }}\n    entry();\n    dlclose(handle);\n}}",
                lib = library,
                main = main
            )
        };
        emitter.assembler.push(&text);
    }

    fn emit_program_main(&self, emitter: &mut CEmitter) {
        let call = if self.config.live {
            String::from("_aq_live_main")
        } else {
            Symbol::main_symbol().mangled()
        };
        emitter.assembler.push(&format!(
            "\nint main(int argc, char** argv) {{\n    _aq_init(argc, argv);\n    {}();\n    _aq_cleanup();\n    return 0;\n}}",
            call
        ));
    }

    fn emit_test_main(&self, emitter: &mut CEmitter, shape: &ProgramShape) {
        emitter.assembler.push(
            "\nvoid _aq_test_start(const char* name) {\n    _aq_test_clock = clock();\n}\n\nvoid _aq_test_end(const char* name, int ok) {\n    double ms = (double)(clock() - _aq_test_clock) * 1000.0 / CLOCKS_PER_SEC;\n    printf(\"%s %s (%.3f ms)\\n\", ok ? \"ok  \" : \"FAIL\", name, ms);\n}",
        );

        let mut text = String::from(
            "\nint main(int argc, char** argv) {\n    _aq_init(argc, argv);\n    _aq_testing = 1;\n    int passed = 0;\n    int failed = 0;\n",
        );
        for test in &shape.tests {
            text.push_str("    _aq_test_failed = 0;\n");
            if self.config.stats {
                text.push_str(&format!("    _aq_test_start(\"{}\");\n", test.name));
            }
            text.push_str(&format!("    {}();\n", test.symbol));
            if self.config.stats {
                text.push_str(&format!(
                    "    _aq_test_end(\"{}\", !_aq_test_failed);\n",
                    test.name
                ));
            }
            text.push_str(&format!(
                "    if (_aq_test_failed) {{ failed++; fprintf(stderr, \"FAIL {}\\n\"); }} else {{ passed++; }}\n",
                test.name
            ));
        }
        text.push_str(
            "    printf(\"%d passed, %d failed\\n\", passed, failed);\n    _aq_cleanup();\n    return failed != 0;\n}",
        );
        emitter.assembler.push(&text);
    }
}
