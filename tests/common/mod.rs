#![allow(dead_code)]

pub use aqc::diagnostic::*;
use aqc::{BuildError, BuildOutput, BuildResult, Config, ExecutionTarget};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

pub type TestResult = std::result::Result<(), String>;

pub const BUILTIN: &str = "module builtin\n\nfn println(s string) {\n    printf(\"%s\\n\", s);\n}\n";

pub mod test_source {

    use aqc::source::{self, Source};

    pub fn new() -> Source {
        source::named("<test>", "")
    }

    pub fn new_text(text: &str) -> Source {
        source::named("<test>", text)
    }
}

pub mod test_span {

    use super::test_source;
    use aqc::source::*;

    pub fn new(index: usize, length: usize) -> Span {
        Span {
            source: test_source::new(),
            index,
            length,
            line: 1,
        }
    }
}

pub mod test_token {

    use super::test_source;
    use aqc::lexing::*;
    use aqc::source::Span;

    pub fn test(kind: TokenKind, text: &str) -> Token {
        let span = Span::new(&test_source::new_text(text), 0, text.len(), 1);
        Token::new(kind, span)
    }

    pub fn four() -> Token {
        test(TokenKind::Number, "4")
    }

    pub fn five() -> Token {
        test(TokenKind::Number, "5")
    }

    pub fn plus() -> Token {
        test(TokenKind::Operator, "+")
    }

    pub fn semicolon() -> Token {
        test(TokenKind::Semicolon, ";")
    }

    pub fn identifier(name: &str) -> Token {
        test(TokenKind::Identifier, name)
    }

    pub fn eof() -> Token {
        test(TokenKind::EOF, "")
    }
}

/// A throwaway project: `lib/builtin/builtin.aq` plus whatever files a test adds.
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let fixture = Fixture {
            dir: tempfile::tempdir().expect("temp dir"),
        };
        fixture.file("lib/builtin/builtin.aq", BUILTIN);
        fixture
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn file(&self, relative: &str, contents: &str) -> &Self {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create fixture dir");
        }
        fs::write(&path, contents).expect("write fixture file");
        self
    }

    /// Config for building `input` (relative to the fixture) into `out/prog`.
    pub fn config(&self, input: &str) -> Config {
        let mut config = Config::new(self.path(input), self.path("lib"));
        config.output = self.path("out/prog");
        config
    }

    pub fn test_config(&self, input: &str) -> Config {
        let mut config = self.config(input);
        config.target = ExecutionTarget::Test;
        config
    }

    pub fn build(&self, config: Config) -> BuildResult<BuildOutput> {
        aqc::build(config)
    }

    pub fn document(&self, config: Config) -> String {
        match self.build(config) {
            Ok(output) => output.document.expect("C document"),
            Err(error) => panic!("build failed: {}", error),
        }
    }

    pub fn error(&self, config: Config) -> BuildError {
        match self.build(config) {
            Ok(_) => panic!("expected the build to fail"),
            Err(error) => error,
        }
    }
}

/// `cc` when one is installed. Tests that compile the generated C skip without it.
pub fn c_compiler() -> Option<String> {
    let found = std::process::Command::new("cc")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false);
    if found {
        Some(String::from("cc"))
    } else {
        println!("skipping: no C compiler on PATH");
        None
    }
}

/// Positions of `needles` in `haystack`, in order. Fails if any is missing or out of order.
pub fn assert_in_order(haystack: &str, needles: &[&str]) -> TestResult {
    let mut from = 0;
    for needle in needles {
        match haystack[from..].find(needle) {
            Some(position) => from += position + needle.len(),
            None => {
                println!("{}", haystack);
                return Err(format!("`{}` missing or out of order", needle));
            }
        }
    }
    Ok(())
}

pub struct DiagnosticCapture {
    diagnostics: Rc<RefCell<Vec<Diagnostic>>>,
}

impl DiagnosticCapture {
    pub fn unwrap(&mut self) -> Vec<Diagnostic> {
        let captured = RefCell::new(Vec::new());
        self.diagnostics.swap(&captured);
        captured.into_inner()
    }
}

pub struct TestReporter {
    diagnostics: Rc<RefCell<Vec<Diagnostic>>>,
}

impl TestReporter {
    pub fn new() -> (Rc<dyn Reporter>, DiagnosticCapture) {
        let diagnostics = Rc::new(RefCell::new(Vec::new()));
        (
            Rc::new(TestReporter {
                diagnostics: Rc::clone(&diagnostics),
            }),
            DiagnosticCapture { diagnostics },
        )
    }
}

impl Reporter for TestReporter {
    fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics.borrow_mut().push(diagnostic);
    }
}

pub fn assert_slices_equal<T, U>(
    kind: &str,
    got: &[T],
    expected: &[T],
    test: U,
    list: &str,
) -> TestResult
where
    T: std::fmt::Display,
    U: Fn(&T, &T) -> bool,
{
    if got.len() != expected.len() {
        let one_line = format!("Expected {} {}, got {}", expected.len(), kind, got.len());
        println!("{}\n{}", &one_line, list);
        return Err(one_line);
    }

    for (lhs, rhs) in got.iter().zip(expected) {
        if !test(lhs, rhs) {
            println!("Expected:\n  {}\nGot:\n  {}", rhs, lhs);
            return Err(String::from("Unexpected item"));
        }
    }

    Ok(())
}
