use crate::error::BuildError;
use crate::source::{ContainsSpan, Span};
use colored::*;
use std::fmt;
use std::rc::Rc;

#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub span: Option<Span>,
    pub message: String,
}

impl Diagnostic {
    pub fn error<T: ContainsSpan>(spanned: &T, message: &str) -> Self {
        Diagnostic::error_span(spanned.span().clone(), message)
    }

    pub fn error_span(span: Span, message: &str) -> Self {
        Diagnostic {
            span: Some(span),
            message: String::from(message),
        }
    }

    pub fn bare(message: &str) -> Self {
        Diagnostic {
            span: None,
            message: String::from(message),
        }
    }
}

impl ContainsSpan for Span {
    fn span(&self) -> &Span {
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.span {
            Some(span) => write!(f, "{}: {}", span.location(), self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

pub trait DiagnosticString {
    fn diagnostic_string(&self) -> String;
}

impl DiagnosticString for [Diagnostic] {
    fn diagnostic_string(&self) -> String {
        let lines: Vec<String> = self.iter().map(|d| d.to_string()).collect();
        lines.join("\n")
    }
}

pub trait Reporter {
    fn report(&self, diagnostic: Diagnostic);

    fn report_error(&self, error: &BuildError) {
        match error.diagnostic() {
            Some(diagnostic) => self.report(diagnostic.clone()),
            None => self.report(Diagnostic::bare(&error.to_string())),
        }
    }
}

pub struct DefaultReporter {}

impl DefaultReporter {
    pub fn new() -> Rc<Self> {
        Rc::new(DefaultReporter {})
    }
}

impl Reporter for DefaultReporter {
    fn report(&self, diagnostic: Diagnostic) {
        let header = "• Error:".red().bold();
        eprintln!("\n{} {}\n", header, diagnostic.message);

        if let Some(span) = &diagnostic.span {
            let (line, offset) = span.entire_line();
            eprintln!("  {}", line);

            let offset = (0..offset).map(|_| " ").collect::<String>();
            let underline = (0..span.length.max(1)).map(|_| "^").collect::<String>();
            eprintln!("  {}{}", offset, underline.red());
            eprintln!("  {}\n", span.location());
        }
    }
}
