use crate::error::{BuildError, BuildResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub type Source = Rc<SourceImpl>;

#[derive(Debug, PartialEq)]
pub struct SourceImpl {
    pub name: String,
    pub content: String,
}

impl SourceImpl {
    pub fn character(&self, number: usize) -> char {
        self.content[number..].chars().next().unwrap_or('\0')
    }

    pub fn length(&self) -> usize {
        self.content.len()
    }

    pub fn lexeme(&self, index: usize, length: usize) -> &str {
        let end = index + length;
        &self.content[index..end]
    }

    pub fn path(&self) -> &Path {
        Path::new(&self.name)
    }
}

pub fn file(path: &Path) -> BuildResult<Source> {
    let content = fs::read_to_string(path).map_err(|source| BuildError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Rc::new(SourceImpl {
        name: path.display().to_string(),
        content,
    }))
}

pub fn text(text: &str) -> Source {
    named("<text>", text)
}

pub fn named(name: &str, text: &str) -> Source {
    Rc::new(SourceImpl {
        name: String::from(name),
        content: String::from(text),
    })
}

#[derive(Clone, Debug)]
pub struct Span {
    pub source: Source,
    pub index: usize,
    pub length: usize,
    pub line: usize,
}

impl Span {
    pub fn new(source: &Source, index: usize, length: usize, line: usize) -> Self {
        Span {
            source: Rc::clone(source),
            index,
            length,
            line,
        }
    }

    /// Zero-length span at the top of a file, for diagnostics about the file as a whole.
    pub fn file_start(source: &Source) -> Self {
        Span::new(source, 0, 0, 1)
    }

    pub fn lexeme(&self) -> &str {
        self.source.lexeme(self.index, self.length)
    }

    pub fn span_to(&self, other: &Span) -> Span {
        let end = other.index + other.length;
        Span::new(&self.source, self.index, end.max(self.index) - self.index, self.line)
    }

    pub fn column(&self) -> usize {
        let before = &self.source.content[..self.index];
        match before.rfind('\n') {
            Some(newline) => before[newline + 1..].chars().count() + 1,
            None => before.chars().count() + 1,
        }
    }

    pub fn entire_line(&self) -> (&str, usize) {
        let content = &self.source.content;
        let start = content[..self.index].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let end = content[self.index..]
            .find('\n')
            .map(|i| i + self.index)
            .unwrap_or(content.len());
        (&content[start..end], self.index - start)
    }

    pub fn location(&self) -> String {
        format!("{}:{}:{}", self.source.name, self.line, self.column())
    }

    pub fn file_path(&self) -> PathBuf {
        PathBuf::from(&self.source.name)
    }
}

impl PartialEq for Span {
    fn eq(&self, other: &Span) -> bool {
        self.source.name == other.source.name
            && self.index == other.index
            && self.length == other.length
            && self.line == other.line
    }
}

pub trait ContainsSpan {
    fn span(&self) -> &Span;
}
