use super::symbol_table::mangle;
use crate::cache::CacheArtifact;
use crate::parsing::ImportDecl;
use std::path::PathBuf;

pub const BUILTIN_MODULE: &str = "builtin";
pub const MAIN_MODULE: &str = "main";

#[derive(Clone, Debug)]
pub struct Module {
    pub name: String,
    pub dir: Option<PathBuf>,
    pub files: Vec<PathBuf>,
    /// Distinct imports across the module's files, in first-import order.
    pub imports: Vec<ImportDecl>,
    pub artifact: Option<CacheArtifact>,
    pub is_top: bool,
}

impl Module {
    pub fn new(name: &str, dir: Option<PathBuf>, files: Vec<PathBuf>) -> Self {
        Module {
            name: String::from(name),
            dir,
            files,
            imports: Vec::new(),
            artifact: None,
            is_top: false,
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.name == BUILTIN_MODULE
    }

    pub fn mangled(&self) -> String {
        mangle(&self.name)
    }

    pub fn add_import(&mut self, import: &ImportDecl) {
        if !self.imports.iter().any(|i| i.module == import.module) {
            self.imports.push(import.clone());
        }
    }

    pub fn dump(&self) -> String {
        let imports: Vec<&str> = self.imports.iter().map(|i| i.module.as_str()).collect();
        let files: Vec<String> = self.files.iter().map(|f| f.display().to_string()).collect();
        format!(
            "{}{} imports [{}] files [{}]",
            self.name,
            if self.artifact.is_some() { " (cached)" } else { "" },
            imports.join(", "),
            files.join(", ")
        )
    }
}
