use crate::config::Config;
use crate::error::{BuildError, BuildResult};
use crate::library::mangle;
use crate::parsing::*;
use log::{debug, trace};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const HEADER_FILE: &str = "module.aqh";
pub const OBJECT_FILE: &str = "module.o";

/// A precompiled module: its declarations-only header and, when a compiler ran, its object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheArtifact {
    pub header: PathBuf,
    pub object: Option<PathBuf>,
}

/// Maps module names to artifacts under `<root>/<mangled module>/`.
pub struct ModuleCache {
    root: Option<PathBuf>,
    enabled: bool,
    building: Option<String>,
}

impl ModuleCache {
    pub fn new(config: &Config) -> Self {
        ModuleCache {
            root: config.cache_root.clone(),
            enabled: config.caching(),
            building: None,
        }
    }

    pub fn disabled() -> Self {
        ModuleCache {
            root: None,
            enabled: false,
            building: None,
        }
    }

    /// The library module under construction never reads its own stale artifact.
    pub fn set_building(&mut self, module: &str) {
        self.building = Some(String::from(module));
    }

    pub fn module_dir(&self, module: &str) -> Option<PathBuf> {
        self.root.as_ref().map(|root| root.join(mangle(module)))
    }

    pub fn lookup(&self, module: &str) -> Option<CacheArtifact> {
        if !self.enabled || self.building.as_deref() == Some(module) {
            return None;
        }
        let dir = self.module_dir(module)?;
        let header = dir.join(HEADER_FILE);
        if !header.is_file() {
            trace!(target: "cache", "miss {}", module);
            return None;
        }

        let object = dir.join(OBJECT_FILE);
        let object = if object.is_file() { Some(object) } else { None };
        debug!(target: "cache", "hit {} at {}", module, dir.display());
        Some(CacheArtifact { header, object })
    }

    /// Publishes a module's artifact. Every file is written to a temporary sibling and renamed
    /// into place, so a reader sees either the old file or the new one.
    pub fn store(
        &self,
        module: &str,
        header_text: &str,
        object: Option<&Path>,
    ) -> BuildResult<Option<CacheArtifact>> {
        let dir = match self.module_dir(module) {
            Some(dir) => dir,
            None => return Ok(None),
        };
        fs::create_dir_all(&dir).map_err(|e| BuildError::io(&dir, e))?;

        let cached_object = match object {
            Some(object) => {
                let bytes = fs::read(object).map_err(|e| BuildError::io(object, e))?;
                let target = dir.join(OBJECT_FILE);
                publish(&target, &bytes)?;
                Some(target)
            }
            None => {
                let stale = dir.join(OBJECT_FILE);
                match fs::remove_file(&stale) {
                    Ok(()) => trace!(target: "cache", "removed stale {}", stale.display()),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(BuildError::io(&stale, e)),
                }
                None
            }
        };

        let header = dir.join(HEADER_FILE);
        publish(&header, header_text.as_bytes())?;

        debug!(target: "cache", "stored {} at {}", module, dir.display());
        Ok(Some(CacheArtifact {
            header,
            object: cached_object,
        }))
    }
}

fn publish(path: &Path, bytes: &[u8]) -> BuildResult<()> {
    let temp = path.with_extension(format!("{}.tmp", std::process::id()));
    fs::write(&temp, bytes).map_err(|e| BuildError::io(&temp, e))?;
    fs::rename(&temp, path).map_err(|e| BuildError::io(path, e))
}

/// Renders the public surface of a module as a header: `module` line, imports, and every
/// `pub` item without bodies or values.
pub fn header_text<'a>(
    module: &str,
    imports: &[ImportDecl],
    items: impl Iterator<Item = &'a Item>,
) -> String {
    let mut text = format!("module {}\n", module);
    for import in imports {
        text.push_str(&format!("import {} as {}\n", import.module, import.alias));
    }

    for item in items.filter(|item| item.is_public()) {
        text.push('\n');
        match &item.kind {
            ItemKind::Function(decl) => {
                text.push_str(&format!("pub {};\n", signature(decl)));
            }
            ItemKind::Struct(decl) => {
                text.push_str(&format!("pub struct {} {{\n", decl.name.lexeme()));
                for field in &decl.fields {
                    text.push_str(&format!("    {} {}\n", field.name.lexeme(), field.param_type));
                }
                text.push_str("}\n");
            }
            ItemKind::Interface(decl) => {
                text.push_str(&format!("pub interface {} {{\n", decl.name.lexeme()));
                for method in &decl.methods {
                    text.push_str(&format!("    {};\n", signature(method)));
                }
                text.push_str("}\n");
            }
            ItemKind::Const(decl) => {
                text.push_str(&format!(
                    "pub const {} {};\n",
                    decl.name.lexeme(),
                    decl.const_type
                ));
            }
            ItemKind::Include(..) | ItemKind::Define(..) | ItemKind::Statement(..) => (),
        }
    }
    text
}

fn signature(decl: &FunctionDecl) -> String {
    let params: Vec<String> = decl
        .parameters
        .iter()
        .map(|p| format!("{} {}", p.name.lexeme(), p.param_type))
        .collect();
    let mut signature = format!("fn {}({})", decl.name(), params.join(", "));
    if let Some(return_type) = &decl.return_type {
        signature.push_str(&format!(" {}", return_type));
    }
    signature
}
