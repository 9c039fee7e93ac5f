use crate::cache::ModuleCache;
use crate::config::*;
use crate::error::{BuildError, BuildResult};
use crate::library::*;
use crate::parsing::ImportDecl;
use crate::registry::{ParserId, ParserRegistry, SOURCE_EXTENSION, TEST_SUFFIX};
use crate::source::Span;
use log::{debug, trace};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Modules in dependency order (builtin first, the top module last) and every file to parse.
pub struct LoadOrder {
    pub modules: Vec<Module>,
    pub files: Vec<ParserId>,
}

impl LoadOrder {
    pub fn top(&self) -> Option<&Module> {
        self.modules.iter().find(|m| m.is_top)
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.name == name)
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name.as_str()).collect()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// Turns import names into directories and files, and the import graph into a load order.
pub struct ModuleResolver<'a> {
    config: &'a Config,
    top_dir: PathBuf,
}

impl<'a> ModuleResolver<'a> {
    pub fn new(config: &'a Config) -> BuildResult<Self> {
        let input = &config.input;
        if !input.exists() {
            return Err(BuildError::Configuration(format!(
                "input {} does not exist",
                input.display()
            )));
        }
        let top_dir = if input.is_dir() {
            input.clone()
        } else {
            input
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        };
        Ok(ModuleResolver { config, top_dir })
    }

    fn search_roots(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.top_dir.as_path())
            .chain(self.config.module_paths.iter().map(PathBuf::as_path))
            .chain(std::iter::once(self.config.lib_root.as_path()))
    }

    /// First existing directory for `module` across the search roots.
    pub fn resolve(&self, module: &str) -> Option<PathBuf> {
        let relative: PathBuf = module.split('.').collect();
        self.search_roots()
            .map(|root| root.join(&relative))
            .find(|candidate| candidate.is_dir())
    }

    pub fn eligible_files(&self, dir: &Path) -> BuildResult<Vec<PathBuf>> {
        let allow_tests = self.config.target == ExecutionTarget::Test && self.is_top_dir(dir);
        let entries = fs::read_dir(dir).map_err(|e| BuildError::io(dir, e))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| BuildError::io(dir, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.is_eligible(&name, allow_tests) {
                files.push(path);
            } else {
                trace!(target: "resolver", "skipping {}", path.display());
            }
        }

        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    fn is_top_dir(&self, dir: &Path) -> bool {
        match (fs::canonicalize(dir), fs::canonicalize(&self.top_dir)) {
            (Ok(dir), Ok(top)) => dir == top,
            _ => false,
        }
    }

    fn is_eligible(&self, name: &str, allow_tests: bool) -> bool {
        let suffix = format!(".{}", SOURCE_EXTENSION);
        let stem = match name.strip_suffix(&suffix) {
            Some(stem) => stem,
            None => return false,
        };
        if name.ends_with(TEST_SUFFIX) {
            return allow_tests;
        }

        let active = self.config.os;
        let foreign = Os::ALL
            .iter()
            .filter(|os| **os != active)
            .any(|os| stem.ends_with(&format!("_{}", os.name())));
        let nix_on_windows = active == Os::Windows && stem.ends_with("_nix");
        !foreign && !nix_on_windows
    }

    fn top_files(&self) -> BuildResult<Vec<PathBuf>> {
        let input = &self.config.input;
        let files = if input.is_dir() {
            self.eligible_files(input)?
        } else {
            vec![input.clone()]
        };
        if files.is_empty() {
            return Err(BuildError::Configuration(format!(
                "no source files in {}",
                input.display()
            )));
        }
        Ok(files)
    }

    /// Programs are always `main`. A library takes the dotted name an importer would use to find
    /// it: `--module-name` if given, else its path below the first search root containing it,
    /// else its declared name, else its directory name.
    fn top_name(&self, registry: &ParserRegistry, ids: &[ParserId]) -> BuildResult<String> {
        if self.config.build_mode() == BuildMode::Program {
            return Ok(String::from(MAIN_MODULE));
        }

        let located = self
            .config
            .module_name
            .clone()
            .or_else(|| self.name_below_search_root());
        let name = match located {
            Some(name) => name,
            None => {
                let declared = ids
                    .iter()
                    .find_map(|id| registry.get(*id).declared_module().map(|m| m.name.clone()));
                return Ok(declared.unwrap_or_else(|| {
                    self.top_dir
                        .canonicalize()
                        .ok()
                        .and_then(|dir| dir.file_name().map(|n| n.to_string_lossy().into_owned()))
                        .unwrap_or_else(|| String::from(MAIN_MODULE))
                }));
            }
        };

        let own = ImportDecl {
            alias: name.rsplit('.').next().unwrap_or(&name).to_string(),
            module: name.clone(),
            span: registry.get(ids[0]).file_span(),
        };
        check_declared_names(&own, registry, ids)?;
        Ok(name)
    }

    fn name_below_search_root(&self) -> Option<String> {
        let dir = self.top_dir.canonicalize().ok()?;
        let roots = self
            .config
            .module_paths
            .iter()
            .chain(std::iter::once(&self.config.lib_root));
        for root in roots {
            let root = match root.canonicalize() {
                Ok(root) => root,
                Err(_) => continue,
            };
            let relative = match dir.strip_prefix(&root) {
                Ok(relative) => relative,
                Err(_) => continue,
            };
            let components: Option<Vec<&str>> =
                relative.components().map(|c| c.as_os_str().to_str()).collect();
            if let Some(components) = components {
                if !components.is_empty() && components.iter().all(|c| is_identifier(c)) {
                    return Some(components.join("."));
                }
            }
        }
        None
    }

    pub fn load_order(
        &self,
        registry: &mut ParserRegistry,
        cache: &mut ModuleCache,
    ) -> BuildResult<LoadOrder> {
        let mut discovery = Discovery::default();

        let top_paths = self.top_files()?;
        let mut top_ids = Vec::new();
        for path in &top_paths {
            let id = registry.get_or_create(path)?;
            registry.scan_imports(id)?;
            top_ids.push(id);
        }
        let top_name = self.top_name(registry, &top_ids)?;
        if self.config.build_mode() == BuildMode::Library {
            cache.set_building(&top_name);
        }
        let top_span = registry.get(top_ids[0]).file_span();
        debug!(target: "resolver", "top module `{}` from {}", top_name, self.config.input.display());

        if top_name != BUILTIN_MODULE {
            let builtin = ImportDecl {
                module: String::from(BUILTIN_MODULE),
                alias: String::from(BUILTIN_MODULE),
                span: top_span.clone(),
            };
            self.discover_builtin(&builtin, registry, cache, &mut discovery)?;
        }

        let mut top = Module::new(&top_name, Some(self.top_dir.clone()), top_paths);
        top.is_top = true;
        for id in &top_ids {
            registry.assign_module(*id, &top_name);
        }
        discovery.add(top, top_ids);

        let mut next = 0;
        while next < discovery.modules.len() {
            self.scan_module(next, registry, cache, &mut discovery)?;
            next += 1;
        }

        let order = discovery.order(&top_name, &top_span)?;
        let mut modules = Vec::new();
        let mut files = Vec::new();
        for index in order {
            modules.push(discovery.modules[index].clone());
            files.extend(discovery.parsers[index].iter().copied());
        }

        for module in &modules {
            debug!(target: "resolver", "{}", module.dump());
        }
        for id in &files {
            debug!(target: "resolver", "file {}", registry.get(*id).path.display());
        }

        Ok(LoadOrder { modules, files })
    }

    fn discover_builtin(
        &self,
        import: &ImportDecl,
        registry: &mut ParserRegistry,
        cache: &mut ModuleCache,
        discovery: &mut Discovery,
    ) -> BuildResult<()> {
        if let Some(artifact) = cache.lookup(BUILTIN_MODULE) {
            return self.add_cached(import, artifact, registry, discovery);
        }
        let dir = self.config.lib_root.join(BUILTIN_MODULE);
        if !dir.is_dir() {
            let message = format!(
                "module `{}` not found under library root {}",
                BUILTIN_MODULE,
                self.config.lib_root.display()
            );
            return Err(BuildError::resolution(&import.span, &message));
        }
        self.add_directory(import, dir, registry, discovery)
    }

    fn scan_module(
        &self,
        index: usize,
        registry: &mut ParserRegistry,
        cache: &mut ModuleCache,
        discovery: &mut Discovery,
    ) -> BuildResult<()> {
        let ids = discovery.parsers[index].clone();
        for id in ids {
            let imports = registry.scan_imports(id)?.imports.clone();
            for import in imports {
                if discovery.modules[index].is_builtin() {
                    let message = format!(
                        "module `{}` cannot import other modules",
                        BUILTIN_MODULE
                    );
                    return Err(BuildError::resolution(&import.span, &message));
                }

                discovery.modules[index].add_import(&import);
                if discovery.index.contains_key(&import.module) {
                    continue;
                }

                trace!(target: "resolver", "{} imports {}", registry.get(id).path.display(), import.module);
                match cache.lookup(&import.module) {
                    Some(artifact) => self.add_cached(&import, artifact, registry, discovery)?,
                    None => self.add_import(&import, registry, discovery)?,
                }
            }
        }
        Ok(())
    }

    fn add_import(
        &self,
        import: &ImportDecl,
        registry: &mut ParserRegistry,
        discovery: &mut Discovery,
    ) -> BuildResult<()> {
        let dir = self.resolve(&import.module).ok_or_else(|| {
            let message = format!("cannot find module `{}`", import.module);
            BuildError::resolution(&import.span, &message)
        })?;
        self.add_directory(import, dir, registry, discovery)
    }

    fn add_directory(
        &self,
        import: &ImportDecl,
        dir: PathBuf,
        registry: &mut ParserRegistry,
        discovery: &mut Discovery,
    ) -> BuildResult<()> {
        let files = self.eligible_files(&dir)?;
        if files.is_empty() {
            let message = format!(
                "module `{}` in {} has no source files",
                import.module,
                dir.display()
            );
            return Err(BuildError::resolution(&import.span, &message));
        }

        let mut ids = Vec::new();
        for path in &files {
            let id = registry.get_or_create(path)?;
            registry.scan_imports(id)?;
            ids.push(id);
        }
        check_declared_names(import, registry, &ids)?;

        for id in &ids {
            registry.assign_module(*id, &import.module);
        }
        discovery.add(Module::new(&import.module, Some(dir), files), ids);
        Ok(())
    }

    fn add_cached(
        &self,
        import: &ImportDecl,
        artifact: crate::cache::CacheArtifact,
        registry: &mut ParserRegistry,
        discovery: &mut Discovery,
    ) -> BuildResult<()> {
        let id = registry.get_or_create(&artifact.header)?;
        registry.scan_imports(id)?;
        check_declared_names(import, registry, &[id])?;
        registry.assign_module(id, &import.module);

        let dir = artifact.header.parent().map(Path::to_path_buf);
        let mut module = Module::new(&import.module, dir, vec![artifact.header.clone()]);
        module.artifact = Some(artifact);
        discovery.add(module, vec![id]);
        Ok(())
    }
}

/// Every file of a module must agree on its `module` line, and that name must match the import.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_declared_names(
    import: &ImportDecl,
    registry: &ParserRegistry,
    ids: &[ParserId],
) -> BuildResult<()> {
    let mut first: Option<(&str, &Path)> = None;
    for id in ids {
        let parser = registry.get(*id);
        let declared = match parser.declared_module() {
            Some(declared) => declared,
            None => continue,
        };

        if let Some((name, path)) = first {
            if name != declared.name {
                let message = format!(
                    "{} declares module `{}` but {} declares `{}`",
                    path.display(),
                    name,
                    parser.path.display(),
                    declared.name
                );
                return Err(BuildError::resolution(&import.span, &message));
            }
        } else {
            first = Some((&declared.name, &parser.path));
        }

        let matches_import =
            declared.name == import.last_component() || declared.name == import.module;
        if !matches_import {
            let message = format!(
                "{} declares module `{}`, expected `{}`",
                parser.path.display(),
                declared.name,
                import.last_component()
            );
            return Err(BuildError::resolution(&import.span, &message));
        }
    }
    Ok(())
}

#[derive(Default)]
struct Discovery {
    modules: Vec<Module>,
    parsers: Vec<Vec<ParserId>>,
    index: HashMap<String, usize>,
}

impl Discovery {
    fn add(&mut self, module: Module, parsers: Vec<ParserId>) {
        self.index.insert(module.name.clone(), self.modules.len());
        self.modules.push(module);
        self.parsers.push(parsers);
    }

    /// Depth-first post-order from builtin, then from the top module.
    fn order(&self, top: &str, top_span: &Span) -> BuildResult<Vec<usize>> {
        let mut marks: HashMap<usize, Visit> = HashMap::new();
        let mut stack: Vec<usize> = Vec::new();
        let mut order = Vec::new();

        for root in &[BUILTIN_MODULE, top] {
            if let Some(index) = self.index.get(*root) {
                self.visit(*index, top_span, &mut marks, &mut stack, &mut order)?;
            }
        }
        Ok(order)
    }

    fn visit(
        &self,
        index: usize,
        via: &Span,
        marks: &mut HashMap<usize, Visit>,
        stack: &mut Vec<usize>,
        order: &mut Vec<usize>,
    ) -> BuildResult<()> {
        match marks.get(&index) {
            Some(Visit::Done) => return Ok(()),
            Some(Visit::InProgress) => {
                let start = stack.iter().position(|i| *i == index).unwrap_or(0);
                let mut cycle: Vec<&str> = stack[start..]
                    .iter()
                    .map(|i| self.modules[*i].name.as_str())
                    .collect();
                cycle.push(&self.modules[index].name);
                let message = format!("import cycle: {}", cycle.join(" -> "));
                return Err(BuildError::resolution(via, &message));
            }
            None => (),
        }

        marks.insert(index, Visit::InProgress);
        stack.push(index);
        for import in &self.modules[index].imports {
            if let Some(dependency) = self.index.get(&import.module) {
                self.visit(*dependency, &import.span, marks, stack, order)?;
            }
        }
        stack.pop();
        marks.insert(index, Visit::Done);
        order.push(index);
        Ok(())
    }
}
