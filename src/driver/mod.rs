pub mod toolchain;

use crate::cache::{self, CacheArtifact, ModuleCache};
use crate::codegen::entry::{EntrySynthesizer, ProgramShape};
use crate::codegen::helpers::HelperQueue;
use crate::codegen::{CEmitter, CodeEmitter, NativeEmitter};
use crate::config::*;
use crate::error::{BuildError, BuildResult};
use crate::library::*;
use crate::registry::{FileKind, ParserId, ParserRegistry, Pass, PassContext};
use crate::resolver::{LoadOrder, ModuleResolver};
use log::{debug, info};
use std::path::PathBuf;
use toolchain::Toolchain;

/// Everything one invocation owns. Built once by `Builder::new` and threaded through every step.
pub struct CompilationContext {
    pub config: Config,
    pub registry: ParserRegistry,
    pub cache: ModuleCache,
    pub symbols: SymbolTable,
}

impl CompilationContext {
    fn new(config: Config) -> Self {
        let cache = match config.backend {
            Backend::C => ModuleCache::new(&config),
            Backend::Native => ModuleCache::disabled(),
        };
        CompilationContext {
            config,
            registry: ParserRegistry::new(),
            cache,
            symbols: SymbolTable::new(),
        }
    }

    fn resolve(&mut self) -> BuildResult<LoadOrder> {
        let resolver = ModuleResolver::new(&self.config)?;
        resolver.load_order(&mut self.registry, &mut self.cache)
    }

    /// Advances every file to `pass`, in load order.
    fn sweep(
        &mut self,
        files: &[ParserId],
        pass: Pass,
        emitter: &mut dyn CodeEmitter,
        helpers: &mut HelperQueue,
        building: Option<&str>,
    ) -> BuildResult<()> {
        let mut ctx = PassContext {
            symbols: &mut self.symbols,
            emitter,
            helpers,
            building,
        };
        for id in files {
            self.registry.advance(*id, pass, &mut ctx)?;
        }
        debug!(target: "pipeline", "{:?} sweep over {} files", pass, files.len());
        Ok(())
    }
}

#[derive(Debug)]
pub struct BuildOutput {
    /// The generated C file or native image.
    pub artifact: PathBuf,
    /// The compiled program when a compiler ran.
    pub executable: Option<PathBuf>,
    /// Generated C; `None` for the native backend.
    pub document: Option<String>,
    pub cached: Option<CacheArtifact>,
    /// Module names in load order.
    pub modules: Vec<String>,
}

/// Runs one build. The backend is chosen here, once, from the configuration.
pub struct Builder {
    context: CompilationContext,
}

impl Builder {
    pub fn new(config: Config) -> BuildResult<Self> {
        config.validate()?;
        Ok(Builder {
            context: CompilationContext::new(config),
        })
    }

    pub fn context(&self) -> &CompilationContext {
        &self.context
    }

    pub fn build(&mut self) -> BuildResult<BuildOutput> {
        match self.context.config.backend {
            Backend::C => self.build_c(),
            Backend::Native => self.build_native(),
        }
    }

    fn build_c(&mut self) -> BuildResult<BuildOutput> {
        let context = &mut self.context;
        let order = context.resolve()?;
        let top = order
            .top()
            .map(|m| m.name.clone())
            .ok_or_else(|| BuildError::structural(None, "no top module was resolved"))?;
        let building = match context.config.build_mode() {
            BuildMode::Library => Some(top.as_str()),
            BuildMode::Program => None,
        };

        let mut emitter = CEmitter::new(context.config.profile, context.config.build_mode());
        let mut helpers = HelperQueue::new(true);

        context.sweep(&order.files, Pass::Declarations, &mut emitter, &mut helpers, building)?;

        let blobs = helpers.synthesize(&context.symbols)?;
        let mut blob_ids = Vec::new();
        for (module, text) in &blobs {
            blob_ids.push(context.registry.register_virtual(module, text));
        }
        context.sweep(&blob_ids, Pass::Declarations, &mut emitter, &mut helpers, building)?;

        let shape = self.check_entry(&order)?;
        let context = &mut self.context;

        context.sweep(&order.files, Pass::Bodies, &mut emitter, &mut helpers, building)?;
        context.sweep(&blob_ids, Pass::Bodies, &mut emitter, &mut helpers, building)?;

        let entry = EntrySynthesizer::new(&context.config, &context.symbols, &order.modules);
        entry.declare(&mut emitter, &shape)?;
        emitter.finalize();
        entry.emit(&mut emitter, &shape)?;

        let document = emitter.assembler.document();
        let c_file = context.config.c_output();
        toolchain::write_output(&c_file, document.as_bytes())?;
        info!(target: "pipeline", "wrote {}", c_file.display());

        let toolchain = Toolchain::new(&context.config);
        let mut executable = None;
        let mut cached = None;
        match context.config.build_mode() {
            BuildMode::Program => {
                if let Some(toolchain) = &toolchain {
                    let objects: Vec<PathBuf> = order
                        .modules
                        .iter()
                        .filter_map(|m| m.artifact.as_ref().and_then(|a| a.object.clone()))
                        .collect();
                    executable = Some(toolchain.link_executable(&objects, emitter.uses_threads())?);
                }
            }
            BuildMode::Library => {
                let object = match &toolchain {
                    Some(toolchain) => Some(toolchain.compile_object()?),
                    None => None,
                };
                if context.config.caching() {
                    let header = self.library_header(&order, &top);
                    let context = &self.context;
                    cached = context.cache.store(&top, &header, object.as_deref())?;
                }
            }
        }

        Ok(BuildOutput {
            artifact: c_file,
            executable,
            document: Some(document),
            cached,
            modules: order.module_names().iter().map(|m| String::from(*m)).collect(),
        })
    }

    fn build_native(&mut self) -> BuildResult<BuildOutput> {
        let context = &mut self.context;
        let order = context.resolve()?;

        let mut emitter = NativeEmitter::new();
        let mut helpers = HelperQueue::new(false);

        context.sweep(&order.files, Pass::Declarations, &mut emitter, &mut helpers, None)?;
        self.check_entry(&order)?;
        let context = &mut self.context;

        emitter.header();
        context.sweep(&order.files, Pass::Bodies, &mut emitter, &mut helpers, None)?;
        let image = emitter.footer()?;

        let output = context.config.output.clone();
        toolchain::write_executable(&output, &image)?;
        info!(target: "pipeline", "wrote {} ({} bytes)", output.display(), image.len());

        Ok(BuildOutput {
            artifact: output.clone(),
            executable: Some(output),
            document: None,
            cached: None,
            modules: order.module_names().iter().map(|m| String::from(*m)).collect(),
        })
    }

    fn check_entry(&self, order: &LoadOrder) -> BuildResult<ProgramShape> {
        let context = &self.context;
        EntrySynthesizer::new(&context.config, &context.symbols, &order.modules)
            .check(&context.registry, &order.files)
    }

    fn library_header(&self, order: &LoadOrder, top: &str) -> String {
        let imports = order
            .module(top)
            .map(|m| m.imports.clone())
            .unwrap_or_default();
        let items = order
            .files
            .iter()
            .map(|id| self.context.registry.get(*id))
            .filter(|p| p.module == top && p.kind == FileKind::Source)
            .flat_map(|p| p.items().iter());
        cache::header_text(top, &imports, items)
    }
}
