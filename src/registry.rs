use crate::codegen::helpers::HelperQueue;
use crate::codegen::{CodeEmitter, EmitScope};
use crate::error::{BuildError, BuildResult};
use crate::lexing::*;
use crate::library::*;
use crate::parsing::*;
use crate::source::{self, Source, Span};
use log::trace;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub const SOURCE_EXTENSION: &str = "aq";
pub const HEADER_EXTENSION: &str = "aqh";
pub const TEST_SUFFIX: &str = "_test.aq";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Pass {
    Imports,
    Declarations,
    Bodies,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Source,
    Test,
    Header,
    Synthesized,
}

impl FileKind {
    pub fn of(path: &Path) -> FileKind {
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        if name.ends_with(TEST_SUFFIX) {
            FileKind::Test
        } else if path.extension().map_or(false, |ext| ext == HEADER_EXTENSION) {
            FileKind::Header
        } else {
            FileKind::Source
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParserId(pub usize);

/// What a pass beyond imports needs from the pipeline.
pub struct PassContext<'a> {
    pub symbols: &'a mut SymbolTable,
    pub emitter: &'a mut dyn CodeEmitter,
    pub helpers: &'a mut HelperQueue,
    /// Library builds name their module here; every other module is emitted as external.
    pub building: Option<&'a str>,
}

/// Parse state of one file, advanced pass by pass.
pub struct FileParser {
    pub id: ParserId,
    pub path: PathBuf,
    pub kind: FileKind,
    pub module: String,
    source: Source,
    tokens: Vec<Token>,
    header: FileHeader,
    items: Vec<Item>,
    aliases: Rc<HashMap<String, String>>,
    completed: Option<Pass>,
}

impl FileParser {
    fn new(id: ParserId, path: PathBuf, kind: FileKind, source: Source) -> Self {
        FileParser {
            id,
            path,
            kind,
            module: String::new(),
            source,
            tokens: Vec::new(),
            header: FileHeader::default(),
            items: Vec::new(),
            aliases: Rc::new(HashMap::new()),
            completed: None,
        }
    }

    pub fn completed(&self) -> Option<Pass> {
        self.completed
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn declared_module(&self) -> Option<&ModuleDecl> {
        self.header.module.as_ref()
    }

    pub fn file_span(&self) -> Span {
        Span::file_start(&self.source)
    }

    /// `test_*` functions, only in test files.
    pub fn test_functions(&self) -> impl Iterator<Item = &FunctionDecl> {
        let is_test = self.kind == FileKind::Test;
        self.items.iter().filter_map(move |item| match &item.kind {
            ItemKind::Function(decl) if is_test && decl.name().starts_with("test_") => Some(decl),
            _ => None,
        })
    }

    pub fn statements(&self) -> impl Iterator<Item = &Item> {
        self.items
            .iter()
            .filter(|item| matches!(item.kind, ItemKind::Statement(..)))
    }

    fn scan_imports(&mut self) -> BuildResult<()> {
        self.tokens = Lexer::new(Rc::clone(&self.source)).lex()?;
        self.header = Parser::new(&self.tokens).header()?;

        let aliases = self
            .header
            .imports
            .iter()
            .map(|import| (import.alias.clone(), import.module.clone()))
            .collect();
        self.aliases = Rc::new(aliases);

        trace!(target: "registry", "{} imports {:?}", self.path.display(), self.aliases);
        Ok(())
    }

    fn declare(&mut self, ctx: &mut PassContext) -> BuildResult<()> {
        self.items = Parser::new(&self.tokens).items()?;
        let external = self.kind == FileKind::Header;

        for item in &self.items {
            let (name, kind) = match &item.kind {
                ItemKind::Function(decl) => {
                    if decl.body.is_none() && !external {
                        let message = format!("function `{}` has no body", decl.name());
                        return Err(BuildError::parse(&decl.name.span, &message));
                    }
                    (decl.name.clone(), DeclarationKind::Function(decl.clone()))
                }
                ItemKind::Struct(decl) => {
                    if matches!(self.kind, FileKind::Source | FileKind::Test) {
                        ctx.helpers
                            .struct_declared(&self.module, decl, Rc::clone(&self.aliases));
                    }
                    (decl.name.clone(), DeclarationKind::Struct(decl.clone()))
                }
                ItemKind::Interface(decl) => {
                    (decl.name.clone(), DeclarationKind::Interface(decl.clone()))
                }
                ItemKind::Const(decl) => {
                    if decl.value.is_none() && !external {
                        let message = format!("constant `{}` has no value", decl.name.lexeme());
                        return Err(BuildError::parse(&decl.name.span, &message));
                    }
                    (decl.name.clone(), DeclarationKind::Const(decl.clone()))
                }
                ItemKind::Include(..) | ItemKind::Define(..) | ItemKind::Statement(..) => continue,
            };

            ctx.symbols.insert(Declaration {
                symbol: Symbol::in_module(&self.module, name.lexeme()),
                module: self.module.clone(),
                kind,
                span: name.span.clone(),
                external,
                aliases: Rc::clone(&self.aliases),
            })?;
        }

        Ok(())
    }

    fn bodies(&self, ctx: &mut PassContext) -> BuildResult<()> {
        let external = ctx.building.map_or(false, |module| module != self.module);
        let scope = EmitScope::new(&self.module, self.kind, &self.aliases, ctx.symbols)
            .with_external(external);

        for item in &self.items {
            match &item.kind {
                ItemKind::Include(..) | ItemKind::Define(..) => ctx.emitter.directive(&scope, item)?,
                ItemKind::Const(decl) => ctx.emitter.constant(&scope, decl)?,
                ItemKind::Struct(decl) => ctx.emitter.structure(&scope, decl)?,
                ItemKind::Interface(decl) => ctx.emitter.interface(&scope, decl)?,
                ItemKind::Function(decl) => ctx.emitter.function(&scope, decl)?,
                ItemKind::Statement(tokens) => ctx.emitter.statement(&scope, tokens, &item.span)?,
            }
        }

        Ok(())
    }
}

/// One parser per normalized path. Handles are never duplicated and never removed.
#[derive(Default)]
pub struct ParserRegistry {
    index: HashMap<PathBuf, ParserId>,
    parsers: Vec<FileParser>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        ParserRegistry::default()
    }

    pub fn normalize(path: &Path) -> BuildResult<PathBuf> {
        fs::canonicalize(path).map_err(|e| BuildError::io(path, e))
    }

    pub fn get_or_create(&mut self, path: &Path) -> BuildResult<ParserId> {
        let normalized = ParserRegistry::normalize(path)?;
        if let Some(id) = self.index.get(&normalized) {
            return Ok(*id);
        }

        let source = source::file(&normalized)?;
        let id = ParserId(self.parsers.len());
        let kind = FileKind::of(&normalized);
        trace!(target: "registry", "registering {} as {:?}", normalized.display(), id);

        self.parsers
            .push(FileParser::new(id, normalized.clone(), kind, source));
        self.index.insert(normalized, id);
        Ok(id)
    }

    /// Registers generated source under `<synthesized:MODULE>`, a path that never exists on disk.
    ///
    /// There is one blob per module. Registering the same module again returns the first
    /// handle and ignores `text`; callers must gather a module's generated code into one blob.
    pub fn register_virtual(&mut self, module: &str, text: &str) -> ParserId {
        let path = PathBuf::from(format!("<synthesized:{}>", module));
        if let Some(id) = self.index.get(&path) {
            trace!(target: "registry", "{} already registered", path.display());
            return *id;
        }

        let source = source::named(&path.display().to_string(), text);
        let id = ParserId(self.parsers.len());
        let mut parser = FileParser::new(id, path.clone(), FileKind::Synthesized, source);
        parser.module = String::from(module);
        self.parsers.push(parser);
        self.index.insert(path, id);
        id
    }

    pub fn assign_module(&mut self, id: ParserId, module: &str) {
        self.parsers[id.0].module = String::from(module);
    }

    pub fn get(&self, id: ParserId) -> &FileParser {
        &self.parsers[id.0]
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileParser> {
        self.parsers.iter()
    }

    /// Runs the imports pass if it has not run yet.
    pub fn scan_imports(&mut self, id: ParserId) -> BuildResult<&FileHeader> {
        let parser = &mut self.parsers[id.0];
        if parser.completed.is_none() {
            parser.scan_imports()?;
            parser.completed = Some(Pass::Imports);
        }
        Ok(&parser.header)
    }

    /// Brings the handle up to `pass`, running any earlier pass it has not seen yet.
    pub fn advance(&mut self, id: ParserId, pass: Pass, ctx: &mut PassContext) -> BuildResult<()> {
        self.scan_imports(id)?;
        let parser = &mut self.parsers[id.0];

        if pass >= Pass::Declarations && parser.completed < Some(Pass::Declarations) {
            trace!(target: "registry", "declarations: {}", parser.path.display());
            parser.declare(ctx)?;
            parser.completed = Some(Pass::Declarations);
        }

        if pass >= Pass::Bodies && parser.completed < Some(Pass::Bodies) {
            trace!(target: "registry", "bodies: {}", parser.path.display());
            parser.bodies(ctx)?;
            parser.completed = Some(Pass::Bodies);
        }

        Ok(())
    }
}
