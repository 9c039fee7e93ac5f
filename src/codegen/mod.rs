pub mod assembler;
pub mod c_emitter;
pub mod entry;
pub mod helpers;
pub mod native;

use crate::error::{BuildError, BuildResult};
use crate::lexing::Token;
use crate::library::*;
use crate::parsing::*;
use crate::registry::FileKind;
use crate::source::Span;
use std::collections::HashMap;

pub use assembler::{OutputAssembler, Section};
pub use c_emitter::CEmitter;
pub use native::NativeEmitter;

/// What the bodies pass hands each item to. The C and native backends both implement it.
pub trait CodeEmitter {
    fn directive(&mut self, scope: &EmitScope, item: &Item) -> BuildResult<()>;
    fn constant(&mut self, scope: &EmitScope, decl: &ConstDecl) -> BuildResult<()>;
    fn structure(&mut self, scope: &EmitScope, decl: &StructDecl) -> BuildResult<()>;
    fn interface(&mut self, scope: &EmitScope, decl: &InterfaceDecl) -> BuildResult<()>;
    fn function(&mut self, scope: &EmitScope, decl: &FunctionDecl) -> BuildResult<()>;
    fn statement(&mut self, scope: &EmitScope, tokens: &[Token], span: &Span) -> BuildResult<()>;
}

/// Maps the language's scalar type names to C.
pub fn scalar_c_type(name: &str) -> Option<&'static str> {
    let c_type = match name {
        "int" => "int",
        "i8" => "int8_t",
        "i16" => "int16_t",
        "i32" => "int32_t",
        "i64" => "int64_t",
        "u8" | "byte" => "uint8_t",
        "u16" => "uint16_t",
        "u32" => "uint32_t",
        "u64" => "uint64_t",
        "f32" => "float",
        "f64" => "double",
        "bool" => "bool",
        "string" => "string",
        "voidptr" => "void*",
        _ => return None,
    };
    Some(c_type)
}

pub enum ResolvedType<'a> {
    Scalar(&'static str),
    Named(&'a Declaration),
}

/// Name resolution for one file during the bodies pass.
pub struct EmitScope<'a> {
    pub module: &'a str,
    pub kind: FileKind,
    pub symbols: &'a SymbolTable,
    /// Definitions live in another translation unit: emit prototypes and externs only.
    pub external: bool,
    aliases: &'a HashMap<String, String>,
}

impl<'a> EmitScope<'a> {
    pub fn new(
        module: &'a str,
        kind: FileKind,
        aliases: &'a HashMap<String, String>,
        symbols: &'a SymbolTable,
    ) -> Self {
        EmitScope {
            module,
            kind,
            symbols,
            external: kind == FileKind::Header,
            aliases,
        }
    }

    pub fn with_external(mut self, external: bool) -> Self {
        self.external = self.external || external;
        self
    }

    /// Scope of the file that declared `declaration`.
    pub fn of_declaration(declaration: &'a Declaration, symbols: &'a SymbolTable) -> Self {
        EmitScope::new(
            &declaration.module,
            FileKind::Source,
            &declaration.aliases,
            symbols,
        )
    }

    pub fn module_for_alias(&self, alias: &str) -> Option<&'a str> {
        self.aliases.get(alias).map(|m| m.as_str())
    }

    pub fn lookup(&self, name: &str) -> Option<&'a Declaration> {
        self.symbols.lookup(self.module, name)
    }

    pub fn lookup_qualified(&self, alias: &Token, name: &Token) -> BuildResult<&'a Declaration> {
        let module = self.module_for_alias(alias.lexeme()).ok_or_else(|| {
            let message = format!("module `{}` is not imported", alias.lexeme());
            BuildError::parse(&alias.span, &message)
        })?;
        self.symbols
            .lookup_exact(module, name.lexeme())
            .ok_or_else(|| {
                let message = format!(
                    "unknown symbol `{}.{}`",
                    alias.lexeme(),
                    name.lexeme()
                );
                BuildError::parse(&name.span, &message)
            })
    }

    pub fn resolve_type(&self, type_ref: &TypeRef) -> BuildResult<ResolvedType<'a>> {
        let declaration = match &type_ref.qualifier {
            Some(alias) => self.lookup_qualified(alias, &type_ref.name)?,
            None => {
                if let Some(scalar) = scalar_c_type(type_ref.name.lexeme()) {
                    return Ok(ResolvedType::Scalar(scalar));
                }
                self.lookup(type_ref.name.lexeme()).ok_or_else(|| {
                    let message = format!("unknown type `{}`", type_ref.name.lexeme());
                    BuildError::parse(&type_ref.span, &message)
                })?
            }
        };

        if declaration.is_type() {
            Ok(ResolvedType::Named(declaration))
        } else {
            let message = format!("`{}` is not a type", type_ref);
            Err(BuildError::parse(&type_ref.span, &message))
        }
    }
}
