use super::module::BUILTIN_MODULE;
use crate::error::{BuildError, BuildResult};
use crate::parsing::*;
use crate::source::Span;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct Symbol {
    pub id: String,
}

impl Symbol {
    pub fn new_str(parent: Option<&Symbol>, name: &str) -> Self {
        let id = parent.map(|p| p.id.clone() + "$").unwrap_or_default() + name;
        Symbol { id }
    }

    /// Declarations in the builtin module keep their bare name.
    pub fn in_module(module: &str, name: &str) -> Self {
        if module == BUILTIN_MODULE {
            Symbol::new_str(None, name)
        } else {
            Symbol::new_str(Some(&Symbol::new_str(None, module)), name)
        }
    }

    pub fn main_symbol() -> Self {
        Symbol::in_module(super::module::MAIN_MODULE, "main")
    }

    pub fn mangled(&self) -> String {
        mangle(&self.id.replace('$', "__"))
    }

    pub fn last_component(&self) -> &str {
        self.id.rsplit('$').next().unwrap_or(&self.id)
    }

    pub fn parent(&self) -> Option<Symbol> {
        let mut components: Vec<_> = self.id.split('$').collect();
        components.pop();
        if components.is_empty() {
            None
        } else {
            Some(Symbol {
                id: components.join("$"),
            })
        }
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Symbol({})", self.id)
    }
}

/// C-safe form of a dotted module name.
pub fn mangle(name: &str) -> String {
    name.replace('.', "__")
}

#[derive(Clone, Debug)]
pub enum DeclarationKind {
    Function(FunctionDecl),
    Struct(StructDecl),
    Interface(InterfaceDecl),
    Const(ConstDecl),
}

#[derive(Clone, Debug)]
pub struct Declaration {
    pub symbol: Symbol,
    pub module: String,
    pub kind: DeclarationKind,
    pub span: Span,
    /// Declared by a cache header; the definition lives in a precompiled object.
    pub external: bool,
    /// Import aliases of the declaring file, for resolving the declaration's own types.
    pub aliases: Rc<HashMap<String, String>>,
}

impl Declaration {
    pub fn is_type(&self) -> bool {
        matches!(
            self.kind,
            DeclarationKind::Struct(..) | DeclarationKind::Interface(..)
        )
    }

    pub fn as_function(&self) -> Option<&FunctionDecl> {
        match &self.kind {
            DeclarationKind::Function(decl) => Some(decl),
            _ => None,
        }
    }
}

/// Every declaration of the whole program, filled by the declarations pass.
#[derive(Default)]
pub struct SymbolTable {
    declarations: HashMap<Symbol, Declaration>,
    order: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn insert(&mut self, declaration: Declaration) -> BuildResult<()> {
        if let Some(existing) = self.declarations.get(&declaration.symbol) {
            let message = format!(
                "redefinition of `{}` (first defined at {})",
                declaration.symbol.last_component(),
                existing.span.location()
            );
            return Err(BuildError::parse(&declaration.span, &message));
        }
        self.order.push(declaration.symbol.clone());
        self.declarations.insert(declaration.symbol.clone(), declaration);
        Ok(())
    }

    pub fn get(&self, symbol: &Symbol) -> Option<&Declaration> {
        self.declarations.get(symbol)
    }

    /// Looks `name` up in `module`, then in builtin.
    pub fn lookup(&self, module: &str, name: &str) -> Option<&Declaration> {
        self.get(&Symbol::in_module(module, name))
            .or_else(|| self.get(&Symbol::in_module(BUILTIN_MODULE, name)))
    }

    pub fn lookup_exact(&self, module: &str, name: &str) -> Option<&Declaration> {
        self.get(&Symbol::in_module(module, name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.order.iter().filter_map(move |s| self.declarations.get(s))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl std::fmt::Display for SymbolTable {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "SymbolTable:")?;
        for declaration in self.iter() {
            let kind = match declaration.kind {
                DeclarationKind::Function(..) => "fn",
                DeclarationKind::Struct(..) => "struct",
                DeclarationKind::Interface(..) => "interface",
                DeclarationKind::Const(..) => "const",
            };
            writeln!(f, "  {} {} ({})", kind, declaration.symbol.id, declaration.module)?;
        }
        Ok(())
    }
}
