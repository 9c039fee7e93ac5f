mod module;
mod symbol_table;

pub use module::{Module, BUILTIN_MODULE, MAIN_MODULE};
pub use symbol_table::{mangle, Declaration, DeclarationKind, Symbol, SymbolTable};
