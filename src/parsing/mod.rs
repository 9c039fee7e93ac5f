mod ast;
mod parser;

pub use ast::{
    ConstDecl, FileHeader, FunctionDecl, ImportDecl, InterfaceDecl, Item, ItemKind, ModuleDecl,
    Param, StructDecl, TypeRef,
};
pub use parser::Parser;
