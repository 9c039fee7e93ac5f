use crate::lexing::Token;
use crate::source::*;

/// The `module` line and `import` lines at the top of a file. This is all the imports pass reads.
#[derive(Clone, Debug, Default)]
pub struct FileHeader {
    pub module: Option<ModuleDecl>,
    pub imports: Vec<ImportDecl>,
}

#[derive(Clone, Debug)]
pub struct ModuleDecl {
    pub name: String,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct ImportDecl {
    /// Full dotted name, e.g. `net.http`.
    pub module: String,
    /// Name the importing file refers to the module by.
    pub alias: String,
    pub span: Span,
}

impl ImportDecl {
    pub fn last_component(&self) -> &str {
        self.module.rsplit('.').next().unwrap_or(&self.module)
    }
}

impl ContainsSpan for ImportDecl {
    fn span(&self) -> &Span {
        &self.span
    }
}

#[derive(Clone, Debug)]
pub struct TypeRef {
    pub qualifier: Option<Token>,
    pub name: Token,
    pub pointer_depth: usize,
    pub span: Span,
}

impl ContainsSpan for TypeRef {
    fn span(&self) -> &Span {
        &self.span
    }
}

impl std::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for _ in 0..self.pointer_depth {
            write!(f, "&")?;
        }
        if let Some(qualifier) = &self.qualifier {
            write!(f, "{}.", qualifier.lexeme())?;
        }
        write!(f, "{}", self.name.lexeme())
    }
}

#[derive(Clone, Debug)]
pub struct Param {
    pub name: Token,
    pub param_type: TypeRef,
}

#[derive(Clone, Debug)]
pub struct FunctionDecl {
    pub name: Token,
    pub parameters: Vec<Param>,
    pub return_type: Option<TypeRef>,
    /// Tokens between the braces. Headers and interface methods have none.
    pub body: Option<Vec<Token>>,
    pub is_public: bool,
    pub span: Span,
}

impl FunctionDecl {
    pub fn name(&self) -> &str {
        self.name.lexeme()
    }
}

#[derive(Clone, Debug)]
pub struct StructDecl {
    pub name: Token,
    pub fields: Vec<Param>,
    pub is_public: bool,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct InterfaceDecl {
    pub name: Token,
    pub methods: Vec<FunctionDecl>,
    pub is_public: bool,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct ConstDecl {
    pub name: Token,
    pub const_type: TypeRef,
    pub value: Option<Vec<Token>>,
    pub is_public: bool,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum ItemKind {
    Include(Token),
    Define(Token),
    Const(ConstDecl),
    Struct(StructDecl),
    Interface(InterfaceDecl),
    Function(FunctionDecl),
    Statement(Vec<Token>),
}

#[derive(Clone, Debug)]
pub struct Item {
    pub kind: ItemKind,
    pub span: Span,
}

impl Item {
    pub fn new(kind: ItemKind, span: Span) -> Self {
        Item { kind, span }
    }

    pub fn is_public(&self) -> bool {
        match &self.kind {
            ItemKind::Const(decl) => decl.is_public,
            ItemKind::Struct(decl) => decl.is_public,
            ItemKind::Interface(decl) => decl.is_public,
            ItemKind::Function(decl) => decl.is_public,
            ItemKind::Include(..) | ItemKind::Define(..) | ItemKind::Statement(..) => false,
        }
    }
}

impl ContainsSpan for Item {
    fn span(&self) -> &Span {
        &self.span
    }
}
