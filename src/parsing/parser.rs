use super::ast::*;
use crate::error::{BuildError, BuildResult};
use crate::lexing::*;

type Result<T> = BuildResult<T>;

pub struct Parser<'a> {
    tokens: &'a [Token],
    index: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Parser { tokens, index: 0 }
    }

    /// Reads only the leading `module` and `import` lines, skipping directives.
    pub fn header(&mut self) -> Result<FileHeader> {
        let mut header = FileHeader::default();

        loop {
            match self.peek() {
                TokenKind::Directive => {
                    self.advance();
                }
                TokenKind::Module => {
                    let decl = self.module_decl()?;
                    if header.module.is_some() || !header.imports.is_empty() {
                        return Err(BuildError::parse(
                            &decl.span,
                            "module declaration must come first",
                        ));
                    }
                    header.module = Some(decl);
                }
                TokenKind::Import => {
                    let import = self.import_decl()?;
                    header.imports.push(import);
                }
                _ => break,
            }
        }

        Ok(header)
    }

    pub fn items(&mut self) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        let mut seen_declaration = false;

        while !self.is_at_end() {
            match self.peek() {
                TokenKind::Module | TokenKind::Import => {
                    if seen_declaration {
                        return Err(BuildError::parse(
                            &self.current().span,
                            "module and import lines must come before declarations",
                        ));
                    }
                    if self.peek() == TokenKind::Module {
                        self.module_decl()?;
                    } else {
                        self.import_decl()?;
                    }
                }
                TokenKind::Directive => items.push(self.directive()?),
                _ => {
                    seen_declaration = true;
                    items.push(self.item()?);
                }
            }
        }

        Ok(items)
    }

    fn module_decl(&mut self) -> Result<ModuleDecl> {
        let keyword = self.advance().span.clone();
        let (name, end) = self.dotted_name("Expected module name")?;
        Ok(ModuleDecl {
            name,
            span: keyword.span_to(&end),
        })
    }

    fn import_decl(&mut self) -> Result<ImportDecl> {
        let keyword = self.advance().span.clone();
        let (module, mut end) = self.dotted_name("Expected module name after import")?;
        let mut alias = module.rsplit('.').next().unwrap_or(&module).to_string();
        if self.matches(TokenKind::As) {
            let alias_token = self.consume(TokenKind::Identifier, "Expected alias after as")?;
            alias = alias_token.lexeme().to_string();
            end = alias_token.span.clone();
        }
        self.matches(TokenKind::Semicolon);
        Ok(ImportDecl {
            module,
            alias,
            span: keyword.span_to(&end),
        })
    }

    fn dotted_name(&mut self, message: &str) -> Result<(String, crate::source::Span)> {
        let first = self.consume(TokenKind::Identifier, message)?;
        let mut name = first.lexeme().to_string();
        let mut end = first.span.clone();
        while self.peek() == TokenKind::Period {
            self.advance();
            let part = self.consume(TokenKind::Identifier, message)?;
            name.push('.');
            name.push_str(part.lexeme());
            end = part.span.clone();
        }
        Ok((name, end))
    }

    fn directive(&mut self) -> Result<Item> {
        let token = self.advance().clone();
        let text = token.lexeme();
        let kind = if text.starts_with("#include") {
            ItemKind::Include(token.clone())
        } else if text.starts_with("#define") {
            ItemKind::Define(token.clone())
        } else {
            return Err(BuildError::parse(&token.span, "Unknown directive"));
        };
        Ok(Item::new(kind, token.span))
    }

    fn item(&mut self) -> Result<Item> {
        let start = self.current().span.clone();
        let is_public = self.matches(TokenKind::Pub);

        let kind = match self.peek() {
            TokenKind::Fn => {
                self.advance();
                ItemKind::Function(self.function_decl(is_public, true)?)
            }
            TokenKind::Struct => {
                self.advance();
                ItemKind::Struct(self.struct_decl(is_public)?)
            }
            TokenKind::Interface => {
                self.advance();
                ItemKind::Interface(self.interface_decl(is_public)?)
            }
            TokenKind::Const => {
                self.advance();
                ItemKind::Const(self.const_decl(is_public)?)
            }
            _ if is_public => {
                return Err(BuildError::parse(
                    &self.current().span,
                    "Expected declaration after pub",
                ))
            }
            _ => ItemKind::Statement(self.statement()?),
        };

        let span = start.span_to(&self.previous().span);
        Ok(Item::new(kind, span))
    }

    fn function_decl(&mut self, is_public: bool, allow_body: bool) -> Result<FunctionDecl> {
        let start = self.previous().span.clone();
        let name = self
            .consume(TokenKind::Identifier, "Expected function name")?
            .clone();

        self.consume(TokenKind::LeftParen, "Expected ( after function name")?;
        let mut parameters = Vec::new();
        while self.peek() != TokenKind::RightParen {
            let param_name = self
                .consume(TokenKind::Identifier, "Expected parameter name")?
                .clone();
            let param_type = self.type_ref()?;
            parameters.push(Param {
                name: param_name,
                param_type,
            });
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RightParen, "Expected ) after parameters")?;

        let return_type = match self.peek() {
            TokenKind::Identifier | TokenKind::Ampersand => Some(self.type_ref()?),
            _ => None,
        };

        let body = if allow_body && self.peek() == TokenKind::LeftBrace {
            Some(self.braced()?)
        } else {
            self.matches(TokenKind::Semicolon);
            None
        };

        Ok(FunctionDecl {
            name,
            parameters,
            return_type,
            body,
            is_public,
            span: start.span_to(&self.previous().span),
        })
    }

    fn struct_decl(&mut self, is_public: bool) -> Result<StructDecl> {
        let start = self.previous().span.clone();
        let name = self.consume(TokenKind::Identifier, "Expected struct name")?.clone();
        self.consume(TokenKind::LeftBrace, "Expected { after struct name")?;

        let mut fields = Vec::new();
        while !self.matches(TokenKind::RightBrace) {
            let field_name = self
                .consume(TokenKind::Identifier, "Expected field name")?
                .clone();
            let field_type = self.type_ref()?;
            fields.push(Param {
                name: field_name,
                param_type: field_type,
            });
            if !self.matches(TokenKind::Comma) {
                self.matches(TokenKind::Semicolon);
            }
        }

        Ok(StructDecl {
            name,
            fields,
            is_public,
            span: start.span_to(&self.previous().span),
        })
    }

    fn interface_decl(&mut self, is_public: bool) -> Result<InterfaceDecl> {
        let start = self.previous().span.clone();
        let name = self
            .consume(TokenKind::Identifier, "Expected interface name")?
            .clone();
        self.consume(TokenKind::LeftBrace, "Expected { after interface name")?;

        let mut methods = Vec::new();
        while !self.matches(TokenKind::RightBrace) {
            self.consume(TokenKind::Fn, "Expected method signature")?;
            methods.push(self.function_decl(true, false)?);
        }

        Ok(InterfaceDecl {
            name,
            methods,
            is_public,
            span: start.span_to(&self.previous().span),
        })
    }

    fn const_decl(&mut self, is_public: bool) -> Result<ConstDecl> {
        let start = self.previous().span.clone();
        let name = self.consume(TokenKind::Identifier, "Expected constant name")?.clone();
        let const_type = self.type_ref()?;

        let value = if self.matches(TokenKind::Equal) {
            let value = self.until_semicolon()?;
            if value.is_empty() {
                return Err(BuildError::parse(&name.span, "Expected constant value"));
            }
            Some(value)
        } else {
            self.consume(TokenKind::Semicolon, "Expected = or ; after constant type")?;
            None
        };

        Ok(ConstDecl {
            name,
            const_type,
            value,
            is_public,
            span: start.span_to(&self.previous().span),
        })
    }

    fn type_ref(&mut self) -> Result<TypeRef> {
        let start = self.current().span.clone();
        let mut pointer_depth = 0;
        while self.matches(TokenKind::Ampersand) {
            pointer_depth += 1;
        }

        let first = self.consume(TokenKind::Identifier, "Expected type")?.clone();
        let (qualifier, name) = if self.peek() == TokenKind::Period {
            self.advance();
            let name = self.consume(TokenKind::Identifier, "Expected type name")?.clone();
            (Some(first), name)
        } else {
            (None, first)
        };

        Ok(TypeRef {
            qualifier,
            name,
            pointer_depth,
            span: start.span_to(&self.previous().span),
        })
    }

    /// Tokens between a `{` and its matching `}`; both braces are consumed.
    fn braced(&mut self) -> Result<Vec<Token>> {
        let open = self.consume(TokenKind::LeftBrace, "Expected {")?.clone();
        let mut depth = 1;
        let mut tokens = Vec::new();
        loop {
            if self.is_at_end() {
                return Err(BuildError::parse(&open.span, "Unclosed {"));
            }
            let token = self.advance().clone();
            match token.kind {
                TokenKind::LeftBrace => depth += 1,
                TokenKind::RightBrace => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(tokens);
                    }
                }
                _ => (),
            }
            tokens.push(token);
        }
    }

    fn until_semicolon(&mut self) -> Result<Vec<Token>> {
        let start = self.current().span.clone();
        let mut depth = 0;
        let mut tokens = Vec::new();
        loop {
            if self.is_at_end() {
                return Err(BuildError::parse(&start, "Expected ;"));
            }
            let token = self.advance().clone();
            match token.kind {
                TokenKind::Semicolon if depth == 0 => return Ok(tokens),
                TokenKind::LeftParen | TokenKind::LeftBrace | TokenKind::LeftBracket => {
                    depth += 1
                }
                TokenKind::RightParen | TokenKind::RightBrace | TokenKind::RightBracket => {
                    depth -= 1
                }
                _ => (),
            }
            tokens.push(token);
        }
    }

    /// A top-level statement: up to `;`, or up to a closing brace not followed by `else`.
    fn statement(&mut self) -> Result<Vec<Token>> {
        let start = self.current().span.clone();
        let mut depth: i32 = 0;
        let mut tokens = Vec::new();
        loop {
            if self.is_at_end() {
                if depth == 0 && !tokens.is_empty() {
                    return Err(BuildError::parse(&start, "Expected ; after statement"));
                }
                return Err(BuildError::parse(&start, "Unterminated statement"));
            }
            let token = self.advance().clone();
            let kind = token.kind;
            tokens.push(token);
            match kind {
                TokenKind::Semicolon if depth == 0 => return Ok(tokens),
                TokenKind::LeftParen | TokenKind::LeftBrace | TokenKind::LeftBracket => {
                    depth += 1
                }
                TokenKind::RightParen | TokenKind::RightBracket => depth -= 1,
                TokenKind::RightBrace => {
                    depth -= 1;
                    let continues = self.current().lexeme() == "else";
                    if depth == 0 && !continues {
                        return Ok(tokens);
                    }
                }
                _ => (),
            }
            if depth < 0 {
                return Err(BuildError::parse(&self.previous().span, "Unbalanced delimiter"));
            }
        }
    }

    fn peek(&self) -> TokenKind {
        self.current().kind
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<&Token> {
        if self.matches(kind) {
            Ok(self.previous())
        } else {
            Err(BuildError::parse(&self.current().span, message))
        }
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.is_at_end() {
            return false;
        }
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.index += 1;
        }
        self.previous()
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.index.saturating_sub(1)]
    }

    fn current(&self) -> &Token {
        &self.tokens[self.index]
    }

    fn is_at_end(&self) -> bool {
        self.peek() == TokenKind::EOF
    }
}
