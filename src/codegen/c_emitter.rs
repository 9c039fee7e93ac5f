use super::assembler::{OutputAssembler, Section};
use super::{CodeEmitter, EmitScope, ResolvedType};
use crate::config::BuildMode;
use crate::error::{BuildError, BuildResult};
use crate::lexing::*;
use crate::library::*;
use crate::parsing::*;
use crate::registry::FileKind;
use crate::source::Span;
use log::trace;
use std::collections::HashMap;

const RUNTIME_INCLUDES: &[&str] = &[
    "#include <stdio.h>",
    "#include <stdlib.h>",
    "#include <stdbool.h>",
    "#include <stdint.h>",
    "#include <string.h>",
    "#include <time.h>",
];

struct TypeDefinition {
    name: String,
    depends_on: Vec<String>,
    text: String,
}

/// Post-order walk over by-value field dependencies, stable with respect to declaration order.
/// Back edges of a cycle are skipped; the C compiler rejects that layout.
fn definition_order(definitions: &[TypeDefinition]) -> Vec<usize> {
    fn visit(
        index: usize,
        definitions: &[TypeDefinition],
        by_name: &HashMap<&str, usize>,
        visited: &mut Vec<bool>,
        order: &mut Vec<usize>,
    ) {
        if visited[index] {
            return;
        }
        visited[index] = true;
        for dependency in &definitions[index].depends_on {
            if let Some(&next) = by_name.get(dependency.as_str()) {
                visit(next, definitions, by_name, visited, order);
            }
        }
        order.push(index);
    }

    let by_name: HashMap<&str, usize> = definitions
        .iter()
        .enumerate()
        .map(|(index, definition)| (definition.name.as_str(), index))
        .collect();
    let mut visited = vec![false; definitions.len()];
    let mut order = Vec::with_capacity(definitions.len());
    for index in 0..definitions.len() {
        visit(index, definitions, &by_name, &mut visited, &mut order);
    }
    order
}

/// Globals the generated runtime shares across every module of a program.
const RUNTIME_GLOBALS: &[(&str, Option<&str>)] = &[
    ("int _aq_argc", None),
    ("char** _aq_argv", None),
    ("char* _aq_str_buf", None),
    ("int _aq_testing", Some("0")),
    ("int _aq_test_failed", Some("0")),
];

const RUNTIME_SUPPORT: &str = "
void _aq_assert_failed(const char* cond, const char* file, int line) {
    fprintf(stderr, \"%s:%d: assertion failed: %s\\n\", file, line, cond);
    _aq_test_failed = 1;
    if (!_aq_testing) {
        exit(1);
    }
}
";

/// Emits C into an `OutputAssembler`: prototypes and types into sections, bodies into the stream.
pub struct CEmitter {
    pub assembler: OutputAssembler,
    /// Struct bodies held back until `finalize` so by-value fields are defined first.
    type_definitions: Vec<TypeDefinition>,
    const_inits: Vec<(String, Vec<String>)>,
    script: Vec<String>,
    profiled: Vec<String>,
    profile: bool,
    uses_threads: bool,
}

impl CEmitter {
    /// `mode` decides who owns the runtime globals: a program defines them, a library module
    /// only refers to them so its cached object links into any program.
    pub fn new(profile: bool, mode: BuildMode) -> Self {
        let mut emitter = CEmitter {
            assembler: OutputAssembler::new(profile),
            type_definitions: Vec::new(),
            const_inits: Vec::new(),
            script: Vec::new(),
            profiled: Vec::new(),
            profile,
            uses_threads: false,
        };
        emitter.write_runtime_preamble(mode);
        emitter
    }

    /// Flushes the held struct definitions in dependency order, then fills the declarations slot.
    pub fn finalize(&mut self) {
        for index in definition_order(&self.type_definitions) {
            let text = &self.type_definitions[index].text;
            self.assembler.append(Section::TypeDefinitions, text);
        }
        self.type_definitions.clear();
        self.assembler.finalize();
    }

    fn write_runtime_preamble(&mut self, mode: BuildMode) {
        let assembler = &mut self.assembler;
        assembler.append(Section::Defines, "#define AQ_STR_BUF_LEN 4096");
        assembler.append(
            Section::Defines,
            "#define AQ_ASSERT(cond) do { if (!(cond)) { _aq_assert_failed(#cond, __FILE__, __LINE__); } } while (0)",
        );
        for include in RUNTIME_INCLUDES {
            assembler.append_once(Section::Includes, include);
        }
        assembler.append_once(Section::Typedefs, "typedef char* string;");
        assembler.append(Section::FnDecls, "void _aq_assert_failed(const char* cond, const char* file, int line);");

        match mode {
            BuildMode::Program => {
                for (declaration, initial) in RUNTIME_GLOBALS {
                    let definition = match initial {
                        Some(value) => format!("{} = {};", declaration, value),
                        None => format!("{};", declaration),
                    };
                    assembler.append(Section::ConstDecls, &definition);
                }
                assembler.push(RUNTIME_SUPPORT);
            }
            BuildMode::Library => {
                for (declaration, _) in RUNTIME_GLOBALS {
                    assembler.append(Section::ConstDecls, &format!("extern {};", declaration));
                }
            }
        }
    }

    pub fn script_lines(&self) -> &[String] {
        &self.script
    }

    pub fn const_init_lines(&self, module: &str) -> Option<&[String]> {
        self.const_inits
            .iter()
            .find(|(name, _)| name == module)
            .map(|(_, lines)| lines.as_slice())
    }

    pub fn profiled_functions(&self) -> &[String] {
        &self.profiled
    }

    pub fn uses_threads(&self) -> bool {
        self.uses_threads
    }

    pub fn type_name(&self, scope: &EmitScope, type_ref: &TypeRef) -> BuildResult<String> {
        let base = match scope.resolve_type(type_ref)? {
            ResolvedType::Scalar(c_type) => String::from(c_type),
            ResolvedType::Named(declaration) => declaration.symbol.mangled(),
        };
        let stars = (0..type_ref.pointer_depth).map(|_| "*").collect::<String>();
        Ok(base + &stars)
    }

    fn return_type(&self, scope: &EmitScope, decl: &FunctionDecl) -> BuildResult<String> {
        match &decl.return_type {
            Some(type_ref) => self.type_name(scope, type_ref),
            None => Ok(String::from("void")),
        }
    }

    fn parameter_list(&self, scope: &EmitScope, params: &[Param]) -> BuildResult<String> {
        if params.is_empty() {
            return Ok(String::from("void"));
        }
        let mut rendered = Vec::new();
        for param in params {
            let c_type = self.type_name(scope, &param.param_type)?;
            rendered.push(format!("{} {}", c_type, param.name.lexeme()));
        }
        Ok(rendered.join(", "))
    }

    fn signature(&self, scope: &EmitScope, decl: &FunctionDecl) -> BuildResult<String> {
        let name = Symbol::in_module(scope.module, decl.name()).mangled();
        Ok(format!(
            "{} {}({})",
            self.return_type(scope, decl)?,
            name,
            self.parameter_list(scope, &decl.parameters)?
        ))
    }

    /// Splits body tokens into C lines, one statement or brace per line.
    fn render_block(
        &mut self,
        scope: &EmitScope,
        tokens: &[Token],
        base_indent: usize,
    ) -> BuildResult<Vec<String>> {
        let mut lines = Vec::new();
        let mut indent = base_indent;
        let mut pending: Vec<Token> = Vec::new();
        let mut depth = 0;

        for (index, token) in tokens.iter().enumerate() {
            match token.kind {
                TokenKind::LeftParen => depth += 1,
                TokenKind::RightParen => depth -= 1,
                _ => (),
            }

            match token.kind {
                TokenKind::Semicolon if depth == 0 => {
                    pending.push(token.clone());
                    lines.push(self.render_statement(scope, &pending, indent)?);
                    pending.clear();
                }
                TokenKind::LeftBrace if depth == 0 => {
                    pending.push(token.clone());
                    lines.push(self.render_statement(scope, &pending, indent)?);
                    pending.clear();
                    indent += 1;
                }
                TokenKind::RightBrace if depth == 0 => {
                    if !pending.is_empty() {
                        lines.push(self.render_statement(scope, &pending, indent)?);
                        pending.clear();
                    }
                    indent = indent.saturating_sub(1).max(base_indent);
                    pending.push(token.clone());
                    let continues = tokens
                        .get(index + 1)
                        .map_or(false, |next| next.lexeme() == "else" || next.lexeme() == "while");
                    if !continues {
                        lines.push(self.render_statement(scope, &pending, indent)?);
                        pending.clear();
                    }
                }
                _ => pending.push(token.clone()),
            }
        }

        if !pending.is_empty() {
            lines.push(self.render_statement(scope, &pending, indent)?);
        }

        Ok(lines)
    }

    fn render_statement(
        &mut self,
        scope: &EmitScope,
        tokens: &[Token],
        indent: usize,
    ) -> BuildResult<String> {
        let padding = (0..indent).map(|_| "    ").collect::<String>();
        let body = if tokens[0].is(TokenKind::Go) {
            self.go_statement(scope, tokens)?
        } else {
            self.render_tokens(scope, tokens)?
        };
        Ok(padding + &body)
    }

    pub fn render_tokens(&self, scope: &EmitScope, tokens: &[Token]) -> BuildResult<String> {
        let mut rendered = String::new();
        let mut previous: Option<&Token> = None;
        let mut index = 0;

        while index < tokens.len() {
            let token = &tokens[index];
            let (text, consumed) = self.render_token(scope, tokens, index, previous)?;
            if let Some(previous) = previous {
                if needs_space(previous, token) {
                    rendered.push(' ');
                }
            }
            rendered.push_str(&text);
            previous = Some(&tokens[index + consumed - 1]);
            index += consumed;
        }

        Ok(rendered)
    }

    fn render_token(
        &self,
        scope: &EmitScope,
        tokens: &[Token],
        index: usize,
        previous: Option<&Token>,
    ) -> BuildResult<(String, usize)> {
        let token = &tokens[index];
        let name = token.lexeme();
        if !token.is(TokenKind::Identifier) {
            return Ok((String::from(name), 1));
        }

        let after_member = previous.map_or(false, |p| p.is(TokenKind::Period) || p.lexeme() == "->");
        if after_member {
            return Ok((String::from(name), 1));
        }

        if let (Some(dot), Some(member)) = (tokens.get(index + 1), tokens.get(index + 2)) {
            let qualified = dot.is(TokenKind::Period)
                && member.is(TokenKind::Identifier)
                && scope.module_for_alias(name).is_some();
            if qualified {
                let declaration = scope.lookup_qualified(token, member)?;
                return Ok((declaration.symbol.mangled(), 3));
            }
        }

        let next_is_call = tokens
            .get(index + 1)
            .map_or(false, |t| t.is(TokenKind::LeftParen));
        if name == "assert" && next_is_call {
            return Ok((String::from("AQ_ASSERT"), 1));
        }

        match scope.lookup(name) {
            Some(declaration) => Ok((declaration.symbol.mangled(), 1)),
            None => Ok((String::from(name), 1)),
        }
    }

    /// `go f(a, b);` starts `f` on a detached thread through a generated argument struct.
    fn go_statement(&mut self, scope: &EmitScope, tokens: &[Token]) -> BuildResult<String> {
        let go = &tokens[0];
        let call = match tokens.last() {
            Some(last) if last.is(TokenKind::Semicolon) => &tokens[1..tokens.len() - 1],
            _ => &tokens[1..],
        };

        let (declaration, rest) = match call {
            [alias, dot, name, rest @ ..] if dot.is(TokenKind::Period) => {
                (scope.lookup_qualified(alias, name)?, rest)
            }
            [name, rest @ ..] if name.is(TokenKind::Identifier) => {
                let declaration = scope.lookup(name.lexeme()).ok_or_else(|| {
                    let message = format!("unknown function `{}`", name.lexeme());
                    BuildError::parse(&name.span, &message)
                })?;
                (declaration, rest)
            }
            _ => return Err(BuildError::parse(&go.span, "expected function call after go")),
        };

        let function = declaration.as_function().ok_or_else(|| {
            let message = format!("`{}` is not a function", declaration.symbol.last_component());
            BuildError::parse(&go.span, &message)
        })?;

        let arguments = match rest {
            [open, inner @ .., close]
                if open.is(TokenKind::LeftParen) && close.is(TokenKind::RightParen) =>
            {
                split_arguments(inner)
            }
            _ => return Err(BuildError::parse(&go.span, "expected argument list after go target")),
        };

        if arguments.len() != function.parameters.len() {
            let message = format!(
                "`{}` takes {} arguments, {} given",
                function.name(),
                function.parameters.len(),
                arguments.len()
            );
            return Err(BuildError::parse(&go.span, &message));
        }

        let mangled = declaration.symbol.mangled();
        let arg_struct = format!("thread_arg_{}", mangled);
        let wrapper = format!("{}_thread_wrapper", mangled);

        let callee_scope = EmitScope::of_declaration(declaration, scope.symbols);
        let mut fields = String::new();
        let mut forwarded = Vec::new();
        for (index, param) in function.parameters.iter().enumerate() {
            let c_type = self.type_name(&callee_scope, &param.param_type)?;
            fields.push_str(&format!("    {} arg{};\n", c_type, index));
            forwarded.push(format!("arg->arg{}", index));
        }
        if fields.is_empty() {
            fields.push_str("    int _unused;\n");
        }

        let support = format!(
            "typedef struct {s} {{\n{f}}} {s};\nvoid* {w}({s}* arg) {{\n    {call}({args});\n    free(arg);\n    return 0;\n}}",
            s = arg_struct,
            f = fields,
            w = wrapper,
            call = mangled,
            args = forwarded.join(", ")
        );
        self.assembler
            .append_once(Section::Includes, "#include <pthread.h>");
        self.assembler.append_once(Section::ThreadArgs, &support);
        self.uses_threads = true;

        let mut statement = format!(
            "{{ {s}* _go_arg = malloc(sizeof({s}));",
            s = arg_struct
        );
        for (index, argument) in arguments.iter().enumerate() {
            let value = self.render_tokens(scope, argument)?;
            statement.push_str(&format!(" _go_arg->arg{} = {};", index, value));
        }
        statement.push_str(&format!(
            " pthread_t _go_thread; pthread_create(&_go_thread, NULL, (void* (*)(void*)){}, _go_arg); pthread_detach(_go_thread); }}",
            wrapper
        ));

        trace!(target: "codegen", "go statement for {}", mangled);
        Ok(statement)
    }
}

fn split_arguments(tokens: &[Token]) -> Vec<&[Token]> {
    if tokens.is_empty() {
        return Vec::new();
    }
    let mut arguments = Vec::new();
    let mut depth = 0;
    let mut start = 0;
    for (index, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::LeftParen | TokenKind::LeftBracket | TokenKind::LeftBrace => depth += 1,
            TokenKind::RightParen | TokenKind::RightBracket | TokenKind::RightBrace => depth -= 1,
            TokenKind::Comma if depth == 0 => {
                arguments.push(&tokens[start..index]);
                start = index + 1;
            }
            _ => (),
        }
    }
    arguments.push(&tokens[start..]);
    arguments
}

fn needs_space(previous: &Token, current: &Token) -> bool {
    match current.kind {
        TokenKind::RightParen
        | TokenKind::RightBracket
        | TokenKind::Comma
        | TokenKind::Semicolon
        | TokenKind::Period => return false,
        TokenKind::LeftParen | TokenKind::LeftBracket => {
            if matches!(
                previous.kind,
                TokenKind::Identifier | TokenKind::RightParen | TokenKind::RightBracket
            ) {
                return false;
            }
        }
        _ => (),
    }

    match current.lexeme() {
        "->" => return false,
        "++" | "--"
            if matches!(
                previous.kind,
                TokenKind::Identifier | TokenKind::RightParen | TokenKind::RightBracket
            ) =>
        {
            return false
        }
        _ => (),
    }

    !(matches!(
        previous.kind,
        TokenKind::LeftParen | TokenKind::LeftBracket | TokenKind::Period
    ) || previous.lexeme() == "->")
}

impl CodeEmitter for CEmitter {
    fn directive(&mut self, _scope: &EmitScope, item: &Item) -> BuildResult<()> {
        match &item.kind {
            ItemKind::Include(token) => {
                self.assembler.append_once(Section::Includes, token.lexeme());
            }
            ItemKind::Define(token) => {
                self.assembler.append_once(Section::Defines, token.lexeme());
            }
            _ => (),
        }
        Ok(())
    }

    fn constant(&mut self, scope: &EmitScope, decl: &ConstDecl) -> BuildResult<()> {
        let c_type = self.type_name(scope, &decl.const_type)?;
        let name = Symbol::in_module(scope.module, decl.name.lexeme()).mangled();

        match &decl.value {
            _ if scope.external => {
                self.assembler
                    .append(Section::ConstDecls, &format!("extern {} {};", c_type, name));
            }
            None => {
                self.assembler
                    .append(Section::ConstDecls, &format!("extern {} {};", c_type, name));
            }
            Some(value) => {
                self.assembler
                    .append(Section::ConstDecls, &format!("{} {};", c_type, name));
                let value = self.render_tokens(scope, value)?;
                let assignment = format!("{} = {};", name, value);
                match self.const_inits.iter_mut().find(|(m, _)| m == scope.module) {
                    Some((_, lines)) => lines.push(assignment),
                    None => self
                        .const_inits
                        .push((String::from(scope.module), vec![assignment])),
                }
            }
        }
        Ok(())
    }

    fn structure(&mut self, scope: &EmitScope, decl: &StructDecl) -> BuildResult<()> {
        let name = Symbol::in_module(scope.module, decl.name.lexeme()).mangled();
        self.assembler.append_once(
            Section::Typedefs,
            &format!("typedef struct {} {};", name, name),
        );

        let mut definition = format!("struct {} {{\n", name);
        let mut depends_on = Vec::new();
        for field in &decl.fields {
            let c_type = self.type_name(scope, &field.param_type)?;
            definition.push_str(&format!("    {} {};\n", c_type, field.name.lexeme()));

            if field.param_type.pointer_depth == 0 {
                if let ResolvedType::Named(declaration) = scope.resolve_type(&field.param_type)? {
                    if let DeclarationKind::Struct(..) = declaration.kind {
                        depends_on.push(declaration.symbol.mangled());
                    }
                }
            }
        }
        if decl.fields.is_empty() {
            definition.push_str("    char _empty;\n");
        }
        definition.push_str("};");
        self.type_definitions.push(TypeDefinition {
            name,
            depends_on,
            text: definition,
        });
        Ok(())
    }

    fn interface(&mut self, scope: &EmitScope, decl: &InterfaceDecl) -> BuildResult<()> {
        let name = Symbol::in_module(scope.module, decl.name.lexeme()).mangled();
        self.assembler.append_once(
            Section::Typedefs,
            &format!("typedef struct {} {};", name, name),
        );

        let mut table = format!("struct {} {{\n    void* _object;\n    int _type_id;\n", name);
        for method in &decl.methods {
            let mut params = vec![String::from("void* _self")];
            for param in &method.parameters {
                let c_type = self.type_name(scope, &param.param_type)?;
                params.push(format!("{} {}", c_type, param.name.lexeme()));
            }
            table.push_str(&format!(
                "    {} (*{})({});\n",
                self.return_type(scope, method)?,
                method.name(),
                params.join(", ")
            ));
        }
        table.push_str("};");
        self.assembler.append(Section::InterfaceTables, &table);
        Ok(())
    }

    fn function(&mut self, scope: &EmitScope, decl: &FunctionDecl) -> BuildResult<()> {
        let signature = self.signature(scope, decl)?;
        let section = if scope.kind == FileKind::Synthesized {
            Section::StrFnDecls
        } else {
            Section::FnDecls
        };
        self.assembler.append(section, &format!("{};", signature));

        let body = match &decl.body {
            Some(body) if !scope.external => body,
            _ => return Ok(()),
        };

        let mangled = Symbol::in_module(scope.module, decl.name()).mangled();
        let mut text = format!("\n{} {{\n", signature);
        if self.profile {
            let counter = format!("_aq_prof_{}", mangled);
            self.assembler
                .append(Section::Profiling, &format!("uint64_t {} = 0;", counter));
            self.profiled.push(mangled.clone());
            text.push_str(&format!("    {}++;\n", counter));
        }
        for line in self.render_block(scope, body, 1)? {
            text.push_str(&line);
            text.push('\n');
        }
        text.push('}');
        self.assembler.push(&text);

        trace!(target: "codegen", "emitted {}", mangled);
        Ok(())
    }

    fn statement(&mut self, scope: &EmitScope, tokens: &[Token], _span: &Span) -> BuildResult<()> {
        let lines = self.render_block(scope, tokens, 1)?;
        self.script.extend(lines);
        Ok(())
    }
}
