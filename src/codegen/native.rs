use super::{CodeEmitter, EmitScope};
use crate::error::{BuildError, BuildResult};
use crate::lexing::*;
use crate::library::*;
use crate::parsing::*;
use crate::source::Span;
use log::{debug, trace};
use std::collections::HashMap;

const BASE_ADDRESS: u64 = 0x40_0000;
const ELF_HEADER_SIZE: usize = 64;
const PROGRAM_HEADER_SIZE: usize = 56;
const SEGMENT_ALIGN: u64 = 0x1000;

const CALL: u8 = 0xE8;
const RET: u8 = 0xC3;
const MOV_EAX_IMM: u8 = 0xB8;
const MOV_EDI_IMM: u8 = 0xBF;
const MOV_EDI_EAX: [u8; 2] = [0x89, 0xC7];
const XOR_EAX_EAX: [u8; 2] = [0x31, 0xC0];
const SYSCALL: [u8; 2] = [0x0F, 0x05];
const SYS_EXIT: i32 = 60;

struct Fixup {
    at: usize,
    callee: String,
    span: Option<Span>,
}

enum NativeStatement {
    ReturnValue(i32),
    ReturnCall(String),
    Call(String),
    Exit(i32),
}

/// Encodes a tiny statement subset straight to x86_64 and wraps it in a static ELF64 image.
#[derive(Default)]
pub struct NativeEmitter {
    image: Vec<u8>,
    functions: HashMap<String, usize>,
    fixups: Vec<Fixup>,
    entry: usize,
}

impl NativeEmitter {
    pub fn new() -> Self {
        NativeEmitter::default()
    }

    /// Reserves room for the ELF and program headers and writes the `_start` stub.
    pub fn header(&mut self) {
        self.image = vec![0; ELF_HEADER_SIZE + PROGRAM_HEADER_SIZE];
        self.entry = self.image.len();

        self.call(&Symbol::main_symbol().mangled(), None);
        self.image.extend_from_slice(&MOV_EDI_EAX);
        self.mov_eax(SYS_EXIT);
        self.image.extend_from_slice(&SYSCALL);
    }

    /// Patches every call site and fills in the headers. Returns the finished image.
    pub fn footer(&mut self) -> BuildResult<Vec<u8>> {
        for fixup in &self.fixups {
            let target = match self.functions.get(&fixup.callee) {
                Some(target) => *target,
                None => {
                    let message = format!("call to undefined function `{}`", fixup.callee);
                    return Err(match &fixup.span {
                        Some(span) => BuildError::parse(span, &message),
                        None => BuildError::structural(None, &message),
                    });
                }
            };
            let relative = target as i64 - (fixup.at + 4) as i64;
            self.image[fixup.at..fixup.at + 4].copy_from_slice(&(relative as i32).to_le_bytes());
        }

        let length = self.image.len() as u64;
        let mut headers = Vec::with_capacity(ELF_HEADER_SIZE + PROGRAM_HEADER_SIZE);

        headers.extend_from_slice(&[0x7F, b'E', b'L', b'F', 2, 1, 1, 0]);
        headers.extend_from_slice(&[0; 8]);
        headers.extend_from_slice(&2u16.to_le_bytes()); // ET_EXEC
        headers.extend_from_slice(&0x3Eu16.to_le_bytes()); // x86_64
        headers.extend_from_slice(&1u32.to_le_bytes());
        headers.extend_from_slice(&(BASE_ADDRESS + self.entry as u64).to_le_bytes());
        headers.extend_from_slice(&(ELF_HEADER_SIZE as u64).to_le_bytes());
        headers.extend_from_slice(&0u64.to_le_bytes());
        headers.extend_from_slice(&0u32.to_le_bytes());
        headers.extend_from_slice(&(ELF_HEADER_SIZE as u16).to_le_bytes());
        headers.extend_from_slice(&(PROGRAM_HEADER_SIZE as u16).to_le_bytes());
        headers.extend_from_slice(&1u16.to_le_bytes());
        headers.extend_from_slice(&[0; 6]);

        headers.extend_from_slice(&1u32.to_le_bytes()); // PT_LOAD
        headers.extend_from_slice(&5u32.to_le_bytes()); // R+X
        headers.extend_from_slice(&0u64.to_le_bytes());
        headers.extend_from_slice(&BASE_ADDRESS.to_le_bytes());
        headers.extend_from_slice(&BASE_ADDRESS.to_le_bytes());
        headers.extend_from_slice(&length.to_le_bytes());
        headers.extend_from_slice(&length.to_le_bytes());
        headers.extend_from_slice(&SEGMENT_ALIGN.to_le_bytes());

        self.image[..headers.len()].copy_from_slice(&headers);
        debug!(target: "codegen", "native image: {} bytes, {} functions", length, self.functions.len());
        Ok(std::mem::take(&mut self.image))
    }

    pub fn entry_address(&self) -> u64 {
        BASE_ADDRESS + self.entry as u64
    }

    fn call(&mut self, callee: &str, span: Option<Span>) {
        self.image.push(CALL);
        self.fixups.push(Fixup {
            at: self.image.len(),
            callee: String::from(callee),
            span,
        });
        self.image.extend_from_slice(&[0; 4]);
    }

    fn mov_eax(&mut self, value: i32) {
        self.image.push(MOV_EAX_IMM);
        self.image.extend_from_slice(&value.to_le_bytes());
    }

    fn encode(&mut self, statement: NativeStatement, span: &Span) {
        match statement {
            NativeStatement::ReturnValue(value) => {
                self.mov_eax(value);
                self.image.push(RET);
            }
            NativeStatement::ReturnCall(callee) => {
                self.call(&callee, Some(span.clone()));
                self.image.push(RET);
            }
            NativeStatement::Call(callee) => self.call(&callee, Some(span.clone())),
            NativeStatement::Exit(code) => {
                self.image.push(MOV_EDI_IMM);
                self.image.extend_from_slice(&code.to_le_bytes());
                self.mov_eax(SYS_EXIT);
                self.image.extend_from_slice(&SYSCALL);
            }
        }
    }
}

fn unsupported(tokens: &[Token]) -> BuildError {
    let text: Vec<&str> = tokens.iter().map(|t| t.lexeme()).collect();
    let message = format!(
        "unsupported statement for the native backend: `{}`",
        text.join(" ")
    );
    match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => BuildError::parse(&first.span.span_to(&last.span), &message),
        _ => BuildError::structural(None, &message),
    }
}

fn immediate(tokens: &[Token]) -> Option<i32> {
    match tokens {
        [number] if number.is(TokenKind::Number) => number.lexeme().parse().ok(),
        [minus, number] if minus.lexeme() == "-" && number.is(TokenKind::Number) => {
            number.lexeme().parse::<i32>().ok().map(|n| -n)
        }
        _ => None,
    }
}

fn callee(scope: &EmitScope, tokens: &[Token]) -> BuildResult<Option<String>> {
    let (alias, name, rest) = match tokens {
        [alias, dot, name, rest @ ..] if dot.is(TokenKind::Period) => (Some(alias), name, rest),
        [name, rest @ ..] if name.is(TokenKind::Identifier) => (None, name, rest),
        _ => return Ok(None),
    };
    let is_empty_call = matches!(rest, [open, close]
        if open.is(TokenKind::LeftParen) && close.is(TokenKind::RightParen));
    if !is_empty_call {
        return Ok(None);
    }

    let declaration = match alias {
        Some(alias) => scope.lookup_qualified(alias, name)?,
        None => match scope.lookup(name.lexeme()) {
            Some(declaration) => declaration,
            // Left for the footer to report once every function is known.
            None => return Ok(Some(Symbol::in_module(scope.module, name.lexeme()).mangled())),
        },
    };
    Ok(declaration
        .as_function()
        .map(|_| declaration.symbol.mangled()))
}

fn parse_statement(scope: &EmitScope, tokens: &[Token]) -> BuildResult<NativeStatement> {
    let statement = match tokens {
        [keyword, rest @ ..] if keyword.lexeme() == "return" => match immediate(rest) {
            Some(value) => Some(NativeStatement::ReturnValue(value)),
            None => callee(scope, rest)?.map(NativeStatement::ReturnCall),
        },
        [name, open, inner @ .., close]
            if name.lexeme() == "exit"
                && open.is(TokenKind::LeftParen)
                && close.is(TokenKind::RightParen) =>
        {
            immediate(inner).map(NativeStatement::Exit)
        }
        _ => callee(scope, tokens)?.map(NativeStatement::Call),
    };
    statement.ok_or_else(|| unsupported(tokens))
}

impl CodeEmitter for NativeEmitter {
    fn directive(&mut self, _scope: &EmitScope, _item: &Item) -> BuildResult<()> {
        Ok(())
    }

    fn constant(&mut self, _scope: &EmitScope, decl: &ConstDecl) -> BuildResult<()> {
        Err(BuildError::parse(
            &decl.span,
            "constants are not supported by the native backend",
        ))
    }

    fn structure(&mut self, _scope: &EmitScope, _decl: &StructDecl) -> BuildResult<()> {
        Ok(())
    }

    fn interface(&mut self, _scope: &EmitScope, _decl: &InterfaceDecl) -> BuildResult<()> {
        Ok(())
    }

    fn function(&mut self, scope: &EmitScope, decl: &FunctionDecl) -> BuildResult<()> {
        let body = match &decl.body {
            Some(body) => body,
            None => return Ok(()),
        };
        if let Some(param) = decl.parameters.first() {
            return Err(BuildError::parse(
                &param.name.span,
                "the native backend only supports functions without parameters",
            ));
        }

        let name = Symbol::in_module(scope.module, decl.name()).mangled();
        self.functions.insert(name.clone(), self.image.len());
        trace!(target: "codegen", "native {} at {:#x}", name, self.image.len());

        for statement in body.split(|t| t.is(TokenKind::Semicolon)) {
            if statement.is_empty() {
                continue;
            }
            let span = statement[0].span.span_to(&statement[statement.len() - 1].span);
            let parsed = parse_statement(scope, statement)?;
            self.encode(parsed, &span);
        }

        self.image.extend_from_slice(&XOR_EAX_EAX);
        self.image.push(RET);
        Ok(())
    }

    fn statement(&mut self, _scope: &EmitScope, tokens: &[Token], _span: &Span) -> BuildResult<()> {
        Err(unsupported(tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FileKind;
    use crate::source;
    use std::rc::Rc;

    fn compile(text: &str) -> BuildResult<(Vec<u8>, u64)> {
        let tokens = Lexer::new(source::text(text)).lex().unwrap();
        let items = Parser::new(&tokens).items().unwrap();
        let mut symbols = SymbolTable::new();
        for item in &items {
            if let ItemKind::Function(decl) = &item.kind {
                symbols.insert(Declaration {
                    symbol: Symbol::in_module("main", decl.name()),
                    module: String::from("main"),
                    kind: DeclarationKind::Function(decl.clone()),
                    span: decl.span.clone(),
                    external: false,
                    aliases: Rc::new(HashMap::new()),
                })?;
            }
        }

        let aliases = HashMap::new();
        let scope = EmitScope::new("main", FileKind::Source, &aliases, &symbols);
        let mut emitter = NativeEmitter::new();
        emitter.header();
        for item in &items {
            if let ItemKind::Function(decl) = &item.kind {
                emitter.function(&scope, decl)?;
            }
        }
        let entry = emitter.entry_address();
        Ok((emitter.footer()?, entry))
    }

    #[test]
    fn image_has_elf_header_and_entry() {
        let (image, entry) = compile("fn helper() int { return 7; }\nfn main() int { return helper(); }").unwrap();
        assert_eq!(&image[..4], &[0x7F, b'E', b'L', b'F']);
        assert_eq!(u16::from_le_bytes([image[18], image[19]]), 0x3E);

        let mut entry_bytes = [0; 8];
        entry_bytes.copy_from_slice(&image[24..32]);
        assert_eq!(u64::from_le_bytes(entry_bytes), entry);
        assert_eq!(entry, 0x40_0000 + 120);
        assert_eq!(image[120], 0xE8);
    }

    #[test]
    fn exit_and_return_encodings() {
        let (image, _) = compile("fn main() int { exit(3); }").unwrap();
        let body = &image[120 + 14..];
        assert_eq!(&body[..5], &[0xBF, 3, 0, 0, 0]);
        assert_eq!(&body[5..10], &[0xB8, 60, 0, 0, 0]);
        assert_eq!(&body[10..12], &[0x0F, 0x05]);
        assert_eq!(&body[12..], &[0x31, 0xC0, 0xC3]);
    }

    #[test]
    fn unsupported_statement_is_positioned() {
        let error = compile("fn main() int { int x = 1; return x; }").unwrap_err();
        assert!(error.message().contains("unsupported statement"));
        assert!(error.diagnostic().and_then(|d| d.span.as_ref()).is_some());
    }

    #[test]
    fn unknown_callee_fails_in_footer() {
        let error = compile("fn main() int { missing(); }").unwrap_err();
        assert!(error.message().contains("missing"));
    }
}
