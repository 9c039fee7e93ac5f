use super::{EmitScope, ResolvedType};
use crate::error::BuildResult;
use crate::library::*;
use crate::parsing::*;
use crate::registry::FileKind;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

struct QueuedStruct {
    module: String,
    decl: StructDecl,
    aliases: Rc<HashMap<String, String>>,
}

/// Collects struct declarations during the declarations sweep and derives a `NAME_str`
/// helper for each one, as aquila source grouped per module.
pub struct HelperQueue {
    enabled: bool,
    queued: Vec<QueuedStruct>,
}

impl HelperQueue {
    pub fn new(enabled: bool) -> Self {
        HelperQueue {
            enabled,
            queued: Vec::new(),
        }
    }

    pub fn struct_declared(
        &mut self,
        module: &str,
        decl: &StructDecl,
        aliases: Rc<HashMap<String, String>>,
    ) {
        if !self.enabled {
            return;
        }
        self.queued.push(QueuedStruct {
            module: String::from(module),
            decl: decl.clone(),
            aliases,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    /// Drains the queue into `(module, source)` blobs, one per module in declaration order.
    /// A struct whose helper the user already wrote is skipped.
    pub fn synthesize(&mut self, symbols: &SymbolTable) -> BuildResult<Vec<(String, String)>> {
        let queued = std::mem::take(&mut self.queued);
        let with_helper: HashSet<(String, String)> = queued
            .iter()
            .filter(|q| !user_defined(symbols, q))
            .map(|q| (q.module.clone(), q.decl.name.lexeme().to_string()))
            .collect();

        let mut blobs: Vec<BlobBuilder> = Vec::new();
        for queued in queued.iter().filter(|q| !user_defined(symbols, q)) {
            let index = match blobs.iter().position(|b| b.module == queued.module) {
                Some(index) => index,
                None => {
                    blobs.push(BlobBuilder::new(&queued.module));
                    blobs.len() - 1
                }
            };
            blobs[index].add(queued, symbols, &with_helper)?;
        }

        let blobs: Vec<(String, String)> = blobs.into_iter().map(|b| b.finish()).collect();
        for (module, _) in &blobs {
            debug!(target: "codegen", "synthesized str helpers for {}", module);
        }
        Ok(blobs)
    }
}

fn user_defined(symbols: &SymbolTable, queued: &QueuedStruct) -> bool {
    let helper = helper_name(queued.decl.name.lexeme());
    symbols.lookup_exact(&queued.module, &helper).is_some()
}

fn helper_name(struct_name: &str) -> String {
    format!("{}_str", struct_name)
}

struct BlobBuilder {
    module: String,
    imports: Vec<(String, String)>,
    functions: String,
}

impl BlobBuilder {
    fn new(module: &str) -> Self {
        BlobBuilder {
            module: String::from(module),
            imports: Vec::new(),
            functions: String::new(),
        }
    }

    fn import(&mut self, alias: &str, module: &str) {
        if !self.imports.iter().any(|(a, _)| a == alias) {
            self.imports.push((String::from(alias), String::from(module)));
        }
    }

    fn add(
        &mut self,
        queued: &QueuedStruct,
        symbols: &SymbolTable,
        with_helper: &HashSet<(String, String)>,
    ) -> BuildResult<()> {
        let scope = EmitScope::new(&queued.module, FileKind::Source, &queued.aliases, symbols);
        let name = queued.decl.name.lexeme();

        let mut format = format!("{}{{", name);
        let mut arguments = Vec::new();
        for (index, field) in queued.decl.fields.iter().enumerate() {
            if index > 0 {
                format.push_str(", ");
            }
            let field_name = field.name.lexeme();
            let access = format!("_it.{}", field_name);
            let (specifier, argument) =
                self.field_format(&scope, &field.param_type, &access, with_helper)?;
            format.push_str(&format!("{}: {}", field_name, specifier));
            if let Some(argument) = argument {
                arguments.push(argument);
            }
        }
        format.push('}');

        let mut call = format!("snprintf(_buf, AQ_STR_BUF_LEN, \"{}\"", format);
        for argument in arguments {
            call.push_str(", ");
            call.push_str(&argument);
        }
        call.push_str(");");

        self.functions.push_str(&format!(
            "\nfn {helper}(_it {name}) string {{\n    string _buf = malloc(AQ_STR_BUF_LEN);\n    {call}\n    return _buf;\n}}\n",
            helper = helper_name(name),
            name = name,
            call = call
        ));
        Ok(())
    }

    /// printf specifier for one field, and the argument it consumes if any.
    fn field_format(
        &mut self,
        scope: &EmitScope,
        field_type: &TypeRef,
        access: &str,
        with_helper: &HashSet<(String, String)>,
    ) -> BuildResult<(String, Option<String>)> {
        if field_type.pointer_depth > 0 {
            return Ok((String::from("%p"), Some(format!("(void*){}", access))));
        }

        let declaration = match scope.resolve_type(field_type)? {
            ResolvedType::Scalar(_) => return Ok(scalar_format(field_type.name.lexeme(), access)),
            ResolvedType::Named(declaration) => declaration,
        };

        let struct_name = declaration.symbol.last_component();
        let has_helper = matches!(declaration.kind, DeclarationKind::Struct(..))
            && with_helper.contains(&(declaration.module.clone(), String::from(struct_name)));
        if !has_helper {
            return Ok((format!("<{}>", field_type), None));
        }

        let callee = match &field_type.qualifier {
            Some(alias) => {
                self.import(alias.lexeme(), &declaration.module);
                format!("{}.{}", alias.lexeme(), helper_name(struct_name))
            }
            None => helper_name(struct_name),
        };
        Ok((String::from("%s"), Some(format!("{}({})", callee, access))))
    }

    fn finish(self) -> (String, String) {
        let mut text = format!("module {}\n", self.module);
        for (alias, module) in &self.imports {
            text.push_str(&format!("import {} as {}\n", module, alias));
        }
        text.push_str(&self.functions);
        (self.module, text)
    }
}

fn scalar_format(name: &str, access: &str) -> (String, Option<String>) {
    let (specifier, argument) = match name {
        "int" | "i8" | "i16" | "i32" => ("%d", String::from(access)),
        "i64" => ("%lld", format!("(long long){}", access)),
        "u8" | "byte" | "u16" | "u32" => ("%u", format!("(unsigned){}", access)),
        "u64" => ("%llu", format!("(unsigned long long){}", access)),
        "f32" | "f64" => ("%g", format!("(double){}", access)),
        "bool" => ("%s", format!("{} ? \"true\" : \"false\"", access)),
        "string" => ("'%s'", String::from(access)),
        _ => ("%p", format!("(void*){}", access)),
    };
    (String::from(specifier), Some(argument))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexing::Lexer;
    use crate::source;

    fn struct_decl(text: &str) -> StructDecl {
        let tokens = Lexer::new(source::text(text)).lex().unwrap();
        let items = Parser::new(&tokens).items().unwrap();
        match &items[0].kind {
            ItemKind::Struct(decl) => decl.clone(),
            _ => panic!("expected struct"),
        }
    }

    fn declare(symbols: &mut SymbolTable, module: &str, decl: &StructDecl) {
        symbols
            .insert(Declaration {
                symbol: Symbol::in_module(module, decl.name.lexeme()),
                module: String::from(module),
                kind: DeclarationKind::Struct(decl.clone()),
                span: decl.span.clone(),
                external: false,
                aliases: Rc::new(HashMap::new()),
            })
            .unwrap();
    }

    #[test]
    fn helper_formats_each_field() {
        let point = struct_decl("struct Point { x int, label string, live bool }");
        let mut symbols = SymbolTable::new();
        declare(&mut symbols, "main", &point);

        let mut queue = HelperQueue::new(true);
        queue.struct_declared("main", &point, Rc::new(HashMap::new()));
        let blobs = queue.synthesize(&symbols).unwrap();

        assert_eq!(blobs.len(), 1);
        let (module, text) = &blobs[0];
        assert_eq!(module, "main");
        assert!(text.starts_with("module main\n"));
        assert!(text.contains("fn Point_str(_it Point) string {"));
        assert!(text.contains("\"Point{x: %d, label: '%s', live: %s}\""));
        assert!(text.contains("_it.live ? \"true\" : \"false\""));
        assert!(queue.is_empty());
    }

    #[test]
    fn nested_structs_call_their_helper() {
        let inner = struct_decl("struct Inner { n u64 }");
        let outer = struct_decl("struct Outer { inner Inner, next &Outer }");
        let mut symbols = SymbolTable::new();
        declare(&mut symbols, "main", &inner);
        declare(&mut symbols, "main", &outer);

        let mut queue = HelperQueue::new(true);
        queue.struct_declared("main", &inner, Rc::new(HashMap::new()));
        queue.struct_declared("main", &outer, Rc::new(HashMap::new()));
        let blobs = queue.synthesize(&symbols).unwrap();

        let text = &blobs[0].1;
        assert!(text.contains("%llu"));
        assert!(text.contains("Inner_str(_it.inner)"));
        assert!(text.contains("next: %p"));
    }

    #[test]
    fn disabled_queue_and_user_helpers_produce_nothing() {
        let point = struct_decl("struct Point { x int }");
        let mut symbols = SymbolTable::new();
        declare(&mut symbols, "main", &point);

        let mut disabled = HelperQueue::new(false);
        disabled.struct_declared("main", &point, Rc::new(HashMap::new()));
        assert!(disabled.is_empty());

        let helper = struct_decl("struct Point_str { y int }");
        declare(&mut symbols, "main", &helper);
        let mut queue = HelperQueue::new(true);
        queue.struct_declared("main", &point, Rc::new(HashMap::new()));
        assert!(queue.synthesize(&symbols).unwrap().is_empty());
    }
}
