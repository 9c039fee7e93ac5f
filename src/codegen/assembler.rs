use log::trace;
use std::collections::HashSet;

/// Declaration-bearing sections, in the order they are concatenated into the reserved slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Section {
    Defines,
    Includes,
    Typedefs,
    TypeDefinitions,
    StrFnDecls,
    FnDecls,
    InterfaceTables,
    ConstDecls,
    ThreadArgs,
    Profiling,
}

impl Section {
    pub const ORDER: [Section; 10] = [
        Section::Defines,
        Section::Includes,
        Section::Typedefs,
        Section::TypeDefinitions,
        Section::StrFnDecls,
        Section::FnDecls,
        Section::InterfaceTables,
        Section::ConstDecls,
        Section::ThreadArgs,
        Section::Profiling,
    ];

    fn index(self) -> usize {
        self as usize
    }

    fn banner(self) -> &'static str {
        match self {
            Section::Defines => "// defines",
            Section::Includes => "// includes",
            Section::Typedefs => "// typedefs",
            Section::TypeDefinitions => "// type definitions",
            Section::StrFnDecls => "// str helpers",
            Section::FnDecls => "// function declarations",
            Section::InterfaceTables => "// interface tables",
            Section::ConstDecls => "// constants",
            Section::ThreadArgs => "// thread arguments",
            Section::Profiling => "// profiling counters",
        }
    }
}

enum StreamItem {
    Text(String),
    Declarations(Option<String>),
}

/// Buffers generated C as named sections plus one statement stream.
///
/// The first stream item is a slot reserved before any parsing starts. `finalize` fills it
/// with every declaration section once the whole program has been seen.
pub struct OutputAssembler {
    sections: Vec<String>,
    seen: HashSet<(Section, String)>,
    stream: Vec<StreamItem>,
    slot: usize,
    profiling: bool,
    finalized: bool,
    substitutions: usize,
    last_rendered: Option<String>,
}

impl OutputAssembler {
    pub fn new(profiling: bool) -> Self {
        OutputAssembler {
            sections: vec![String::new(); Section::ORDER.len()],
            seen: HashSet::new(),
            stream: vec![StreamItem::Declarations(None)],
            slot: 0,
            profiling,
            finalized: false,
            substitutions: 0,
            last_rendered: None,
        }
    }

    pub fn append(&mut self, section: Section, text: &str) {
        debug_assert!(
            !self.finalized,
            "declaration section {:?} appended after finalize",
            section
        );
        let buffer = &mut self.sections[section.index()];
        buffer.push_str(text);
        if !text.ends_with('\n') {
            buffer.push('\n');
        }
    }

    /// Appends `text` unless the same text already went into `section`.
    pub fn append_once(&mut self, section: Section, text: &str) -> bool {
        if self.seen.insert((section, String::from(text))) {
            self.append(section, text);
            true
        } else {
            false
        }
    }

    pub fn section(&self, section: Section) -> &str {
        &self.sections[section.index()]
    }

    pub fn push(&mut self, text: &str) {
        let mut text = String::from(text);
        if !text.ends_with('\n') {
            text.push('\n');
        }
        self.stream.push(StreamItem::Text(text));
    }

    pub fn render_declarations(&self) -> String {
        let mut rendered = String::new();
        for section in Section::ORDER.iter() {
            if *section == Section::Profiling && !self.profiling {
                continue;
            }
            let body = &self.sections[section.index()];
            if body.is_empty() {
                continue;
            }
            rendered.push_str(section.banner());
            rendered.push('\n');
            rendered.push_str(body);
            rendered.push('\n');
        }
        rendered
    }

    /// Substitutes the declarations into the reserved slot. Calling it again on unchanged
    /// state reproduces the same text.
    pub fn finalize(&mut self) {
        let rendered = self.render_declarations();
        if self.last_rendered.as_ref() != Some(&rendered) {
            self.substitutions += 1;
        }
        trace!(target: "codegen", "declarations block: {} bytes", rendered.len());
        self.last_rendered = Some(rendered.clone());
        self.stream[self.slot] = StreamItem::Declarations(Some(rendered));
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn substitutions(&self) -> usize {
        self.substitutions
    }

    pub fn document(&self) -> String {
        let mut document = String::new();
        for item in &self.stream {
            match item {
                StreamItem::Text(text) => document.push_str(text),
                StreamItem::Declarations(Some(text)) => document.push_str(text),
                StreamItem::Declarations(None) => (),
            }
        }
        document
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn declarations_land_before_stream_in_fixed_order() {
        let mut assembler = OutputAssembler::new(false);
        assembler.push("int f(void) { return 1; }");
        assembler.append(Section::FnDecls, "int f(void);");
        assembler.append(Section::Includes, "#include <stdio.h>");
        assembler.append(Section::Defines, "#define X 1");
        assembler.append(Section::Profiling, "uint64_t counter;");
        assembler.finalize();

        assert_eq!(
            assembler.document(),
            "// defines\n#define X 1\n\n// includes\n#include <stdio.h>\n\n// function declarations\nint f(void);\n\nint f(void) { return 1; }\n"
        );
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut assembler = OutputAssembler::new(true);
        assembler.append(Section::ConstDecls, "int main__X;");
        assembler.append(Section::Profiling, "uint64_t counter;");
        assembler.push("void g(void) {}");

        assembler.finalize();
        let first = assembler.document();
        assembler.finalize();
        let second = assembler.document();

        assert_eq!(first, second);
        assert_eq!(assembler.substitutions(), 1);
        assert!(first.contains("uint64_t counter;"));
    }

    #[test]
    fn unfinalized_slot_is_empty() {
        let mut assembler = OutputAssembler::new(false);
        assembler.append(Section::FnDecls, "int f(void);");
        assembler.push("x");
        assert_eq!(assembler.document(), "x\n");
        assert!(!assembler.is_finalized());
    }

    #[test]
    fn append_once_deduplicates() {
        let mut assembler = OutputAssembler::new(false);
        assert!(assembler.append_once(Section::Includes, "#include <math.h>"));
        assert!(!assembler.append_once(Section::Includes, "#include <math.h>"));
        assert_eq!(assembler.section(Section::Includes), "#include <math.h>\n");
    }
}
