use crate::errors::{CanopyError, CanopyResult};
use std::cell::RefCell;
use tree_sitter::{Language, Node, Parser, Tree};

thread_local! {
    static PARSER: RefCell<Parser> = RefCell::new(Parser::new());
}

/// A registered source language. Adding a language means adding a variant
/// here, a grammar crate, and a visitor module under `visit/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lang {
    C,
    Java,
}

impl Lang {
    pub const ALL: &'static [Lang] = &[Lang::C, Lang::Java];

    pub fn from_name(name: &str) -> CanopyResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "c" => Ok(Lang::C),
            "java" => Ok(Lang::Java),
            other => Err(CanopyError::UnsupportedLanguage(other.to_owned())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Lang::C => "c",
            Lang::Java => "java",
        }
    }

    pub(crate) fn grammar(self) -> Language {
        match self {
            Lang::C => Language::from(tree_sitter_c::LANGUAGE),
            Lang::Java => Language::from(tree_sitter_java::LANGUAGE),
        }
    }

    pub(crate) fn is_comment(self, kind: &str) -> bool {
        match self {
            Lang::C => kind == "comment",
            Lang::Java => matches!(kind, "line_comment" | "block_comment"),
        }
    }

    /// AST kinds that introduce a routine definition.
    pub(crate) fn is_routine(self, kind: &str) -> bool {
        match self {
            Lang::C => kind == "function_definition",
            Lang::Java => matches!(kind, "method_declaration" | "constructor_declaration"),
        }
    }
}

/// Parse `code`, rejecting inputs the visitors cannot do anything with.
pub(crate) fn parse(code: &[u8], lang: Lang) -> CanopyResult<Tree> {
    if code.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(CanopyError::EmptySource);
    }

    let tree = PARSER.with(|cell| {
        let mut parser = cell.borrow_mut();
        parser.set_language(&lang.grammar())?;
        parser
            .parse(code, None)
            .ok_or_else(|| CanopyError::Msg("tree-sitter returned no tree".into()))
    })?;

    if tree.root_node().is_error() {
        return Err(CanopyError::Syntax(format!(
            "unparseable {} source",
            lang.name()
        )));
    }
    Ok(tree)
}

/// Return the text of a node.
#[inline]
pub(crate) fn text_of(n: Node, code: &[u8]) -> String {
    std::str::from_utf8(&code[n.start_byte()..n.end_byte()])
        .map(|s| s.to_string())
        .unwrap_or_default()
}

#[inline]
pub(crate) fn span_of(n: Node) -> (usize, usize) {
    (n.start_byte(), n.end_byte())
}

/// Named children with comment nodes stripped out, so trivia never reaches
/// a visitor handler.
pub(crate) fn real_children<'t>(n: Node<'t>, lang: Lang) -> Vec<Node<'t>> {
    let mut cursor = n.walk();
    n.named_children(&mut cursor)
        .filter(|c| !lang.is_comment(c.kind()))
        .collect()
}

/// Collect every routine definition node in document order.
pub(crate) fn routines<'t>(root: Node<'t>, lang: Lang) -> Vec<Node<'t>> {
    fn walk<'t>(n: Node<'t>, lang: Lang, out: &mut Vec<Node<'t>>) {
        if lang.is_routine(n.kind()) {
            out.push(n);
        }
        let mut cursor = n.walk();
        for child in n.named_children(&mut cursor) {
            walk(child, lang, out);
        }
    }
    let mut out = Vec::new();
    walk(root, lang, &mut out);
    out
}

#[test]
fn unknown_language_is_rejected() {
    let err = Lang::from_name("cobol").unwrap_err();
    assert!(matches!(err, CanopyError::UnsupportedLanguage(l) if l == "cobol"));
}

#[test]
fn blank_source_is_rejected() {
    let err = parse(b"  \n\t ", Lang::C).unwrap_err();
    assert!(matches!(err, CanopyError::EmptySource));
}

#[test]
fn c_functions_are_found_in_order() {
    let code = b"int a() { return 1; }\nint b() { return 2; }\n";
    let tree = parse(code, Lang::C).unwrap();
    let fns = routines(tree.root_node(), Lang::C);
    assert_eq!(fns.len(), 2);
    assert!(fns[0].start_byte() < fns[1].start_byte());
}

#[test]
fn java_methods_inside_classes_are_found() {
    let code = b"class T { int f() { return 0; } T() {} }";
    let tree = parse(code, Lang::Java).unwrap();
    let fns = routines(tree.root_node(), Lang::Java);
    assert_eq!(fns.len(), 2);
}
