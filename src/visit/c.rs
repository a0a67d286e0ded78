//! C handlers: per-kind CFG emission plus the def/use/call scanner.

use super::{CfgBuilder, Construct, Fragment};
use crate::ast::{real_children, span_of, text_of};
use crate::cfg::{CallSite, EdgeLabel, Metadata, NodeId, NodeKind};
use tree_sitter::Node;

pub(super) static KINDS: phf::Map<&'static str, Construct> = phf::phf_map! {
    "translation_unit" => Construct::Block,
    "compound_statement" => Construct::Block,
    "if_statement" => Construct::If,
    "while_statement" => Construct::While,
    "do_statement" => Construct::DoWhile,
    "for_statement" => Construct::For,
    "switch_statement" => Construct::Switch,
    "break_statement" => Construct::Break,
    "continue_statement" => Construct::Continue,
    "return_statement" => Construct::Return,
    "goto_statement" => Construct::Goto,
    "labeled_statement" => Construct::Label,
    "comment" => Construct::Trivia,
};

pub(super) fn visit(b: &mut CfgBuilder, node: Node) -> Fragment {
    match KINDS.get(node.kind()).copied().unwrap_or(Construct::Other) {
        Construct::Block => b.seq(node),
        Construct::If => if_stmt(b, node),
        Construct::While => {
            match (
                node.child_by_field_name("condition"),
                node.child_by_field_name("body"),
            ) {
                (Some(cond), Some(body)) => b.while_loop(cond, body),
                (None, _) => b.malformed(node, "condition"),
                (_, None) => b.malformed(node, "body"),
            }
        }
        Construct::DoWhile => {
            match (
                node.child_by_field_name("body"),
                node.child_by_field_name("condition"),
            ) {
                (Some(body), Some(cond)) => b.do_while(body, cond),
                (None, _) => b.malformed(node, "body"),
                (_, None) => b.malformed(node, "condition"),
            }
        }
        Construct::For => match node.child_by_field_name("body") {
            Some(body) => b.for_loop(
                node.child_by_field_name("initializer"),
                node.child_by_field_name("condition"),
                node.child_by_field_name("update"),
                body,
            ),
            None => b.malformed(node, "body"),
        },
        Construct::Switch => switch_stmt(b, node),
        Construct::Break => b.break_stmt(node),
        Construct::Continue => b.continue_stmt(node),
        Construct::Return => b.return_stmt(node),
        Construct::Goto => {
            let label = node.child_by_field_name("label");
            b.goto_stmt(node, label)
        }
        Construct::Label => match node.child_by_field_name("label") {
            Some(name) => {
                let inner = real_children(node, b.lang)
                    .into_iter()
                    .find(|c| c.id() != name.id());
                b.label_stmt(name, inner)
            }
            None => b.statement(node),
        },
        Construct::Trivia => b.placeholder_fragment(),
        _ => b.statement(node),
    }
}

fn if_stmt(b: &mut CfgBuilder, node: Node) -> Fragment {
    let Some(cond) = node.child_by_field_name("condition") else {
        return b.malformed(node, "condition");
    };
    let Some(then_n) = node.child_by_field_name("consequence") else {
        return b.malformed(node, "body");
    };
    // the else branch sits inside an else_clause wrapper
    let else_n = node
        .child_by_field_name("alternative")
        .and_then(|alt| match alt.kind() {
            "else_clause" => real_children(alt, b.lang).into_iter().next(),
            _ => Some(alt),
        });
    b.conditional(cond, then_n, else_n)
}

/// `case`/`default` labels become passthrough nodes carrying the labeled
/// edge from the switch head; a group's open exits fall through into the
/// next group in textual order.
fn switch_stmt(b: &mut CfgBuilder, node: Node) -> Fragment {
    let Some(selector) = node.child_by_field_name("condition") else {
        return b.malformed(node, "selector");
    };
    let Some(body) = node.child_by_field_name("body") else {
        return b.malformed(node, "body");
    };

    let head = b.emit(NodeKind::SwitchHead, super::unwrap_parens(selector), Some(selector));
    let brk = b.placeholder();
    b.push_switch(brk, head);

    let mut open: Vec<NodeId> = Vec::new();
    for child in real_children(body, b.lang) {
        if child.kind() == "case_statement" {
            let value = child.child_by_field_name("value");
            let case_id = match value {
                Some(v) => {
                    let id = b.graph.new_node(
                        NodeKind::Case,
                        text_of(v, b.code),
                        Some(span_of(child)),
                    );
                    b.graph
                        .add_edge(head, id, Some(EdgeLabel::Case(text_of(v, b.code))));
                    id
                }
                None => {
                    let id =
                        b.graph
                            .new_node(NodeKind::Default, "default", Some(span_of(child)));
                    b.graph.add_edge(head, id, Some(EdgeLabel::Default));
                    id
                }
            };
            for &e in &open {
                b.graph.add_edge(e, case_id, None);
            }
            let mut frag = Fragment::new(case_id);
            for stmt in real_children(child, b.lang) {
                if value.is_some_and(|v| v.id() == stmt.id()) {
                    continue;
                }
                let f = visit(b, stmt);
                frag = b.chain(frag, f);
            }
            open = frag.exits;
        } else {
            // statements outside any case keep the fall-through frontier
            let f = visit(b, child);
            for &e in &open {
                b.graph.add_edge(e, f.entry, None);
            }
            open = f.exits;
        }
    }
    for &e in &open {
        b.graph.add_edge(e, brk, None);
    }
    b.pop_switch();
    Fragment {
        entry: head,
        exits: vec![brk],
    }
}

// -------------------------------------------------------------------------
//  Routine signature
// -------------------------------------------------------------------------

pub(super) fn signature(node: Node, code: &[u8]) -> (Option<String>, Vec<String>) {
    let mut name = None;
    let mut params = Vec::new();
    if let Some(mut d) = node.child_by_field_name("declarator") {
        // unwrap pointer declarators around `int *f(...)`
        while d.kind() != "function_declarator" {
            match d.child_by_field_name("declarator") {
                Some(inner) => d = inner,
                None => break,
            }
        }
        if d.kind() == "function_declarator" {
            name = d
                .child_by_field_name("declarator")
                .and_then(|n| declarator_name(n, code));
            if let Some(list) = d.child_by_field_name("parameters") {
                let mut cursor = list.walk();
                for p in list.named_children(&mut cursor) {
                    if p.kind() == "parameter_declaration"
                        && let Some(pd) = p.child_by_field_name("declarator")
                        && let Some(pname) = declarator_name(pd, code)
                    {
                        params.push(pname);
                    }
                }
            }
        }
    }
    (name, params)
}

/// Innermost identifier of a (possibly nested) declarator.
fn declarator_name(mut n: Node, code: &[u8]) -> Option<String> {
    loop {
        match n.kind() {
            "identifier" => return Some(text_of(n, code)),
            "pointer_declarator"
            | "array_declarator"
            | "function_declarator"
            | "parenthesized_declarator"
            | "init_declarator" => {
                n = n
                    .child_by_field_name("declarator")
                    .or_else(|| n.named_child(0))?;
            }
            _ => return None,
        }
    }
}

// -------------------------------------------------------------------------
//  Identifier scanner
// -------------------------------------------------------------------------

/// Walk a statement's expressions classifying identifiers into
/// defs/uses/calls. Field names (`s.len`) are `field_identifier` nodes and
/// never collide with variable identifiers.
pub(super) fn scan(node: Node, code: &[u8], meta: &mut Metadata) {
    match node.kind() {
        "comment" => {}
        "declaration" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                match child.kind() {
                    "init_declarator" => {
                        if let Some(d) = child.child_by_field_name("declarator")
                            && let Some(name) = declarator_name(d, code)
                        {
                            meta.defs.insert(name);
                        }
                        if let Some(v) = child.child_by_field_name("value") {
                            scan(v, code, meta);
                        }
                    }
                    "identifier" => {
                        meta.defs.insert(text_of(child, code));
                    }
                    "pointer_declarator" | "array_declarator" => {
                        if let Some(name) = declarator_name(child, code) {
                            meta.defs.insert(name);
                        }
                    }
                    _ => {}
                }
            }
        }
        "assignment_expression" => {
            if let Some(lhs) = node.child_by_field_name("left") {
                if lhs.kind() == "identifier" {
                    meta.defs.insert(text_of(lhs, code));
                } else {
                    // writes through a subscript or field read the base
                    scan(lhs, code, meta);
                }
            }
            if let Some(rhs) = node.child_by_field_name("right") {
                scan(rhs, code, meta);
            }
        }
        "update_expression" => {
            if let Some(arg) = node.child_by_field_name("argument") {
                if arg.kind() == "identifier" {
                    let name = text_of(arg, code);
                    meta.defs.insert(name.clone());
                    meta.uses.insert(name);
                } else {
                    scan(arg, code, meta);
                }
            }
        }
        "call_expression" => {
            let callee = node
                .child_by_field_name("function")
                .and_then(|f| call_target(f, code, meta));
            let mut args = Vec::new();
            if let Some(list) = node.child_by_field_name("arguments") {
                let mut cursor = list.walk();
                for a in list.named_children(&mut cursor) {
                    if a.kind() == "comment" {
                        continue;
                    }
                    args.push((a.kind() == "identifier").then(|| text_of(a, code)));
                    scan(a, code, meta);
                }
            }
            if let Some(callee) = callee {
                meta.calls.push(CallSite { callee, args });
            }
        }
        "identifier" => {
            meta.uses.insert(text_of(node, code));
        }
        _ => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                scan(child, code, meta);
            }
        }
    }
}

/// Callee name for a `call_expression`'s function part. A method-style
/// callee (`obj.fn`) contributes its base as a use and the field as the
/// name; anything else is scanned for uses only.
fn call_target(f: Node, code: &[u8], meta: &mut Metadata) -> Option<String> {
    match f.kind() {
        "identifier" => Some(text_of(f, code)),
        "field_expression" => {
            if let Some(base) = f.child_by_field_name("argument") {
                scan(base, code, meta);
            }
            f.child_by_field_name("field").map(|n| text_of(n, code))
        }
        "parenthesized_expression" | "pointer_expression" => {
            scan(f, code, meta);
            None
        }
        _ => {
            scan(f, code, meta);
            None
        }
    }
}
