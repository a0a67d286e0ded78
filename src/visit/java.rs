//! Java handlers. Mostly parallel to the C visitor; the differences are
//! switch grammar (label groups and arrow rules), enhanced-for, and method
//! invocation scanning.

use super::{CfgBuilder, Construct, Fragment};
use crate::ast::{real_children, span_of, text_of};
use crate::cfg::{CallSite, EdgeLabel, Metadata, NodeId, NodeKind};
use tree_sitter::Node;

pub(super) static KINDS: phf::Map<&'static str, Construct> = phf::phf_map! {
    "program" => Construct::Block,
    "block" => Construct::Block,
    "constructor_body" => Construct::Block,
    "if_statement" => Construct::If,
    "while_statement" => Construct::While,
    "do_statement" => Construct::DoWhile,
    "for_statement" => Construct::For,
    "enhanced_for_statement" => Construct::ForEach,
    "switch_expression" => Construct::Switch,
    "switch_statement" => Construct::Switch,
    "break_statement" => Construct::Break,
    "continue_statement" => Construct::Continue,
    "return_statement" => Construct::Return,
    "labeled_statement" => Construct::Label,
    "line_comment" => Construct::Trivia,
    "block_comment" => Construct::Trivia,
};

pub(super) fn visit(b: &mut CfgBuilder, node: Node) -> Fragment {
    match KINDS.get(node.kind()).copied().unwrap_or(Construct::Other) {
        Construct::Block => b.seq(node),
        Construct::If => {
            match (
                node.child_by_field_name("condition"),
                node.child_by_field_name("consequence"),
            ) {
                (Some(cond), Some(then_n)) => {
                    b.conditional(cond, then_n, node.child_by_field_name("alternative"))
                }
                (None, _) => b.malformed(node, "condition"),
                (_, None) => b.malformed(node, "body"),
            }
        }
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
                node.child_by_field_name("init"),
                node.child_by_field_name("condition"),
                node.child_by_field_name("update"),
                body,
            ),
            None => b.malformed(node, "body"),
        },
        Construct::ForEach => foreach(b, node),
        Construct::Switch => switch_stmt(b, node),
        Construct::Break => b.break_stmt(node),
        Construct::Continue => b.continue_stmt(node),
        Construct::Return => b.return_stmt(node),
        Construct::Label => {
            let children = real_children(node, b.lang);
            match children.first().copied().filter(|c| c.kind() == "identifier") {
                Some(name) => b.label_stmt(name, children.get(1).copied()),
                None => b.statement(node),
            }
        }
        Construct::Trivia => b.placeholder_fragment(),
        _ => b.statement(node),
    }
}

/// `for (T x : xs)`: the header's source is the iterable expression and
/// the loop variable counts as a definition on the header.
fn foreach(b: &mut CfgBuilder, node: Node) -> Fragment {
    let Some(value) = node.child_by_field_name("value") else {
        return b.malformed(node, "iterable");
    };
    let Some(body) = node.child_by_field_name("body") else {
        return b.malformed(node, "body");
    };
    let header = b.emit(NodeKind::LoopHeader, value, Some(value));
    if let Some(name) = node.child_by_field_name("name") {
        let var = text_of(name, b.code);
        if let Some(h) = b.graph.node_mut(header) {
            h.meta.defs.insert(var);
        }
    }
    let brk = b.placeholder();
    b.push_loop(header, brk);
    let body_frag = b.visit(body);
    b.pop_loop();
    b.graph
        .add_edge(header, body_frag.entry, Some(EdgeLabel::True));
    for &e in &body_frag.exits {
        b.graph.add_edge(e, header, None);
    }
    b.graph.add_edge(header, brk, Some(EdgeLabel::False));
    Fragment {
        entry: header,
        exits: vec![brk],
    }
}

/// Classic label groups fall through in textual order; arrow rules leave
/// the switch on their own.
fn switch_stmt(b: &mut CfgBuilder, node: Node) -> Fragment {
    let Some(selector) = node.child_by_field_name("condition") else {
        return b.malformed(node, "selector");
    };
    let Some(body) = node.child_by_field_name("body") else {
        return b.malformed(node, "body");
    };

    let head = b.emit(
        NodeKind::SwitchHead,
        super::unwrap_parens(selector),
        Some(selector),
    );
    let brk = b.placeholder();
    b.push_switch(brk, head);

    let mut open: Vec<NodeId> = Vec::new();
    for group in real_children(body, b.lang) {
        match group.kind() {
            "switch_block_statement_group" => {
                let frag = group_fragment(b, head, group);
                if let Some(f) = frag {
                    for &e in &open {
                        b.graph.add_edge(e, f.entry, None);
                    }
                    open = f.exits;
                }
            }
            "switch_rule" => {
                if let Some(f) = group_fragment(b, head, group) {
                    for &e in &f.exits {
                        b.graph.add_edge(e, brk, None);
                    }
                }
            }
            _ => {}
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

/// Chain a group's labels and statements into one fragment whose entry is
/// the first label node.
fn group_fragment(b: &mut CfgBuilder, head: NodeId, group: Node) -> Option<Fragment> {
    let mut frag: Option<Fragment> = None;
    for child in real_children(group, b.lang) {
        let f = if child.kind() == "switch_label" {
            case_fragment(b, head, child)
        } else {
            b.visit(child)
        };
        frag = Some(match frag {
            Some(a) => b.chain(a, f),
            None => f,
        });
    }
    frag
}

/// One CASE node per labeled value (`case 1, 2:` yields two), DEFAULT when
/// the label carries no value.
fn case_fragment(b: &mut CfgBuilder, head: NodeId, label: Node) -> Fragment {
    let values = real_children(label, b.lang);
    if values.is_empty() {
        let id = b
            .graph
            .new_node(NodeKind::Default, "default", Some(span_of(label)));
        b.graph.add_edge(head, id, Some(EdgeLabel::Default));
        return Fragment::new(id);
    }
    let mut frag: Option<Fragment> = None;
    for v in values {
        let id = b
            .graph
            .new_node(NodeKind::Case, text_of(v, b.code), Some(span_of(label)));
        b.graph
            .add_edge(head, id, Some(EdgeLabel::Case(text_of(v, b.code))));
        let f = Fragment::new(id);
        frag = Some(match frag {
            Some(a) => b.chain(a, f),
            None => f,
        });
    }
    frag.unwrap_or_else(|| b.placeholder_fragment())
}

// -------------------------------------------------------------------------
//  Routine signature
// -------------------------------------------------------------------------

pub(super) fn signature(node: Node, code: &[u8]) -> (Option<String>, Vec<String>) {
    let name = node
        .child_by_field_name("name")
        .map(|n| text_of(n, code));
    let mut params = Vec::new();
    if let Some(list) = node.child_by_field_name("parameters") {
        let mut cursor = list.walk();
        for p in list.named_children(&mut cursor) {
            if p.kind() == "formal_parameter"
                && let Some(n) = p.child_by_field_name("name")
            {
                params.push(text_of(n, code));
            }
        }
    }
    (name, params)
}

// -------------------------------------------------------------------------
//  Identifier scanner
// -------------------------------------------------------------------------

pub(super) fn scan(node: Node, code: &[u8], meta: &mut Metadata) {
    match node.kind() {
        "line_comment" | "block_comment" => {}
        "local_variable_declaration" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                if child.kind() == "variable_declarator" {
                    if let Some(n) = child.child_by_field_name("name") {
                        meta.defs.insert(text_of(n, code));
                    }
                    if let Some(v) = child.child_by_field_name("value") {
                        scan(v, code, meta);
                    }
                }
            }
        }
        "assignment_expression" => {
            if let Some(lhs) = node.child_by_field_name("left") {
                if lhs.kind() == "identifier" {
                    meta.defs.insert(text_of(lhs, code));
                } else {
                    scan(lhs, code, meta);
                }
            }
            if let Some(rhs) = node.child_by_field_name("right") {
                scan(rhs, code, meta);
            }
        }
        "update_expression" => {
            // x++ / ++x: both a definition and a use
            let operand = {
                let mut cursor = node.walk();
                node.named_children(&mut cursor).next()
            };
            if let Some(arg) = operand {
                if arg.kind() == "identifier" {
                    let name = text_of(arg, code);
                    meta.defs.insert(name.clone());
                    meta.uses.insert(name);
                } else {
                    scan(arg, code, meta);
                }
            }
        }
        "method_invocation" => {
            // `a.b().c()` records `c`: the name field is already the
            // rightmost identifier of the receiver chain
            let callee = node.child_by_field_name("name").map(|n| text_of(n, code));
            if let Some(obj) = node.child_by_field_name("object") {
                scan(obj, code, meta);
            }
            let mut args = Vec::new();
            if let Some(list) = node.child_by_field_name("arguments") {
                let mut cursor = list.walk();
                for a in list.named_children(&mut cursor) {
                    if matches!(a.kind(), "line_comment" | "block_comment") {
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
        "field_access" => {
            // only the base of `obj.field` is a use
            if let Some(obj) = node.child_by_field_name("object") {
                scan(obj, code, meta);
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

// -------------------------------------------------------------------------
//  Tests
// -------------------------------------------------------------------------

#[cfg(test)]
fn build_java(code: &str) -> crate::cfg::CfgSet {
    crate::build_cfgs(code.as_bytes(), "java").expect("analysis should succeed")
}

#[test]
fn method_cfg_is_built_inside_a_class() {
    let set = build_java("class T { int f(int a) { int b = a + 1; return b; } }");
    let f = set.routine_named("f").unwrap();
    assert_eq!(f.params, vec!["a"]);
    assert_eq!(f.len(), 4);
    let stmt = f.nodes_of_kind(NodeKind::Statement).next().unwrap();
    assert!(stmt.meta.defs.contains("b"));
    assert!(stmt.meta.uses.contains("a"));
}

#[test]
fn enhanced_for_defines_the_loop_variable_on_the_header() {
    let set = build_java(
        "class T { int sum(int[] xs) { int s = 0; for (int x : xs) { s = s + x; } return s; } }",
    );
    let m = set.routine_named("sum").unwrap();
    let header = m.nodes_of_kind(NodeKind::LoopHeader).next().unwrap();
    assert_eq!(header.text, "xs");
    assert!(header.meta.defs.contains("x"));
    assert!(header.meta.uses.contains("xs"));
    let labels: Vec<String> = header.labels.values().map(|l| l.to_string()).collect();
    assert!(labels.contains(&"true".to_string()) && labels.contains(&"false".to_string()));
}

#[test]
fn switch_groups_fall_through_in_textual_order() {
    let set = build_java(
        "class T { int f(int x) { int r = 0; switch (x) { case 1: r = 1; case 2: r = 2; break; default: r = 3; } return r; } }",
    );
    let f = set.routine_named("f").unwrap();
    let head = f.nodes_of_kind(NodeKind::SwitchHead).next().unwrap();
    assert_eq!(head.succs.len(), 3);

    // case 1 falls into case 2's body, not back to the head
    let r1 = f.nodes().find(|n| n.text == "r = 1;").unwrap();
    let r2 = f.nodes().find(|n| n.text == "r = 2;").unwrap();
    assert_eq!(r1.succs, vec![r2.id]);

    // the break jumps past the default group to the return
    let brk = f.nodes_of_kind(NodeKind::Break).next().unwrap();
    assert_eq!(brk.succs.len(), 1);
    assert!(f.node(brk.succs[0]).unwrap().text.starts_with("return"));
}

#[test]
fn chained_call_records_the_rightmost_name() {
    let set = build_java("class T { void f(A a) { a.b().c(); } }");
    let f = set.routine_named("f").unwrap();
    let stmt = f.nodes_of_kind(NodeKind::Statement).next().unwrap();
    let callees: Vec<&str> = stmt.meta.calls.iter().map(|c| c.callee.as_str()).collect();
    assert!(callees.contains(&"b") && callees.contains(&"c"));
    assert!(stmt.meta.uses.contains("a"));
}

#[test]
fn constructor_is_a_routine_named_after_the_class() {
    let set = build_java("class T { T() { int x = 0; } }");
    let t = set.routine_named("T").unwrap();
    assert_eq!(t.node(t.entry).unwrap().text, "T");
    assert!(t.nodes().any(|n| n.meta.defs.contains("x")));
}
