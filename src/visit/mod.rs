mod c;
mod java;

use crate::ast::{self, Lang, span_of, text_of};
use crate::cfg::{Cfg, EdgeLabel, Metadata, NodeId, NodeKind};
use std::collections::HashMap;
use tracing::debug;

/// Structural category of an AST kind. Each language visitor owns a static
/// map from its grammar's kind strings to these; anything unmapped falls to
/// the default STATEMENT handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Construct {
    Block,
    If,
    While,
    DoWhile,
    For,
    ForEach,
    Switch,
    Break,
    Continue,
    Return,
    Goto,
    Label,
    Trivia,
    Other,
}

/// A partial CFG: one entry node and the set of still-open exit points.
/// Fragments after an unconditional jump have no open exits.
#[derive(Debug, Clone)]
pub(crate) struct Fragment {
    pub entry: NodeId,
    pub exits: Vec<NodeId>,
}

impl Fragment {
    fn new(entry: NodeId) -> Self {
        Fragment {
            entry,
            exits: vec![entry],
        }
    }

    fn terminal(entry: NodeId) -> Self {
        Fragment {
            entry,
            exits: Vec::new(),
        }
    }
}

struct LoopFrame {
    continue_to: NodeId,
    break_to: NodeId,
    stamp: u32,
}

struct SwitchFrame {
    break_to: NodeId,
    #[allow(dead_code)]
    head: NodeId,
    stamp: u32,
}

/// A call recorded during visitation, resolved against sibling routines
/// once the whole translation unit has been built.
#[derive(Debug, Clone)]
pub(crate) struct CallLink {
    pub node: NodeId,
    pub callee: String,
}

pub(crate) struct CfgBuilder<'a> {
    pub lang: Lang,
    pub code: &'a [u8],
    pub graph: Cfg,
    loop_stack: Vec<LoopFrame>,
    switch_stack: Vec<SwitchFrame>,
    label_table: HashMap<String, NodeId>,
    pending_gotos: Vec<(NodeId, String)>,
    pub calls: Vec<CallLink>,
    pub warnings: Vec<String>,
    stamp: u32,
}

/// Build one routine's CFG. Ids continue from `first_id` so the counter can
/// be threaded through every routine of the translation unit.
pub(crate) fn build_routine(
    node: tree_sitter::Node,
    lang: Lang,
    code: &[u8],
    first_id: NodeId,
    warnings: &mut Vec<String>,
) -> (Cfg, Vec<CallLink>) {
    let (name, params) = match lang {
        Lang::C => c::signature(node, code),
        Lang::Java => java::signature(node, code),
    };
    debug!(target: "cfg", "building routine {:?}", name);

    let mut b = CfgBuilder {
        lang,
        code,
        graph: Cfg::new(name, params, first_id),
        loop_stack: Vec::new(),
        switch_stack: Vec::new(),
        label_table: HashMap::new(),
        pending_gotos: Vec::new(),
        calls: Vec::new(),
        warnings: Vec::new(),
        stamp: 0,
    };

    let frag = match node.child_by_field_name("body") {
        Some(body) => b.visit(body),
        // declarations without a body (abstract methods) collapse to
        // ENTRY -> EXIT once the placeholder is compacted
        None => b.placeholder_fragment(),
    };
    let (entry, exit) = (b.graph.entry, b.graph.exit);
    b.graph.add_edge(entry, frag.entry, None);
    for &e in &frag.exits {
        b.graph.add_edge(e, exit, None);
    }
    b.finalize_gotos();

    debug_assert!(b.loop_stack.is_empty() && b.switch_stack.is_empty());
    debug!(
        target: "cfg",
        "routine done: nodes={}, warnings={}",
        b.graph.len(),
        b.warnings.len()
    );

    warnings.append(&mut b.warnings);
    (b.graph, b.calls)
}

impl<'a> CfgBuilder<'a> {
    pub(crate) fn visit(&mut self, node: tree_sitter::Node) -> Fragment {
        match self.lang {
            Lang::C => c::visit(self, node),
            Lang::Java => java::visit(self, node),
        }
    }

    /// Connect every open exit of `a` to the entry of `b`. When `a` has no
    /// open exits, `b` stays disconnected (code after a jump) and the sweep
    /// deletes it later.
    pub(crate) fn chain(&mut self, a: Fragment, b: Fragment) -> Fragment {
        for &e in &a.exits {
            self.graph.add_edge(e, b.entry, None);
        }
        Fragment {
            entry: a.entry,
            exits: b.exits,
        }
    }

    /// Sequential composition of a block's children.
    pub(crate) fn seq(&mut self, node: tree_sitter::Node) -> Fragment {
        let mut acc: Option<Fragment> = None;
        for child in ast::real_children(node, self.lang) {
            let frag = self.visit(child);
            acc = Some(match acc {
                Some(a) => self.chain(a, frag),
                None => frag,
            });
        }
        acc.unwrap_or_else(|| self.placeholder_fragment())
    }

    /// Default handler: one STATEMENT spanning the AST node, with metadata
    /// from the language's identifier scanner.
    pub(crate) fn statement(&mut self, node: tree_sitter::Node) -> Fragment {
        let id = self.emit(NodeKind::Statement, node, Some(node));
        Fragment::new(id)
    }

    /// Create a node for `ast` and scan `scan_root` for defs/uses/calls.
    pub(crate) fn emit(
        &mut self,
        kind: NodeKind,
        ast: tree_sitter::Node,
        scan_root: Option<tree_sitter::Node>,
    ) -> NodeId {
        let id = self
            .graph
            .new_node(kind, text_of(ast, self.code), Some(span_of(ast)));
        if let Some(root) = scan_root {
            let mut meta = Metadata::default();
            match self.lang {
                Lang::C => c::scan(root, self.code, &mut meta),
                Lang::Java => java::scan(root, self.code, &mut meta),
            }
            for call in &meta.calls {
                self.calls.push(CallLink {
                    node: id,
                    callee: call.callee.clone(),
                });
            }
            if let Some(n) = self.graph.node_mut(id) {
                n.meta = meta;
            }
        }
        debug!(target: "cfg", "node {} <- {:?} `{}`", id, kind, self.graph.node(id).map(|n| n.text.as_str()).unwrap_or(""));
        id
    }

    pub(crate) fn placeholder(&mut self) -> NodeId {
        self.graph.new_node(NodeKind::Placeholder, "", None)
    }

    pub(crate) fn placeholder_fragment(&mut self) -> Fragment {
        Fragment::new(self.placeholder())
    }

    /// Malformed subtree: placeholder plus a warning; traversal continues.
    pub(crate) fn malformed(&mut self, node: tree_sitter::Node, what: &str) -> Fragment {
        self.warn(format!(
            "{} node at byte {} is missing its {}",
            node.kind(),
            node.start_byte(),
            what
        ));
        self.placeholder_fragment()
    }

    pub(crate) fn warn(&mut self, msg: String) {
        tracing::warn!(target: "cfg", "{msg}");
        self.warnings.push(msg);
    }

    // ---- scoping frames ---------------------------------------------------

    fn next_stamp(&mut self) -> u32 {
        self.stamp += 1;
        self.stamp
    }

    pub(crate) fn push_loop(&mut self, continue_to: NodeId, break_to: NodeId) {
        let stamp = self.next_stamp();
        self.loop_stack.push(LoopFrame {
            continue_to,
            break_to,
            stamp,
        });
    }

    pub(crate) fn pop_loop(&mut self) {
        self.loop_stack.pop();
    }

    pub(crate) fn push_switch(&mut self, break_to: NodeId, head: NodeId) {
        let stamp = self.next_stamp();
        self.switch_stack.push(SwitchFrame {
            break_to,
            head,
            stamp,
        });
    }

    pub(crate) fn pop_switch(&mut self) {
        self.switch_stack.pop();
    }

    /// Innermost break target across loop and switch frames.
    fn break_target(&self) -> Option<NodeId> {
        match (self.loop_stack.last(), self.switch_stack.last()) {
            (Some(l), Some(s)) => Some(if l.stamp > s.stamp {
                l.break_to
            } else {
                s.break_to
            }),
            (Some(l), None) => Some(l.break_to),
            (None, Some(s)) => Some(s.break_to),
            (None, None) => None,
        }
    }

    fn continue_target(&self) -> Option<NodeId> {
        self.loop_stack.last().map(|f| f.continue_to)
    }

    // ---- shared structured handlers --------------------------------------

    /// if / if-else. Without an else branch the false edge runs to a join
    /// placeholder that compaction folds into whatever follows.
    pub(crate) fn conditional(
        &mut self,
        cond: tree_sitter::Node,
        then_n: tree_sitter::Node,
        else_n: Option<tree_sitter::Node>,
    ) -> Fragment {
        let cond_id = self.emit(NodeKind::Condition, unwrap_parens(cond), Some(cond));
        let then_frag = self.visit(then_n);
        self.graph
            .add_edge(cond_id, then_frag.entry, Some(EdgeLabel::True));
        match else_n {
            Some(e) => {
                let else_frag = self.visit(e);
                self.graph
                    .add_edge(cond_id, else_frag.entry, Some(EdgeLabel::False));
                let mut exits = then_frag.exits;
                exits.extend(else_frag.exits);
                Fragment {
                    entry: cond_id,
                    exits,
                }
            }
            None => {
                let join = self.placeholder();
                self.graph.add_edge(cond_id, join, Some(EdgeLabel::False));
                let mut exits = then_frag.exits;
                exits.push(join);
                Fragment {
                    entry: cond_id,
                    exits,
                }
            }
        }
    }

    pub(crate) fn while_loop(&mut self, cond: tree_sitter::Node, body: tree_sitter::Node) -> Fragment {
        let header = self.emit(NodeKind::LoopHeader, unwrap_parens(cond), Some(cond));
        let brk = self.placeholder();
        self.push_loop(header, brk);
        let body_frag = self.visit(body);
        self.pop_loop();
        self.graph
            .add_edge(header, body_frag.entry, Some(EdgeLabel::True));
        for &e in &body_frag.exits {
            self.graph.add_edge(e, header, None);
        }
        self.graph.add_edge(header, brk, Some(EdgeLabel::False));
        Fragment {
            entry: header,
            exits: vec![brk],
        }
    }

    pub(crate) fn do_while(&mut self, body: tree_sitter::Node, cond: tree_sitter::Node) -> Fragment {
        // continue lands on a placeholder until the header exists
        let latch = self.placeholder();
        let brk = self.placeholder();
        self.push_loop(latch, brk);
        let body_frag = self.visit(body);
        self.pop_loop();
        let header = self.emit(NodeKind::LoopHeader, unwrap_parens(cond), Some(cond));
        for &e in &body_frag.exits {
            self.graph.add_edge(e, header, None);
        }
        self.graph.add_edge(latch, header, None);
        self.graph
            .add_edge(header, body_frag.entry, Some(EdgeLabel::True));
        self.graph.add_edge(header, brk, Some(EdgeLabel::False));
        Fragment {
            entry: body_frag.entry,
            exits: vec![brk],
        }
    }

    /// init / condition / update are each optional (`for (;;)`). Continue
    /// targets the update through a latch placeholder emitted before the
    /// body so the frame can exist during body visitation.
    pub(crate) fn for_loop(
        &mut self,
        init: Option<tree_sitter::Node>,
        cond: Option<tree_sitter::Node>,
        update: Option<tree_sitter::Node>,
        body: tree_sitter::Node,
    ) -> Fragment {
        let init_frag = init.map(|n| self.statement(n));
        let header = match cond {
            Some(cnd) => self.emit(NodeKind::LoopHeader, unwrap_parens(cnd), Some(cnd)),
            None => self.graph.new_node(NodeKind::LoopHeader, "", None),
        };
        let brk = self.placeholder();
        let latch = self.placeholder();
        self.push_loop(latch, brk);
        let body_frag = self.visit(body);
        self.pop_loop();
        let update_frag = update.map(|n| self.statement(n));

        self.graph
            .add_edge(header, body_frag.entry, Some(EdgeLabel::True));
        for &e in &body_frag.exits {
            self.graph.add_edge(e, latch, None);
        }
        match &update_frag {
            Some(u) => {
                self.graph.add_edge(latch, u.entry, None);
                for &e in &u.exits {
                    self.graph.add_edge(e, header, None);
                }
            }
            None => self.graph.add_edge(latch, header, None),
        }
        self.graph.add_edge(header, brk, Some(EdgeLabel::False));

        let entry = match init_frag {
            Some(i) => {
                for &e in &i.exits {
                    self.graph.add_edge(e, header, None);
                }
                i.entry
            }
            None => header,
        };
        Fragment {
            entry,
            exits: vec![brk],
        }
    }

    pub(crate) fn break_stmt(&mut self, node: tree_sitter::Node) -> Fragment {
        let id = self.emit(NodeKind::Break, node, None);
        match self.break_target() {
            Some(t) => self.graph.add_edge(id, t, None),
            None => self.warn(format!(
                "`break` outside loop or switch at byte {}",
                node.start_byte()
            )),
        }
        Fragment::terminal(id)
    }

    pub(crate) fn continue_stmt(&mut self, node: tree_sitter::Node) -> Fragment {
        let id = self.emit(NodeKind::Continue, node, None);
        match self.continue_target() {
            Some(t) => self.graph.add_edge(id, t, None),
            None => self.warn(format!(
                "`continue` outside loop at byte {}",
                node.start_byte()
            )),
        }
        Fragment::terminal(id)
    }

    pub(crate) fn return_stmt(&mut self, node: tree_sitter::Node) -> Fragment {
        let id = self.emit(NodeKind::Return, node, Some(node));
        let exit = self.graph.exit;
        self.graph.add_edge(id, exit, None);
        Fragment::terminal(id)
    }

    pub(crate) fn goto_stmt(
        &mut self,
        node: tree_sitter::Node,
        label: Option<tree_sitter::Node>,
    ) -> Fragment {
        let id = self.emit(NodeKind::Goto, node, None);
        match label {
            Some(l) => {
                let name = text_of(l, self.code);
                self.pending_gotos.push((id, name));
            }
            None => self.warn(format!("goto without a label at byte {}", node.start_byte())),
        }
        Fragment::terminal(id)
    }

    /// LABEL node registering `name`; forward references resolve at
    /// routine finalization.
    pub(crate) fn label_stmt(
        &mut self,
        name: tree_sitter::Node,
        inner: Option<tree_sitter::Node>,
    ) -> Fragment {
        let id = self.emit(NodeKind::Label, name, None);
        let text = text_of(name, self.code);
        if self.label_table.insert(text.clone(), id).is_some() {
            self.warn(format!("duplicate label `{text}`"));
        }
        match inner {
            Some(stmt) => {
                let frag = self.visit(stmt);
                self.graph.add_edge(id, frag.entry, None);
                Fragment {
                    entry: id,
                    exits: frag.exits,
                }
            }
            None => Fragment::new(id),
        }
    }

    fn finalize_gotos(&mut self) {
        let pending = std::mem::take(&mut self.pending_gotos);
        for (goto_id, name) in pending {
            match self.label_table.get(&name) {
                Some(&label_id) => self.graph.add_edge(goto_id, label_id, None),
                None => self.warn(format!("unresolved goto label `{name}`")),
            }
        }
    }
}

/// Conditions arrive wrapped in a parenthesized expression; the node text
/// should read `n > 0`, not `(n > 0)`.
pub(crate) fn unwrap_parens(n: tree_sitter::Node) -> tree_sitter::Node {
    if n.kind() == "parenthesized_expression" {
        n.named_child(0).unwrap_or(n)
    } else {
        n
    }
}
