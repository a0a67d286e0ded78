use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Node ids are allocated from one counter per translation unit, so an id
/// is unique across every routine of the same analysis and call edges can
/// point into sibling routines.
pub type NodeId = u32;

/// -------------------------------------------------------------------------
///  Node and edge vocabulary
/// -------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    Entry,
    Exit,
    Statement,
    Condition,
    LoopHeader,
    Break,
    Continue,
    Return,
    SwitchHead,
    Case,
    Default,
    Label,
    Goto,
    Placeholder,
}

impl NodeKind {
    /// Kinds that exist only to splice flow together during construction;
    /// none survive post-processing.
    pub(crate) fn is_passthrough(self) -> bool {
        matches!(self, NodeKind::Case | NodeKind::Default | NodeKind::Placeholder)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeLabel {
    True,
    False,
    Case(String),
    Default,
    FunctionCall,
    FunctionReturn,
}

impl EdgeLabel {
    pub(crate) fn is_call(&self) -> bool {
        matches!(self, EdgeLabel::FunctionCall | EdgeLabel::FunctionReturn)
    }

    pub fn from_text(s: &str) -> EdgeLabel {
        match s {
            "true" => EdgeLabel::True,
            "false" => EdgeLabel::False,
            "default" => EdgeLabel::Default,
            "function_call" => EdgeLabel::FunctionCall,
            "function_return" => EdgeLabel::FunctionReturn,
            other => EdgeLabel::Case(other.to_owned()),
        }
    }
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeLabel::True => f.write_str("true"),
            EdgeLabel::False => f.write_str("false"),
            EdgeLabel::Case(v) => f.write_str(v),
            EdgeLabel::Default => f.write_str("default"),
            EdgeLabel::FunctionCall => f.write_str("function_call"),
            EdgeLabel::FunctionReturn => f.write_str("function_return"),
        }
    }
}

/// One call site: the callee name plus the top-level identifier of each
/// textual argument (`None` when an argument is not a plain identifier).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallSite {
    pub callee: String,
    pub args: Vec<Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub defs: BTreeSet<String>,
    pub uses: BTreeSet<String>,
    pub calls: Vec<CallSite>,
}

#[derive(Debug, Clone)]
pub struct CfgNode {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Verbatim source slice; the routine name for ENTRY/EXIT.
    pub text: String,
    /// Byte offsets into the original source, absent on synthetic nodes.
    pub span: Option<(usize, usize)>,
    /// Outgoing edges in insertion order, no duplicates.
    pub succs: Vec<NodeId>,
    pub preds: Vec<NodeId>,
    /// Labels keyed by successor id; unlabeled edges have no entry.
    pub labels: BTreeMap<NodeId, EdgeLabel>,
    pub meta: Metadata,
}

/// -------------------------------------------------------------------------
///  Per-routine graph
/// -------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Cfg {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub entry: NodeId,
    pub exit: NodeId,
    nodes: BTreeMap<NodeId, CfgNode>,
    next_id: NodeId,
}

impl Cfg {
    /// Create a routine graph with its ENTRY and EXIT in place. Parameters
    /// are recorded as definitions on the ENTRY node.
    pub(crate) fn new(name: Option<String>, params: Vec<String>, first_id: NodeId) -> Self {
        let mut cfg = Cfg {
            name,
            params,
            entry: 0,
            exit: 0,
            nodes: BTreeMap::new(),
            next_id: first_id,
        };
        let display = cfg.name.clone().unwrap_or_default();
        cfg.entry = cfg.new_node(NodeKind::Entry, display.clone(), None);
        cfg.exit = cfg.new_node(NodeKind::Exit, display, None);
        let params = cfg.params.clone();
        if let Some(entry) = cfg.nodes.get_mut(&cfg.entry) {
            entry.meta.defs.extend(params);
        }
        cfg
    }

    /// Rebuild a graph from already-materialized nodes (JSON import).
    pub(crate) fn from_parts(
        name: Option<String>,
        params: Vec<String>,
        entry: NodeId,
        exit: NodeId,
        nodes: BTreeMap<NodeId, CfgNode>,
    ) -> Self {
        let next_id = nodes.keys().next_back().map_or(0, |id| id + 1);
        Cfg {
            name,
            params,
            entry,
            exit,
            nodes,
            next_id,
        }
    }

    pub(crate) fn next_id(&self) -> NodeId {
        self.next_id
    }

    pub fn new_node(
        &mut self,
        kind: NodeKind,
        text: impl Into<String>,
        span: Option<(usize, usize)>,
    ) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(
            id,
            CfgNode {
                id,
                kind,
                text: text.into(),
                span,
                succs: Vec::new(),
                preds: Vec::new(),
                labels: BTreeMap::new(),
                meta: Metadata::default(),
            },
        );
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&CfgNode> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut CfgNode> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &CfgNode> {
        self.nodes.values()
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &CfgNode> {
        self.nodes.values().filter(move |n| n.kind == kind)
    }

    /// Add `from -> to`. Ordered and deduplicated; an existing edge keeps
    /// its first label.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, label: Option<EdgeLabel>) {
        if !self.nodes.contains_key(&from) || !self.nodes.contains_key(&to) {
            return;
        }
        self.push_succ(from, to, label);
        self.push_pred(to, from);
    }

    /// Caller half of an edge; the other endpoint may live in a sibling
    /// routine (call/return wiring).
    pub(crate) fn push_succ(&mut self, from: NodeId, to: NodeId, label: Option<EdgeLabel>) {
        if let Some(f) = self.nodes.get_mut(&from) {
            if !f.succs.contains(&to) {
                f.succs.push(to);
            }
            if let Some(l) = label {
                f.labels.entry(to).or_insert(l);
            }
        }
    }

    pub(crate) fn push_pred(&mut self, to: NodeId, from: NodeId) {
        if let Some(t) = self.nodes.get_mut(&to)
            && !t.preds.contains(&from)
        {
            t.preds.push(from);
        }
    }

    /// Re-point `from -> old_to` at `new_to`, keeping position and label.
    pub fn replace_target(&mut self, from: NodeId, old_to: NodeId, new_to: NodeId) {
        let Some(f) = self.nodes.get_mut(&from) else {
            return;
        };
        let Some(pos) = f.succs.iter().position(|&s| s == old_to) else {
            return;
        };
        if f.succs.contains(&new_to) {
            f.succs.remove(pos);
        } else {
            f.succs[pos] = new_to;
        }
        if let Some(label) = f.labels.remove(&old_to) {
            f.labels.entry(new_to).or_insert(label);
        }
        if let Some(t) = self.nodes.get_mut(&old_to) {
            t.preds.retain(|&p| p != from);
        }
        self.push_pred(new_to, from);
    }

    /// Detach and delete `id` with bidirectional cleanup. Used by the
    /// reachability sweep.
    pub(crate) fn remove_node(&mut self, id: NodeId) {
        let Some(node) = self.nodes.remove(&id) else {
            return;
        };
        for p in node.preds {
            if let Some(pn) = self.nodes.get_mut(&p) {
                pn.succs.retain(|&s| s != id);
                pn.labels.remove(&id);
            }
        }
        for s in node.succs {
            if let Some(sn) = self.nodes.get_mut(&s) {
                sn.preds.retain(|&p| p != id);
            }
        }
    }

    /// Remove a passthrough node, rethreading every predecessor to every
    /// successor. The predecessor's edge label wins over the removed
    /// node's own.
    pub(crate) fn splice_out(&mut self, id: NodeId) {
        let Some(node) = self.nodes.remove(&id) else {
            return;
        };
        let mut in_labels: BTreeMap<NodeId, EdgeLabel> = BTreeMap::new();
        for &p in &node.preds {
            if let Some(pn) = self.nodes.get_mut(&p) {
                pn.succs.retain(|&s| s != id);
                if let Some(l) = pn.labels.remove(&id) {
                    in_labels.insert(p, l);
                }
            }
        }
        for &s in &node.succs {
            if let Some(sn) = self.nodes.get_mut(&s) {
                sn.preds.retain(|&q| q != id);
            }
        }
        for &p in &node.preds {
            if p == id {
                continue;
            }
            for &s in &node.succs {
                if s == id {
                    continue;
                }
                let label = in_labels
                    .get(&p)
                    .cloned()
                    .or_else(|| node.labels.get(&s).cloned());
                self.add_edge(p, s, label);
            }
        }
    }
}

/// Every routine of one translation unit, plus the structural warnings
/// accumulated while building them.
#[derive(Debug, Clone, Default)]
pub struct CfgSet {
    pub routines: Vec<Cfg>,
    pub warnings: Vec<String>,
}

impl CfgSet {
    pub fn routine_named(&self, name: &str) -> Option<&Cfg> {
        self.routines
            .iter()
            .find(|r| r.name.as_deref() == Some(name))
    }

    /// The routine owning `id`, if any.
    pub fn routine_of(&self, id: NodeId) -> Option<&Cfg> {
        self.routines.iter().find(|r| r.contains(id))
    }
}

// -------------------------------------------------------------------------
//  Tests
// -------------------------------------------------------------------------

#[test]
fn add_edge_is_bidirectional_and_deduplicated() {
    let mut g = Cfg::new(Some("t".into()), vec![], 0);
    let a = g.new_node(NodeKind::Statement, "a", None);
    let b = g.new_node(NodeKind::Statement, "b", None);
    g.add_edge(a, b, None);
    g.add_edge(a, b, Some(EdgeLabel::True));
    assert_eq!(g.node(a).unwrap().succs, vec![b]);
    assert_eq!(g.node(b).unwrap().preds, vec![a]);
    // first insertion had no label, the retry may fill it in but not twice
    assert_eq!(g.node(a).unwrap().labels.get(&b), Some(&EdgeLabel::True));
}

#[test]
fn replace_target_keeps_position_and_label() {
    let mut g = Cfg::new(Some("t".into()), vec![], 0);
    let c = g.new_node(NodeKind::Condition, "c", None);
    let a = g.new_node(NodeKind::Statement, "a", None);
    let b = g.new_node(NodeKind::Statement, "b", None);
    let j = g.new_node(NodeKind::Statement, "j", None);
    g.add_edge(c, a, Some(EdgeLabel::True));
    g.add_edge(c, b, Some(EdgeLabel::False));
    g.replace_target(c, a, j);
    assert_eq!(g.node(c).unwrap().succs, vec![j, b]);
    assert_eq!(g.node(c).unwrap().labels.get(&j), Some(&EdgeLabel::True));
    assert!(g.node(a).unwrap().preds.is_empty());
    assert_eq!(g.node(j).unwrap().preds, vec![c]);
}

#[test]
fn splice_out_rethreads_with_predecessor_label() {
    // head -"1"-> case -> body: removing the case keeps the "1" label
    let mut g = Cfg::new(Some("t".into()), vec![], 0);
    let head = g.new_node(NodeKind::SwitchHead, "x", None);
    let case = g.new_node(NodeKind::Case, "1", None);
    let body = g.new_node(NodeKind::Statement, "b", None);
    g.add_edge(head, case, Some(EdgeLabel::Case("1".into())));
    g.add_edge(case, body, None);
    g.splice_out(case);
    assert!(!g.contains(case));
    assert_eq!(g.node(head).unwrap().succs, vec![body]);
    assert_eq!(
        g.node(head).unwrap().labels.get(&body),
        Some(&EdgeLabel::Case("1".into()))
    );
    assert_eq!(g.node(body).unwrap().preds, vec![head]);
}

#[test]
fn splice_out_builds_the_cartesian_product() {
    let mut g = Cfg::new(Some("t".into()), vec![], 0);
    let p1 = g.new_node(NodeKind::Statement, "p1", None);
    let p2 = g.new_node(NodeKind::Statement, "p2", None);
    let mid = g.new_node(NodeKind::Placeholder, "", None);
    let s1 = g.new_node(NodeKind::Statement, "s1", None);
    let s2 = g.new_node(NodeKind::Statement, "s2", None);
    g.add_edge(p1, mid, None);
    g.add_edge(p2, mid, None);
    g.add_edge(mid, s1, None);
    g.add_edge(mid, s2, None);
    g.splice_out(mid);
    for p in [p1, p2] {
        assert_eq!(g.node(p).unwrap().succs, vec![s1, s2]);
    }
    for s in [s1, s2] {
        assert_eq!(g.node(s).unwrap().preds, vec![p1, p2]);
    }
}

#[test]
fn entry_node_carries_parameter_defs() {
    let g = Cfg::new(Some("f".into()), vec!["a".into(), "b".into()], 10);
    let entry = g.node(g.entry).unwrap();
    assert_eq!(entry.kind, NodeKind::Entry);
    assert_eq!(entry.text, "f");
    assert!(entry.meta.defs.contains("a") && entry.meta.defs.contains("b"));
    assert_eq!(g.entry, 10);
    assert_eq!(g.exit, 11);
}
