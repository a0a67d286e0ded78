//! Wire formats: the JSON schema consumed by graph frontends, plus a DOT
//! rendering for Graphviz.

use crate::cfg::{Cfg, CfgNode, CfgSet, EdgeLabel, Metadata, NodeId, NodeKind};
use crate::chains::ChainSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutineJson {
    pub function_name: Option<String>,
    pub entry_node_ids: Vec<NodeId>,
    pub exit_node_ids: Vec<NodeId>,
    pub nodes: BTreeMap<NodeId, NodeJson>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeJson {
    pub id: NodeId,
    pub node_type: NodeKind,
    pub source_text: String,
    pub start_index: Option<usize>,
    pub end_index: Option<usize>,
    pub successors: Vec<NodeId>,
    pub predecessors: Vec<NodeId>,
    pub edge_labels: BTreeMap<NodeId, String>,
    pub metadata: MetadataJson,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataJson {
    pub function_calls: Vec<String>,
    pub variable_definitions: Vec<String>,
    pub variable_uses: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJson {
    pub routines: Vec<RoutineJson>,
    pub warnings: Vec<String>,
}

/// Combined CLI report: the CFG payload with chains flattened in when the
/// chain pass ran.
#[derive(Debug, Clone, Serialize)]
pub struct ReportJson {
    #[serde(flatten)]
    pub cfg: AnalysisJson,
    #[serde(flatten)]
    pub chains: Option<ChainSet>,
}

impl From<&CfgNode> for NodeJson {
    fn from(node: &CfgNode) -> Self {
        NodeJson {
            id: node.id,
            node_type: node.kind,
            source_text: node.text.clone(),
            start_index: node.span.map(|(s, _)| s),
            end_index: node.span.map(|(_, e)| e),
            successors: node.succs.clone(),
            predecessors: node.preds.clone(),
            edge_labels: node
                .labels
                .iter()
                .map(|(k, v)| (*k, v.to_string()))
                .collect(),
            metadata: MetadataJson {
                function_calls: node.meta.calls.iter().map(|c| c.callee.clone()).collect(),
                variable_definitions: node.meta.defs.iter().cloned().collect(),
                variable_uses: node.meta.uses.iter().cloned().collect(),
            },
        }
    }
}

impl From<&Cfg> for RoutineJson {
    fn from(cfg: &Cfg) -> Self {
        RoutineJson {
            function_name: cfg.name.clone(),
            entry_node_ids: vec![cfg.entry],
            exit_node_ids: vec![cfg.exit],
            nodes: cfg.nodes().map(|n| (n.id, NodeJson::from(n))).collect(),
        }
    }
}

impl From<&CfgSet> for AnalysisJson {
    fn from(set: &CfgSet) -> Self {
        AnalysisJson {
            routines: set.routines.iter().map(RoutineJson::from).collect(),
            warnings: set.warnings.clone(),
        }
    }
}

/// Rebuild a routine graph from its wire form. Call-site argument lists do
/// not cross the boundary, so a re-imported graph carries the same nodes
/// and edges but no aliasing inputs.
pub fn routine_from_json(json: &RoutineJson) -> Cfg {
    let entry = json.entry_node_ids.first().copied().unwrap_or_default();
    let exit = json.exit_node_ids.first().copied().unwrap_or_default();
    let nodes: BTreeMap<NodeId, CfgNode> = json
        .nodes
        .values()
        .map(|n| {
            (
                n.id,
                CfgNode {
                    id: n.id,
                    kind: n.node_type,
                    text: n.source_text.clone(),
                    span: match (n.start_index, n.end_index) {
                        (Some(s), Some(e)) => Some((s, e)),
                        _ => None,
                    },
                    succs: n.successors.clone(),
                    preds: n.predecessors.clone(),
                    labels: n
                        .edge_labels
                        .iter()
                        .map(|(k, v)| (*k, EdgeLabel::from_text(v)))
                        .collect(),
                    meta: Metadata {
                        defs: n.metadata.variable_definitions.iter().cloned().collect(),
                        uses: n.metadata.variable_uses.iter().cloned().collect(),
                        calls: Vec::new(),
                    },
                },
            )
        })
        .collect();
    Cfg::from_parts(json.function_name.clone(), Vec::new(), entry, exit, nodes)
}

/// Render one routine as a Graphviz digraph.
pub fn export_dot(cfg: &Cfg) -> String {
    let mut dot = String::from("digraph CFG {\n");
    dot.push_str("  rankdir=TB;\n");
    dot.push_str("  node [shape=box, style=rounded];\n\n");

    for node in cfg.nodes() {
        let shape = match node.kind {
            NodeKind::Entry => "shape=oval, fillcolor=lightgreen, style=filled",
            NodeKind::Exit => "shape=oval, fillcolor=lightcoral, style=filled",
            NodeKind::Condition | NodeKind::LoopHeader | NodeKind::SwitchHead => "shape=diamond",
            _ => "",
        };
        let label = format!("{}\\n{:?}", escape_dot(&node.text), node.kind);
        writeln!(dot, "  \"{}\" [label=\"{}\" {}];", node.id, label, shape).ok();
    }

    dot.push('\n');
    for node in cfg.nodes() {
        for &s in &node.succs {
            let label = node
                .labels
                .get(&s)
                .map(|l| format!(" [label=\"{l}\"]"))
                .unwrap_or_default();
            writeln!(dot, "  \"{}\" -> \"{}\"{};", node.id, s, label).ok();
        }
    }
    dot.push_str("}\n");
    dot
}

fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

// -------------------------------------------------------------------------
//  Tests
// -------------------------------------------------------------------------

#[test]
fn node_type_strings_match_the_wire_vocabulary() {
    assert_eq!(
        serde_json::to_string(&NodeKind::LoopHeader).unwrap(),
        "\"LOOP_HEADER\""
    );
    assert_eq!(
        serde_json::to_string(&NodeKind::SwitchHead).unwrap(),
        "\"SWITCH_HEAD\""
    );
    assert_eq!(serde_json::to_string(&NodeKind::Entry).unwrap(), "\"ENTRY\"");
}

#[test]
fn json_round_trip_preserves_the_graph() {
    let set = crate::build_cfgs(
        b"int w(int n){int s=0; while(n>0){s=s+n; n=n-1;} return s;}",
        "c",
    )
    .unwrap();
    let original = &set.routines[0];

    let wire = serde_json::to_string(&RoutineJson::from(original)).unwrap();
    let parsed: RoutineJson = serde_json::from_str(&wire).unwrap();
    let rebuilt = routine_from_json(&parsed);

    assert_eq!(rebuilt.name, original.name);
    assert_eq!(rebuilt.entry, original.entry);
    assert_eq!(rebuilt.exit, original.exit);
    assert_eq!(rebuilt.len(), original.len());
    for node in original.nodes() {
        let r = rebuilt.node(node.id).unwrap();
        assert_eq!(r.kind, node.kind);
        assert_eq!(r.text, node.text);
        assert_eq!(r.succs, node.succs);
        assert_eq!(r.preds, node.preds);
        assert_eq!(r.labels, node.labels);
        assert_eq!(r.meta.defs, node.meta.defs);
        assert_eq!(r.meta.uses, node.meta.uses);
    }
}

#[test]
fn wire_schema_uses_the_agreed_field_names() {
    let set = crate::build_cfgs(b"int f(){return 0;}", "c").unwrap();
    let value = serde_json::to_value(AnalysisJson::from(&set)).unwrap();
    let routine = &value["routines"][0];
    assert!(routine.get("function_name").is_some());
    assert!(routine.get("entry_node_ids").is_some());
    let entry_id = routine["entry_node_ids"][0].as_u64().unwrap();
    let entry = &routine["nodes"][entry_id.to_string()];
    assert_eq!(entry["node_type"], "ENTRY");
    assert_eq!(entry["source_text"], "f");
    assert!(entry["start_index"].is_null());
    assert!(entry["metadata"].get("variable_uses").is_some());
}

#[test]
fn dot_export_is_structurally_valid() {
    let set = crate::build_cfgs(b"int f(int c){if(c){return 1;} return 0;}", "c").unwrap();
    let dot = export_dot(&set.routines[0]);
    assert!(dot.starts_with("digraph CFG {"));
    assert!(dot.ends_with("}\n"));
    assert!(dot.contains("label=\"true\""));
    assert!(dot.contains("label=\"false\""));
}
