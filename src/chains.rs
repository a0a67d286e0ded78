//! Reaching definitions and the def-use / use-def chains layered on top,
//! including argument-to-parameter aliasing across call sites inside the
//! same translation unit.

use crate::cfg::{CallSite, Cfg, CfgNode, NodeId};
use crate::dataflow::{self, FlowAnalysis, FlowSolution};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

/// A fact is one live definition: (variable, defining node).
pub type Def = (String, NodeId);

/// Forward may-analysis: a definition reaches a point if some path from it
/// arrives there without an intervening redefinition. ENTRY's parameter
/// defs seed the analysis through the ordinary gen set.
pub struct ReachingDefs;

impl FlowAnalysis for ReachingDefs {
    type Fact = Def;

    fn generate(&self, _cfg: &Cfg, node: &CfgNode) -> HashSet<Def> {
        node.meta
            .defs
            .iter()
            .map(|v| (v.clone(), node.id))
            .collect()
    }

    fn kills(&self, node: &CfgNode, fact: &Def) -> bool {
        node.meta.defs.contains(&fact.0) && fact.1 != node.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DefUseChain {
    pub variable: String,
    pub def_node_id: NodeId,
    pub use_node_ids: Vec<NodeId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UseDefChain {
    pub variable: String,
    pub use_node_id: NodeId,
    pub def_node_ids: Vec<NodeId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainSet {
    pub chains: Vec<DefUseChain>,
    pub use_def: Vec<UseDefChain>,
}

/// Build def-use and use-def chains for every routine of one translation
/// unit. `interprocedural` switches the parameter-aliasing pass.
pub fn analyze_def_use_with(routines: &[Cfg], interprocedural: bool) -> ChainSet {
    let solutions: Vec<FlowSolution<Def>> = routines
        .iter()
        .map(|r| dataflow::solve(r, &ReachingDefs))
        .collect();

    // every call site in the unit, grouped by callee name
    let mut sites: HashMap<&str, Vec<(usize, NodeId, &CallSite)>> = HashMap::new();
    for (ri, r) in routines.iter().enumerate() {
        for node in r.nodes() {
            for call in &node.meta.calls {
                sites
                    .entry(call.callee.as_str())
                    .or_default()
                    .push((ri, node.id, call));
            }
        }
    }

    let mut def_use: BTreeMap<(String, NodeId), BTreeSet<NodeId>> = BTreeMap::new();
    let mut use_def: BTreeMap<(String, NodeId), BTreeSet<NodeId>> = BTreeMap::new();

    for (ri, routine) in routines.iter().enumerate() {
        for node in routine.nodes() {
            for var in &node.meta.uses {
                let mut defs = reaching(&solutions[ri], node.id, var);
                // a node that both defines and uses the variable (x++)
                // reaches itself in addition to every earlier definition
                if node.meta.defs.contains(var) {
                    defs.insert(node.id);
                }
                if interprocedural {
                    alias_defs(routines, &solutions, &sites, routine, var, &mut defs);
                }
                if defs.is_empty() {
                    continue;
                }
                debug!(
                    target: "dfg",
                    "use of `{var}` at {} resolves to {:?}",
                    node.id, defs
                );
                for &d in &defs {
                    def_use
                        .entry((var.clone(), d))
                        .or_default()
                        .insert(node.id);
                }
                use_def.insert((var.clone(), node.id), defs);
            }
        }
    }

    ChainSet {
        chains: def_use
            .into_iter()
            .map(|((variable, def_node_id), uses)| DefUseChain {
                variable,
                def_node_id,
                use_node_ids: uses.into_iter().collect(),
            })
            .collect(),
        use_def: use_def
            .into_iter()
            .map(|((variable, use_node_id), defs)| UseDefChain {
                variable,
                use_node_id,
                def_node_ids: defs.into_iter().collect(),
            })
            .collect(),
    }
}

/// Definitions of `var` reaching the input of `node`.
fn reaching(solution: &FlowSolution<Def>, node: NodeId, var: &str) -> BTreeSet<NodeId> {
    solution
        .input(node)
        .map(|facts| {
            facts
                .iter()
                .filter(|(v, _)| v == var)
                .map(|(_, d)| *d)
                .collect()
        })
        .unwrap_or_default()
}

/// When `var` is the k-th parameter of `routine`, every intra-file call
/// site binding a plain identifier to that position contributes the
/// definitions reaching its argument. Arity mismatches contribute nothing.
fn alias_defs(
    routines: &[Cfg],
    solutions: &[FlowSolution<Def>],
    sites: &HashMap<&str, Vec<(usize, NodeId, &CallSite)>>,
    routine: &Cfg,
    var: &str,
    defs: &mut BTreeSet<NodeId>,
) {
    let Some(k) = routine.params.iter().position(|p| p == var) else {
        return;
    };
    let Some(name) = routine.name.as_deref() else {
        return;
    };
    let Some(calls) = sites.get(name) else {
        return;
    };
    for (ci, call_node, call) in calls {
        if let Some(Some(arg)) = call.args.get(k) {
            defs.extend(reaching(&solutions[*ci], *call_node, arg));
            let caller_node = routines[*ci].node(*call_node);
            if caller_node.is_some_and(|n| n.meta.defs.contains(arg)) {
                defs.insert(*call_node);
            }
        }
    }
}

// -------------------------------------------------------------------------
//  Tests
// -------------------------------------------------------------------------

#[cfg(test)]
fn analyze(code: &str) -> (crate::cfg::CfgSet, ChainSet) {
    let set = crate::build_cfgs(code.as_bytes(), "c").expect("analysis should succeed");
    let chains = crate::analyze_def_use(&set.routines);
    (set, chains)
}

#[cfg(test)]
fn node_text(set: &crate::cfg::CfgSet, id: NodeId) -> String {
    set.routine_of(id)
        .and_then(|r| r.node(id))
        .map(|n| n.text.clone())
        .unwrap_or_default()
}

#[test]
fn straight_line_def_reaches_its_use() {
    let (set, chains) = analyze("int f(){int a=1; return a;}");
    let chain = chains.chains.iter().find(|c| c.variable == "a").unwrap();
    assert_eq!(node_text(&set, chain.def_node_id), "int a=1;");
    assert_eq!(chain.use_node_ids.len(), 1);
    assert_eq!(node_text(&set, chain.use_node_ids[0]), "return a;");
}

#[test]
fn parameter_defines_at_entry() {
    let (set, chains) = analyze("int g(int a){int b=a+1; return b;}");
    let g = &set.routines[0];
    let a_chain = chains.chains.iter().find(|c| c.variable == "a").unwrap();
    assert_eq!(a_chain.def_node_id, g.entry);
    assert_eq!(node_text(&set, a_chain.use_node_ids[0]), "int b=a+1;");

    let b_chain = chains.chains.iter().find(|c| c.variable == "b").unwrap();
    assert_eq!(node_text(&set, b_chain.def_node_id), "int b=a+1;");
    assert_eq!(node_text(&set, b_chain.use_node_ids[0]), "return b;");
}

#[test]
fn second_assignment_shadows_the_first() {
    let (set, chains) = analyze("int f(){int v; v=1; v=2; return v;}");
    let used: Vec<&DefUseChain> = chains
        .chains
        .iter()
        .filter(|c| c.variable == "v" && !c.use_node_ids.is_empty())
        .collect();
    assert_eq!(used.len(), 1);
    assert_eq!(node_text(&set, used[0].def_node_id), "v=2;");
}

#[test]
fn loop_confluence_merges_pre_loop_and_body_defs() {
    let (set, chains) = analyze("int w(int n){int s=0; while(n>0){s=s+n; n=n-1;} return s;}");
    let w = &set.routines[0];
    let header = w
        .nodes_of_kind(crate::cfg::NodeKind::LoopHeader)
        .next()
        .unwrap();
    let n_at_header = chains
        .use_def
        .iter()
        .find(|c| c.variable == "n" && c.use_node_id == header.id)
        .unwrap();
    let mut texts: Vec<String> = n_at_header
        .def_node_ids
        .iter()
        .map(|&d| node_text(&set, d))
        .collect();
    texts.sort();
    assert_eq!(texts, vec!["n=n-1;", "w"]); // body def and the parameter

    let s_at_return = chains
        .use_def
        .iter()
        .find(|c| c.variable == "s" && node_text(&set, c.use_node_id).starts_with("return"))
        .unwrap();
    let mut texts: Vec<String> = s_at_return
        .def_node_ids
        .iter()
        .map(|&d| node_text(&set, d))
        .collect();
    texts.sort();
    assert_eq!(texts, vec!["int s=0;", "s=s+n;"]);
}

#[test]
fn update_expression_reaches_itself_and_prior_defs() {
    let (set, chains) = analyze("int u(){int a=0; a++; return a;}");
    let inc = set.routines[0]
        .nodes()
        .find(|n| n.text == "a++;")
        .unwrap();
    let at_inc = chains
        .use_def
        .iter()
        .find(|c| c.variable == "a" && c.use_node_id == inc.id)
        .unwrap();
    let mut texts: Vec<String> = at_inc
        .def_node_ids
        .iter()
        .map(|&d| node_text(&set, d))
        .collect();
    texts.sort();
    assert_eq!(texts, vec!["a++;", "int a=0;"]);

    // downstream, only the increment reaches
    let at_ret = chains
        .use_def
        .iter()
        .find(|c| c.variable == "a" && node_text(&set, c.use_node_id).starts_with("return"))
        .unwrap();
    assert_eq!(at_ret.def_node_ids, vec![inc.id]);
}

#[test]
fn argument_definitions_alias_into_the_callee_parameter() {
    let (set, chains) = analyze(
        "int g(int a){int b=a+1; return b;}\nint m(){int x=5; return g(x);}",
    );
    let g = set.routine_named("g").unwrap();
    let a_use = chains
        .use_def
        .iter()
        .find(|c| c.variable == "a" && node_text(&set, c.use_node_id) == "int b=a+1;")
        .unwrap();
    let mut texts: Vec<String> = a_use
        .def_node_ids
        .iter()
        .map(|&d| node_text(&set, d))
        .collect();
    texts.sort();
    // the parameter's ENTRY def plus the caller's `int x=5;`
    assert_eq!(texts, vec!["g", "int x=5;"]);
    assert!(a_use.def_node_ids.contains(&g.entry));
}

#[test]
fn arity_mismatch_contributes_no_aliases() {
    let (set, chains) = analyze("int g(int a, int b){return a+b;}\nint m(){int x=5; return g(x);}");
    let b_use = chains
        .use_def
        .iter()
        .find(|c| c.variable == "b")
        .unwrap();
    let g = set.routine_named("g").unwrap();
    assert_eq!(b_use.def_node_ids, vec![g.entry]);
}
