//! Generic monotone forward dataflow over one routine's CFG.
//!
//! FIFO worklist with set-union meet: pop a node, join the outputs of its
//! predecessors, apply `(in ∖ kill) ∪ gen`, and requeue successors whose
//! input may have changed. The lattice is a finite powerset and the
//! transfer function is monotone, so this terminates.

use crate::cfg::{Cfg, CfgNode, NodeId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;

/// A forward may-analysis in GEN/KILL form.
pub trait FlowAnalysis {
    type Fact: Clone + Eq + Hash;

    /// Facts valid on entry to the routine (the boundary set).
    fn boundary(&self, cfg: &Cfg) -> HashSet<Self::Fact> {
        let _ = cfg;
        HashSet::new()
    }

    /// Facts this node generates.
    fn generate(&self, cfg: &Cfg, node: &CfgNode) -> HashSet<Self::Fact>;

    /// Whether this node invalidates `fact`.
    fn kills(&self, node: &CfgNode, fact: &Self::Fact) -> bool;
}

pub struct FlowSolution<F> {
    pub inputs: HashMap<NodeId, HashSet<F>>,
    pub outputs: HashMap<NodeId, HashSet<F>>,
}

impl<F: Clone + Eq + Hash> FlowSolution<F> {
    pub fn input(&self, id: NodeId) -> Option<&HashSet<F>> {
        self.inputs.get(&id)
    }

    pub fn output(&self, id: NodeId) -> Option<&HashSet<F>> {
        self.outputs.get(&id)
    }
}

/// Solve the analysis for one routine. Call and return transitions are
/// skipped on both sides of the join so facts never cross a routine
/// boundary; argument-to-parameter flow is layered on afterwards by the
/// chain builder.
pub fn solve<A: FlowAnalysis>(cfg: &Cfg, analysis: &A) -> FlowSolution<A::Fact> {
    let mut inputs: HashMap<NodeId, HashSet<A::Fact>> = HashMap::new();
    let mut outputs: HashMap<NodeId, HashSet<A::Fact>> = HashMap::new();
    for id in cfg.ids() {
        inputs.insert(id, HashSet::new());
        outputs.insert(id, HashSet::new());
    }

    let mut work: VecDeque<NodeId> = cfg.ids().collect();
    let mut queued: HashSet<NodeId> = work.iter().copied().collect();

    while let Some(id) = work.pop_front() {
        queued.remove(&id);
        let Some(node) = cfg.node(id) else { continue };

        let mut incoming = if id == cfg.entry {
            analysis.boundary(cfg)
        } else {
            HashSet::new()
        };
        for &p in &node.preds {
            let Some(pn) = cfg.node(p) else {
                continue; // predecessor lives in a sibling routine
            };
            if pn.labels.get(&id).is_some_and(|l| l.is_call()) {
                continue;
            }
            if let Some(out) = outputs.get(&p) {
                incoming.extend(out.iter().cloned());
            }
        }

        let mut out: HashSet<A::Fact> = incoming
            .iter()
            .filter(|&f| !analysis.kills(node, f))
            .cloned()
            .collect();
        out.extend(analysis.generate(cfg, node));

        inputs.insert(id, incoming);
        if outputs.get(&id) != Some(&out) {
            outputs.insert(id, out);
            for &s in &node.succs {
                if !cfg.contains(s) {
                    continue;
                }
                if node.labels.get(&s).is_some_and(|l| l.is_call()) {
                    continue;
                }
                if queued.insert(s) {
                    work.push_back(s);
                }
            }
        }
    }

    FlowSolution { inputs, outputs }
}

// -------------------------------------------------------------------------
//  Tests
// -------------------------------------------------------------------------

#[cfg(test)]
use crate::chains::ReachingDefs;

#[test]
fn converged_solution_is_a_fixpoint() {
    let set = crate::build_cfgs(
        b"int w(int n){int s=0; while(n>0){s=s+n; n=n-1;} return s;}",
        "c",
    )
    .unwrap();
    let cfg = &set.routines[0];
    let solution = solve(cfg, &ReachingDefs);

    // one more sweep over every node must not change a single output set
    for node in cfg.nodes() {
        let mut incoming: HashSet<_> = HashSet::new();
        for &p in &node.preds {
            if let Some(pn) = cfg.node(p)
                && !pn.labels.get(&node.id).is_some_and(|l| l.is_call())
            {
                incoming.extend(solution.output(p).unwrap().iter().cloned());
            }
        }
        let mut out: HashSet<_> = incoming
            .iter()
            .filter(|&f| !ReachingDefs.kills(node, f))
            .cloned()
            .collect();
        out.extend(ReachingDefs.generate(cfg, node));
        assert_eq!(&out, solution.output(node.id).unwrap());
    }
}

#[test]
fn second_definition_kills_the_first() {
    let set = crate::build_cfgs(b"int f(){int v; v=1; v=2; return v;}", "c").unwrap();
    let cfg = &set.routines[0];
    let solution = solve(cfg, &ReachingDefs);

    let ret = cfg
        .nodes()
        .find(|n| n.text.starts_with("return"))
        .unwrap();
    let defs: Vec<_> = solution
        .input(ret.id)
        .unwrap()
        .iter()
        .filter(|(v, _)| v == "v")
        .collect();
    assert_eq!(defs.len(), 1);
    let def_node = cfg.node(defs[0].1).unwrap();
    assert_eq!(def_node.text, "v=2;");
}

#[test]
fn both_branch_definitions_reach_the_join() {
    let set = crate::build_cfgs(b"int f(int c){int v=1; if(c){v=2;} return v;}", "c").unwrap();
    let cfg = &set.routines[0];
    let solution = solve(cfg, &ReachingDefs);

    let ret = cfg
        .nodes()
        .find(|n| n.text.starts_with("return"))
        .unwrap();
    let mut defs: Vec<String> = solution
        .input(ret.id)
        .unwrap()
        .iter()
        .filter(|(v, _)| v == "v")
        .map(|(_, d)| cfg.node(*d).unwrap().text.clone())
        .collect();
    defs.sort();
    assert_eq!(defs, vec!["int v=1;", "v=2;"]);
}
