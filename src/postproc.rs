//! Graph normalization after routine visitation: passthrough compaction,
//! reachability sweep, call/return wiring, and the invariant checks that
//! turn visitor bugs into hard errors instead of bad output.

use crate::cfg::{Cfg, EdgeLabel, NodeId, NodeKind};
use crate::errors::{CanopyError, CanopyResult};
use crate::visit::CallLink;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

/// Normalize one routine. Runs before call edges exist, so reachability is
/// a purely intra-routine question here.
pub(crate) fn run(cfg: &mut Cfg) -> CanopyResult<()> {
    compact(cfg);
    sweep(cfg);
    verify_routine(cfg)
}

/// Splice out every CASE / DEFAULT / PLACEHOLDER node.
fn compact(cfg: &mut Cfg) {
    let targets: Vec<NodeId> = cfg
        .nodes()
        .filter(|n| n.kind.is_passthrough())
        .map(|n| n.id)
        .collect();
    for id in targets {
        cfg.splice_out(id);
    }
}

/// Delete everything not forward-reachable from ENTRY. Code textually
/// after an unconditional jump disappears here. EXIT is kept even when
/// every path diverges, so the routine shape stays uniform.
fn sweep(cfg: &mut Cfg) {
    let mut reachable = HashSet::new();
    let mut queue = VecDeque::from([cfg.entry]);
    reachable.insert(cfg.entry);
    while let Some(id) = queue.pop_front() {
        let Some(node) = cfg.node(id) else { continue };
        for &s in &node.succs {
            if cfg.contains(s) && reachable.insert(s) {
                queue.push_back(s);
            }
        }
    }
    let dead: Vec<NodeId> = cfg
        .ids()
        .filter(|id| !reachable.contains(id) && *id != cfg.exit)
        .collect();
    if !dead.is_empty() {
        debug!(target: "cfg", "sweeping {} unreachable node(s)", dead.len());
    }
    for id in dead {
        cfg.remove_node(id);
    }
}

/// Intra-routine structural invariants. A violation is a visitor bug.
fn verify_routine(cfg: &Cfg) -> CanopyResult<()> {
    let routine = cfg.name.as_deref().unwrap_or("<anonymous>");
    let fail = |msg: String| Err(CanopyError::Internal(format!("{routine}: {msg}")));

    let entries = cfg.nodes_of_kind(NodeKind::Entry).count();
    let exits = cfg.nodes_of_kind(NodeKind::Exit).count();
    if entries != 1 || exits != 1 {
        return fail(format!("expected one ENTRY/EXIT, found {entries}/{exits}"));
    }
    let Some(entry) = cfg.node(cfg.entry) else {
        return fail("ENTRY id does not resolve".into());
    };
    let Some(exit) = cfg.node(cfg.exit) else {
        return fail("EXIT id does not resolve".into());
    };
    if !entry.preds.is_empty() {
        return fail("ENTRY has predecessors".into());
    }
    if !exit.succs.is_empty() {
        return fail("EXIT has successors".into());
    }

    for node in cfg.nodes() {
        if node.kind.is_passthrough() {
            return fail(format!("passthrough node {} survived compaction", node.id));
        }
        for &s in &node.succs {
            match cfg.node(s) {
                Some(sn) if sn.preds.contains(&node.id) => {}
                Some(_) => return fail(format!("edge {} -> {s} lacks its back pointer", node.id)),
                None => return fail(format!("edge {} -> {s} leaves the routine", node.id)),
            }
        }
        for &p in &node.preds {
            match cfg.node(p) {
                Some(pn) if pn.succs.contains(&node.id) => {}
                _ => return fail(format!("pred {p} of {} is not symmetric", node.id)),
            }
        }
        verify_labels(cfg, node.id, routine)?;
    }
    Ok(())
}

/// Labels may only sit on branch, switch, and call/return edges.
fn verify_labels(cfg: &Cfg, id: NodeId, routine: &str) -> CanopyResult<()> {
    let Some(node) = cfg.node(id) else {
        return Ok(());
    };
    let fail = |msg: String| Err(CanopyError::Internal(format!("{routine}: {msg}")));

    match node.kind {
        NodeKind::Condition | NodeKind::LoopHeader => {
            for &s in &node.succs {
                match node.labels.get(&s) {
                    Some(EdgeLabel::True | EdgeLabel::False) => {}
                    Some(l) if l.is_call() => {}
                    other => {
                        return fail(format!(
                            "branch node {id} has a non-true/false edge to {s} ({other:?})"
                        ));
                    }
                }
            }
        }
        NodeKind::SwitchHead => {
            let mut defaults = 0;
            for &s in &node.succs {
                match node.labels.get(&s) {
                    Some(EdgeLabel::Default) => defaults += 1,
                    Some(EdgeLabel::Case(_)) => {}
                    Some(l) if l.is_call() => {}
                    other => {
                        return fail(format!(
                            "switch head {id} has an unlabeled or foreign edge to {s} ({other:?})"
                        ));
                    }
                }
            }
            if defaults > 1 {
                return fail(format!("switch head {id} has {defaults} default edges"));
            }
        }
        _ => {
            for (s, l) in &node.labels {
                if !l.is_call() {
                    return fail(format!(
                        "node {id} ({:?}) carries label `{l}` on edge to {s}",
                        node.kind
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Wire `function_call` / `function_return` edges for every recorded call
/// whose callee is a routine of the same translation unit. Callees outside
/// the unit are skipped without a warning; that is normal.
pub(crate) fn link_calls(routines: &mut [Cfg], links: &[CallLink]) {
    let by_name: HashMap<String, usize> = routines
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.name.clone().map(|n| (n, i)))
        .fold(HashMap::new(), |mut m, (n, i)| {
            m.entry(n).or_insert(i);
            m
        });

    for link in links {
        let Some(&callee_idx) = by_name.get(&link.callee) else {
            continue;
        };
        // the call node may have been swept as unreachable
        let Some(caller_idx) = routines.iter().position(|r| r.contains(link.node)) else {
            continue;
        };
        let callee_entry = routines[callee_idx].entry;
        let callee_exit = routines[callee_idx].exit;
        debug!(
            target: "cfg",
            "linking call {} -> {} ({})",
            link.node, callee_entry, link.callee
        );
        cross_edge(
            routines,
            caller_idx,
            link.node,
            callee_idx,
            callee_entry,
            EdgeLabel::FunctionCall,
        );
        cross_edge(
            routines,
            callee_idx,
            callee_exit,
            caller_idx,
            link.node,
            EdgeLabel::FunctionReturn,
        );
    }
}

fn cross_edge(
    routines: &mut [Cfg],
    fi: usize,
    from: NodeId,
    ti: usize,
    to: NodeId,
    label: EdgeLabel,
) {
    if fi == ti {
        routines[fi].add_edge(from, to, Some(label));
        return;
    }
    let (a, b) = if fi < ti {
        let (left, right) = routines.split_at_mut(ti);
        (&mut left[fi], &mut right[0])
    } else {
        let (left, right) = routines.split_at_mut(fi);
        (&mut right[0], &mut left[ti])
    };
    a.push_succ(from, to, Some(label));
    b.push_pred(to, from);
}

/// Whole-unit consistency after linking: unique ids and symmetric edges
/// across routine boundaries.
pub(crate) fn verify_set(routines: &[Cfg]) -> CanopyResult<()> {
    let mut owner: HashMap<NodeId, usize> = HashMap::new();
    for (i, r) in routines.iter().enumerate() {
        for id in r.ids() {
            if owner.insert(id, i).is_some() {
                return Err(CanopyError::Internal(format!(
                    "node id {id} is owned by two routines"
                )));
            }
        }
    }
    for r in routines {
        for node in r.nodes() {
            for &s in &node.succs {
                let Some(&oi) = owner.get(&s) else {
                    return Err(CanopyError::Internal(format!(
                        "edge {} -> {s} points outside the translation unit",
                        node.id
                    )));
                };
                let target = routines[oi].node(s);
                if !target.is_some_and(|t| t.preds.contains(&node.id)) {
                    return Err(CanopyError::Internal(format!(
                        "cross-routine edge {} -> {s} lacks its back pointer",
                        node.id
                    )));
                }
            }
        }
    }
    Ok(())
}

// -------------------------------------------------------------------------
//  Tests
// -------------------------------------------------------------------------

#[cfg(test)]
fn build_c(code: &str) -> crate::cfg::CfgSet {
    crate::build_cfgs(code.as_bytes(), "c").expect("analysis should succeed")
}

#[test]
fn straight_line_routine_has_four_nodes() {
    let set = build_c("int f(){int a=1; return a;}");
    assert_eq!(set.routines.len(), 1);
    let f = &set.routines[0];
    assert_eq!(f.len(), 4);

    let stmt = f.nodes_of_kind(NodeKind::Statement).next().unwrap();
    let ret = f.nodes_of_kind(NodeKind::Return).next().unwrap();
    assert_eq!(stmt.text, "int a=1;");
    assert_eq!(ret.text, "return a;");
    assert_eq!(f.node(f.entry).unwrap().succs, vec![stmt.id]);
    assert_eq!(stmt.succs, vec![ret.id]);
    assert_eq!(ret.succs, vec![f.exit]);
    assert!(stmt.meta.defs.contains("a"));
    assert!(ret.meta.uses.contains("a"));
}

#[test]
fn empty_body_collapses_to_entry_exit() {
    let set = build_c("void f(){}");
    let f = &set.routines[0];
    assert_eq!(f.len(), 2);
    assert_eq!(f.node(f.entry).unwrap().succs, vec![f.exit]);
}

#[test]
fn code_after_return_is_swept() {
    let set = build_c("int f(){return 1; int dead = 2;}");
    let f = &set.routines[0];
    assert!(f.nodes().all(|n| !n.text.contains("dead")));
}

#[test]
fn no_passthrough_nodes_survive() {
    let set = build_c(
        "int s(int x){switch(x){case 1: return 1; case 2: return 2; default: return 0;}}",
    );
    let f = &set.routines[0];
    assert!(f.nodes().all(|n| !n.kind.is_passthrough()));
}

#[test]
fn switch_head_edges_go_straight_to_case_bodies() {
    let set = build_c(
        "int s(int x){switch(x){case 1: return 1; case 2: return 2; default: return 0;}}",
    );
    let f = &set.routines[0];
    let head = f.nodes_of_kind(NodeKind::SwitchHead).next().unwrap();
    assert_eq!(head.succs.len(), 3);
    let labels: Vec<String> = head
        .succs
        .iter()
        .map(|s| head.labels.get(s).unwrap().to_string())
        .collect();
    assert_eq!(labels, vec!["1", "2", "default"]);
    for &s in &head.succs {
        assert_eq!(f.node(s).unwrap().kind, NodeKind::Return);
    }
}

#[test]
fn while_loop_wires_back_edge_and_false_exit() {
    let set = build_c("int w(int n){int s=0; while(n>0){s=s+n; n=n-1;} return s;}");
    let f = &set.routines[0];
    let header = f.nodes_of_kind(NodeKind::LoopHeader).next().unwrap();
    assert_eq!(header.text, "n>0");

    let t = header
        .succs
        .iter()
        .copied()
        .find(|s| header.labels.get(s) == Some(&EdgeLabel::True))
        .unwrap();
    let fl = header
        .succs
        .iter()
        .copied()
        .find(|s| header.labels.get(s) == Some(&EdgeLabel::False))
        .unwrap();
    assert_eq!(f.node(t).unwrap().text, "s=s+n;");
    assert_eq!(f.node(fl).unwrap().kind, NodeKind::Return);

    // the body's last statement loops back to the header
    let last = f.nodes().find(|n| n.text == "n=n-1;").unwrap();
    assert_eq!(last.succs, vec![header.id]);
}

#[test]
fn do_while_checks_the_condition_after_the_body() {
    let set = build_c("int f(int n){ do { n = n - 1; } while(n > 0); return n; }");
    let f = &set.routines[0];
    let header = f.nodes_of_kind(NodeKind::LoopHeader).next().unwrap();
    assert_eq!(header.text, "n > 0");
    let body = f.nodes().find(|n| n.text == "n = n - 1;").unwrap();
    // control enters the body first; the header loops back to it
    assert_eq!(f.node(f.entry).unwrap().succs, vec![body.id]);
    assert_eq!(header.labels.get(&body.id), Some(&EdgeLabel::True));
}

#[test]
fn outer_fall_through_resumes_after_a_nested_switch() {
    let set = build_c(
        "int f(int x, int y){ switch(x){ case 1: switch(y){ default: break; } x = 8; case 2: x = 9; break; } return x; }",
    );
    let f = &set.routines[0];
    let x8 = f.nodes().find(|n| n.text == "x = 8;").unwrap();
    let x9 = f.nodes().find(|n| n.text == "x = 9;").unwrap();
    assert_eq!(x8.succs, vec![x9.id]);
}

#[test]
fn break_targets_the_innermost_loop() {
    let set = build_c("void f(int a){ while(a){ while(a){ break; } a = a - 1; } }");
    let f = &set.routines[0];
    let brk = f.nodes_of_kind(NodeKind::Break).next().unwrap();
    assert_eq!(brk.succs.len(), 1);
    // after compaction the break lands on the statement following the
    // inner loop, not on the routine exit
    assert_eq!(f.node(brk.succs[0]).unwrap().text, "a = a - 1;");
}

#[test]
fn continue_targets_the_for_update() {
    let set = build_c("void f(int n){ for(int i=0;i<n;i=i+1){ if(i==2) continue; n = n - 1; } }");
    let f = &set.routines[0];
    let cont = f.nodes_of_kind(NodeKind::Continue).next().unwrap();
    assert_eq!(cont.succs.len(), 1);
    assert_eq!(f.node(cont.succs[0]).unwrap().text, "i=i+1");
}

#[test]
fn goto_resolves_forward_and_unreachable_code_dies() {
    let set = build_c("int g(){ goto done; g(); done: return 0; }");
    let f = &set.routines[0];
    let jump = f.nodes_of_kind(NodeKind::Goto).next().unwrap();
    let label = f.nodes_of_kind(NodeKind::Label).next().unwrap();
    assert_eq!(jump.succs, vec![label.id]);
    assert_eq!(label.text, "done");
    // the skipped call statement is unreachable and swept
    assert!(f.nodes().all(|n| n.text != "g();"));
}

#[test]
fn unresolved_goto_is_a_warning_not_an_error() {
    let set = build_c("int g(){ goto nowhere; return 0; }");
    assert!(set.warnings.iter().any(|w| w.contains("nowhere")));
    assert_eq!(set.routines.len(), 1);
}

#[test]
fn call_and_return_edges_link_routines() {
    let set = build_c("int g(int a){return a+1;}\nint m(){int x=5; return g(x);}");
    let g = set.routine_named("g").unwrap();
    let m = set.routine_named("m").unwrap();
    let call = m.nodes_of_kind(NodeKind::Return).next().unwrap();

    assert!(call.succs.contains(&g.entry));
    assert_eq!(
        call.labels.get(&g.entry),
        Some(&EdgeLabel::FunctionCall)
    );
    let g_exit = g.node(g.exit).unwrap();
    assert!(g_exit.succs.contains(&call.id));
    assert_eq!(
        g_exit.labels.get(&call.id),
        Some(&EdgeLabel::FunctionReturn)
    );
}

#[test]
fn call_to_unknown_routine_is_silently_skipped() {
    let set = build_c("int m(){return puts(\"hi\");}");
    let m = &set.routines[0];
    let ret = m.nodes_of_kind(NodeKind::Return).next().unwrap();
    assert_eq!(ret.succs, vec![m.exit]);
    assert!(set.warnings.is_empty());
}

#[test]
fn if_without_else_keeps_both_branch_labels() {
    let set = build_c("int f(int c){int v=1; if(c){v=2;} return v;}");
    let f = &set.routines[0];
    let cond = f.nodes_of_kind(NodeKind::Condition).next().unwrap();
    assert_eq!(cond.succs.len(), 2);
    let mut labels: Vec<String> = cond.labels.values().map(|l| l.to_string()).collect();
    labels.sort();
    assert_eq!(labels, vec!["false", "true"]);
}
