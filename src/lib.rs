// Canopy: control-flow and def-use analysis over tree-sitter parse trees.
//
// Per-routine CFG construction for C and Java, a reaching-definitions
// dataflow pass, and def-use / use-def chains with argument -> parameter
// aliasing across call sites inside one translation unit.

pub mod ast;
pub mod cfg;
pub mod chains;
pub mod cli;
pub mod commands;
pub mod dataflow;
pub mod errors;
pub mod export;
pub mod utils;
pub mod walk;

mod postproc;
mod visit;

pub use ast::Lang;
pub use cfg::{Cfg, CfgNode, CfgSet, EdgeLabel, Metadata, NodeId, NodeKind};
pub use chains::{ChainSet, DefUseChain, UseDefChain, analyze_def_use_with};
pub use errors::{CanopyError, CanopyResult};

/// Build one CFG per routine found in `source`. Fails on an unsupported
/// language name, blank input, or a tree whose root is an error node;
/// structural oddities inside routines degrade to warnings instead.
pub fn build_cfgs(source: &[u8], language: &str) -> CanopyResult<CfgSet> {
    build_cfgs_for(source, Lang::from_name(language)?)
}

/// Typed-language variant of [`build_cfgs`].
pub fn build_cfgs_for(source: &[u8], lang: Lang) -> CanopyResult<CfgSet> {
    let tree = ast::parse(source, lang)?;
    let mut warnings = Vec::new();
    let mut routines = Vec::new();
    let mut links = Vec::new();
    let mut next_id: NodeId = 0;

    for fn_node in ast::routines(tree.root_node(), lang) {
        let (mut cfg, mut calls) = visit::build_routine(fn_node, lang, source, next_id, &mut warnings);
        next_id = cfg.next_id();
        postproc::run(&mut cfg)?;
        links.append(&mut calls);
        routines.push(cfg);
    }

    postproc::link_calls(&mut routines, &links);
    postproc::verify_set(&routines)?;
    Ok(CfgSet { routines, warnings })
}

/// Def-use and use-def chains over the routines of one translation unit,
/// with parameter aliasing enabled.
pub fn analyze_def_use(routines: &[Cfg]) -> ChainSet {
    chains::analyze_def_use_with(routines, true)
}
