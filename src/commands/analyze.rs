use crate::ast::Lang;
use crate::cfg::CfgSet;
use crate::errors::{CanopyError, CanopyResult};
use crate::export::{self, AnalysisJson, ReportJson};
use crate::utils::Config;
use crate::utils::ext::language_for;
use crate::walk::spawn_senders;
use console::style;
use dashmap::DashMap;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;

/// Entry point called by the CLI.
pub fn handle(
    path: &str,
    language: Option<&str>,
    format: &str,
    config: &Config,
) -> CanopyResult<()> {
    let target = Path::new(path).canonicalize()?;
    let format = if format.is_empty() {
        config.output.default_format.as_str()
    } else {
        format
    };
    let lang_override = language.map(Lang::from_name).transpose()?;

    if target.is_dir() {
        analyze_tree(&target, lang_override, format, config)
    } else {
        let report = analyze_file(&target, lang_override, format, config)?;
        println!("{report}");
        Ok(())
    }
}

fn analyze_tree(
    root: &Path,
    lang_override: Option<Lang>,
    format: &str,
    config: &Config,
) -> CanopyResult<()> {
    if !config.output.quiet {
        println!(
            "{} {}...\n",
            style("Analyzing").green().bold(),
            root.display()
        );
    }

    let rx = spawn_senders(root, config);
    let reports: DashMap<String, String> = DashMap::new();
    let failures: DashMap<String, String> = DashMap::new();

    rx.into_iter().flatten().par_bridge().for_each(|path| {
        if lang_override.is_none() && language_for(&path).is_none() {
            return;
        }
        let key = path.to_string_lossy().into_owned();
        match analyze_file(&path, lang_override, format, config) {
            Ok(report) => {
                reports.insert(key, report);
            }
            Err(e) => {
                failures.insert(key, e.to_string());
            }
        }
    });

    // deterministic output order
    let sorted: BTreeMap<String, String> = reports.into_iter().collect();
    let count = sorted.len();
    for (path, report) in &sorted {
        println!("{}", style(path).blue().underlined());
        println!("{report}");
    }
    for entry in failures.iter() {
        eprintln!(
            "{}: {}: {}",
            style("warning").yellow().bold(),
            entry.key(),
            entry.value()
        );
    }
    if !config.output.quiet {
        println!(
            "{} {} file(s).",
            style("Analyzed").green().bold(),
            style(count).bold()
        );
    }
    Ok(())
}

/// Run the core on one file and render it in the requested format.
fn analyze_file(
    path: &Path,
    lang_override: Option<Lang>,
    format: &str,
    config: &Config,
) -> CanopyResult<String> {
    let lang = match lang_override.or_else(|| language_for(path)) {
        Some(l) => l,
        None => {
            return Err(CanopyError::UnsupportedLanguage(
                path.to_string_lossy().into_owned(),
            ));
        }
    };
    let bytes = std::fs::read(path)?;
    let set = crate::build_cfgs_for(&bytes, lang)?;
    render(&set, format, config)
}

fn render(set: &CfgSet, format: &str, config: &Config) -> CanopyResult<String> {
    match format {
        "dot" => {
            let mut out = String::new();
            for routine in &set.routines {
                out.push_str(&export::export_dot(routine));
            }
            Ok(out)
        }
        "json" => {
            let chains = config
                .analysis
                .chains
                .then(|| crate::analyze_def_use_with(&set.routines, config.analysis.interprocedural));
            let report = ReportJson {
                cfg: AnalysisJson::from(set),
                chains,
            };
            let rendered = if config.output.pretty {
                serde_json::to_string_pretty(&report)?
            } else {
                serde_json::to_string(&report)?
            };
            Ok(rendered)
        }
        other => Err(CanopyError::Msg(format!("unknown output format `{other}`"))),
    }
}

// -------------------------------------------------------------------------
//  Tests
// -------------------------------------------------------------------------

#[test]
fn single_file_renders_json() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("f.c");
    std::fs::write(&file, "int f(){return 0;}").unwrap();

    let config = Config::default();
    let report = analyze_file(&file, None, "json", &config).unwrap();
    let value: serde_json::Value = serde_json::from_str(&report).unwrap();
    assert_eq!(value["routines"][0]["function_name"], "f");
    assert!(value.get("chains").is_some());
}

#[test]
fn unknown_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("notes.txt");
    std::fs::write(&file, "just some text").unwrap();

    let config = Config::default();
    let err = analyze_file(&file, None, "json", &config).unwrap_err();
    assert!(matches!(err, CanopyError::UnsupportedLanguage(_)));
}

#[test]
fn dot_format_renders_every_routine() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("two.c");
    std::fs::write(&file, "int a(){return 1;}\nint b(){return 2;}").unwrap();

    let config = Config::default();
    let report = analyze_file(&file, None, "dot", &config).unwrap();
    assert_eq!(report.matches("digraph CFG").count(), 2);
}
