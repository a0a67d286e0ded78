use crate::errors::CanopyResult;
use console::style;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

static DEFAULT_CONFIG_TOML: &str = include_str!("../../default-canopy.conf");

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Compute def-use / use-def chains after CFG construction.
    pub chains: bool,

    /// Extend chains across argument -> parameter bindings at call sites
    /// inside the same file.
    pub interprocedural: bool,
}
impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            chains: true,
            interprocedural: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    /// The default output format ("json" or "dot").
    pub default_format: String,

    /// Pretty-print JSON output.
    pub pretty: bool,

    /// Whether to print progress notes to the console or not.
    pub quiet: bool,
}
impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_format: "json".into(),
            pretty: false,
            quiet: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct WalkerConfig {
    /// Directories to exclude when analyzing a tree.
    pub excluded_directories: Vec<String>,

    /// Whether to respect VCS ignore files (`.gitignore`, ..) or not.
    pub read_vcsignore: bool,

    /// Whether to follow symlinks or not.
    pub follow_symlinks: bool,

    /// Whether to analyze hidden files or not.
    pub scan_hidden_files: bool,
}
impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            excluded_directories: vec![
                "node_modules",
                ".git",
                "target",
                "build",
                "dist",
                ".vscode",
                ".idea",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            read_vcsignore: true,
            follow_symlinks: false,
            scan_hidden_files: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PerformanceConfig {
    /// The maximum number of worker threads to use, or `None` to auto-detect.
    pub worker_threads: Option<usize>,

    /// The maximum number of paths to hand out in a single batch.
    pub batch_size: usize,

    /// capacity = threads x this
    pub channel_multiplier: usize,

    /// The stack size for Rayon threads, in bytes.
    pub rayon_thread_stack_size: usize,
}
impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            batch_size: 100usize,
            channel_multiplier: 4usize,
            rayon_thread_stack_size: 8 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub analysis: AnalysisConfig,
    pub output: OutputConfig,
    pub walker: WalkerConfig,
    pub performance: PerformanceConfig,
}

impl Config {
    pub fn load(config_dir: &Path) -> CanopyResult<Self> {
        let mut config = Config::default();

        let default_config_path = config_dir.join("canopy.conf");
        if !default_config_path.exists() {
            create_example_config(config_dir)?;
        }

        let user_config_path = config_dir.join("canopy.local");
        if user_config_path.exists() {
            let user_config_content = fs::read_to_string(&user_config_path)?;
            let user_config: Config = toml::from_str(&user_config_content)?;

            config = merge_configs(config, user_config);

            if !config.output.quiet {
                println!(
                    "{}: Loaded user config from: {}\n",
                    style("note").green().bold(),
                    style(user_config_path.display()).underlined().bold()
                );
            }
        }

        Ok(config)
    }
}

fn create_example_config(config_dir: &Path) -> CanopyResult<()> {
    let example_path = config_dir.join("canopy.conf");
    if !example_path.exists() {
        fs::write(&example_path, DEFAULT_CONFIG_TOML)?;
        tracing::debug!("Example config created at: {}", example_path.display());
    }
    Ok(())
}

/// Merge user config into default config, preserving defaults where the
/// user didn't supply new exclusions and overriding everything else.
fn merge_configs(mut default: Config, user: Config) -> Config {
    // --- AnalysisConfig ---
    default.analysis.chains = user.analysis.chains;
    default.analysis.interprocedural = user.analysis.interprocedural;

    // --- OutputConfig ---
    default.output.default_format = user.output.default_format;
    default.output.pretty = user.output.pretty;
    default.output.quiet = user.output.quiet;

    // --- WalkerConfig ---
    default.walker.read_vcsignore = user.walker.read_vcsignore;
    default.walker.follow_symlinks = user.walker.follow_symlinks;
    default.walker.scan_hidden_files = user.walker.scan_hidden_files;

    // Merge exclusion lists (default ⊔ user), then sort & dedupe
    default
        .walker
        .excluded_directories
        .extend(user.walker.excluded_directories);
    default.walker.excluded_directories.sort_unstable();
    default.walker.excluded_directories.dedup();

    // --- PerformanceConfig ---
    default.performance.worker_threads = user.performance.worker_threads;
    default.performance.batch_size = user.performance.batch_size;
    default.performance.channel_multiplier = user.performance.channel_multiplier;
    default.performance.rayon_thread_stack_size = user.performance.rayon_thread_stack_size;

    default
}

#[test]
fn merge_configs_dedupes_and_keeps_order() {
    let mut default_cfg = Config::default();
    default_cfg.walker.excluded_directories = vec!["out".into(), "target".into()];

    let mut user_cfg = Config::default();
    user_cfg.walker.excluded_directories = vec!["gen".into(), "out".into()];

    let merged = merge_configs(default_cfg, user_cfg);

    let dirs = &merged.walker.excluded_directories;
    assert!(dirs.windows(2).all(|w| w[0] < w[1]));
    assert!(dirs.contains(&"gen".to_string()));
}

#[test]
fn load_creates_example_and_reads_user_overrides() {
    let cfg_dir = tempfile::tempdir().unwrap();
    let cfg_path = cfg_dir.path();

    let user_toml = r#"
        [analysis]
        interprocedural = false

        [output]
        pretty = true
        quiet = true
    "#;
    fs::write(cfg_path.join("canopy.local"), user_toml).unwrap();

    let cfg = Config::load(cfg_path).expect("Config::load should succeed");

    assert!(cfg_path.join("canopy.conf").is_file());

    assert!(!cfg.analysis.interprocedural);
    assert!(cfg.analysis.chains);
    assert!(cfg.output.pretty);
    assert!(!cfg.walker.follow_symlinks);
}

#[test]
fn shipped_defaults_parse_cleanly() {
    let parsed: Config = toml::from_str(DEFAULT_CONFIG_TOML).unwrap();
    assert_eq!(parsed.output.default_format, "json");
    assert!(parsed.analysis.chains);
}
