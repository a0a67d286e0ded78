use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "canopy")]
#[command(about = "Control-flow and def-use analysis for C and Java sources")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a file or directory and print CFG/DFG results
    Analyze {
        /// Path to analyze (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,

        /// Source language; inferred from the file extension when omitted
        #[arg(short, long)]
        language: Option<String>,

        /// Output format ("json" or "dot")
        #[arg(short, long, default_value = "")]
        format: String,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// Skip def-use chain computation
        #[arg(long)]
        no_chains: bool,
    },

    /// List registered languages
    Languages,
}
