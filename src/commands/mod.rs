pub mod analyze;

use crate::cli::Commands;
use crate::errors::CanopyResult;
use crate::utils::Config;

pub fn handle_command(command: Commands, config: &mut Config) -> CanopyResult<()> {
    match command {
        Commands::Analyze {
            path,
            language,
            format,
            pretty,
            no_chains,
        } => {
            if pretty {
                config.output.pretty = true;
            }
            if no_chains {
                config.analysis.chains = false;
            }
            analyze::handle(&path, language.as_deref(), &format, config)
        }
        Commands::Languages => {
            for lang in crate::ast::Lang::ALL {
                println!("{}", lang.name());
            }
            Ok(())
        }
    }
}
