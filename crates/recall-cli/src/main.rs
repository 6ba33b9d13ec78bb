mod cli;
mod commands;
mod completions;
mod output;
mod setup;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        completions::generate_completions(shell);
        return Ok(());
    }

    let _guard = setup::init_logging(cli.verbose)?;
    let core = setup::prepare_core(&cli).await?;
    let format = cli.format;

    let result = match cli.command {
        Commands::Observe(args) => commands::capture::observe(&core, args, format).await,
        Commands::Prompt(args) => commands::capture::prompt(&core, args, format).await,
        Commands::Summarize(args) => commands::capture::summarize(&core, args, format).await,
        Commands::End(args) => commands::capture::end(&core, args, format).await,
        Commands::Drain(args) => commands::drain::run(&core, args, format).await,
        Commands::Status => commands::status::run(&core, format).await,
        Commands::Completions { .. } => Ok(()),
    };

    core.shutdown().await;
    result
}
