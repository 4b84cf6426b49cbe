// Main entry point for gotally

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error};

use gotally::cli::{Cli, Commands};
use gotally::commands;
use gotally::config::Config;
use gotally::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if cli.no_color || std::env::var_os("NO_COLOR").is_some() {
        console::set_colors_enabled_stderr(false);
    }

    // Load configuration from file (if exists)
    let config = Config::load();
    debug!("Starting gotally v{}", env!("CARGO_PKG_VERSION"));

    let code = match cli.command_or_default() {
        Commands::Stream(args) => commands::handle_stream(&args, config.as_ref()).await,
        Commands::Parse(args) => commands::handle_parse(&args, config.as_ref()).await,
        Commands::Completion(args) => commands::handle_completion(&args.shell).map(|_| 0),
    };

    match code {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}
