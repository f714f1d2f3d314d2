//! rpg-forge CLI entry point.

use clap::Parser;

use rpg_forge::cli::commands::{self, load_config};
use rpg_forge::cli::{handle_error, Cli, Commands};
use rpg_forge::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => handle_error(err, cli.json),
    };
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }

    let _logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => logger,
        Err(err) => handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args, config, cli.json).await,
        Commands::Order(args) => commands::order::execute(args, cli.json),
        Commands::Status(args) => commands::status::execute(args, &config, cli.json),
        Commands::Reset(args) => commands::reset::execute(args, &config, cli.json),
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
