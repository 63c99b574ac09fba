mod cli;
mod commands;
mod error;
mod output;
mod script;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use roomlink_config::Config;

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;
use crate::output::Presentation;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "roomlink", &mut std::io::stdout());
            Ok(())
        }

        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        Command::Replay(args) => {
            let cfg = load_config(&cli.global)?;
            let presentation = Presentation::resolve(&cli.global, &cfg)?;
            let registry_config = cfg.to_registry_config()?;

            tracing::debug!(script = %args.script.display(), "replaying scenario");
            commands::replay::handle(args, registry_config, &presentation).await
        }
    }
}

/// Load the config file named by `--config`, or the platform default.
pub(crate) fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    let cfg = match global.config.as_deref() {
        Some(path) => roomlink_config::load_config_from(path)?,
        None => roomlink_config::load_config()?,
    };
    Ok(cfg)
}
