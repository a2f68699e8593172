use clap::Parser;

use tabview::cli::commands::{init, serve};
use tabview::cli::{Cli, Commands};
use tabview::config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Init { force } = cli.command {
        return init::run_init(force);
    }

    let loaded = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    let config = loaded.unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        eprintln!("Using default configuration.");
        Settings::default()
    });

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Config => init::run_config(&config),
        Commands::Serve {
            file,
            port,
            bind,
            open,
            kind,
            title,
            no_watch,
        } => {
            let args = serve::ServeArgs {
                file,
                port,
                bind,
                open,
                kind,
                title,
                no_watch,
            };
            serve::run(args, config).await
        }
    }
}
