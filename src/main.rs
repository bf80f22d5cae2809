//! Callrelay binary entry point.
//!
//! See the `callrelay` library for the core functionality.

use anyhow::Result;
use callrelay::Config;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "callrelay")]
#[command(version)]
#[command(about = "Push-notification relay for incoming-call dispatch")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay HTTP server
    Serve {
        /// Override the configured bind address
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print the effective configuration (secrets omitted)
    Config,
    /// Write a default config file to the config directory
    Init,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind } => {
            let mut config = Config::load()?;
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(callrelay::serve(config))?;
        }
        Commands::Config => {
            let config = Config::load()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Init => {
            let config = Config::default();
            config.save()?;
            println!(
                "Wrote default config to {}",
                Config::config_dir()?.join("config.json").display()
            );
        }
    }

    Ok(())
}
