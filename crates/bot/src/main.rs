// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;
use tracing::error;

use ccbot::config::{self, Config};

#[derive(Parser)]
#[command(name = "ccbot", version, about = "Telegram-to-tmux bridge for AI coding agents.")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    subcommand: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Start the bridge (the default when no subcommand is given).
    Run,
    /// Consume one SessionStart payload from stdin and record the session.
    Hook {
        /// Install the hook declaration into the agent's settings instead.
        #[arg(long)]
        install: bool,
    },
    /// Scan a project's command files and regenerate the skill alias table.
    Sync { project_dir: PathBuf },
}

#[tokio::main]
async fn main() {
    config::load_dotenv();
    let cli = Cli::parse();

    match cli.subcommand {
        Some(Commands::Hook { install: true }) => {
            match ccbot::hook::install(&ccbot::hook::default_settings_path()) {
                Ok(true) => println!("hook installed"),
                Ok(false) => println!("hook already installed"),
                Err(e) => {
                    eprintln!("error: {e:#}");
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::Hook { install: false }) => {
            if let Err(e) = ccbot::hook::run(&cli.config).await {
                eprintln!("error: {e:#}");
                std::process::exit(1);
            }
        }
        Some(Commands::Sync { project_dir }) => {
            match ccbot::skills::sync(&project_dir, &cli.config.skills_path()) {
                Ok(count) => println!("wrote {count} skills"),
                Err(e) => {
                    eprintln!("error: {e:#}");
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::Run) | None => {
            let config = cli.config;
            if let Err(e) = config.validate() {
                eprintln!("error: {e}");
                std::process::exit(2);
            }
            if let Err(e) = ccbot::run::run(config).await {
                error!("fatal: {e:#}");
                std::process::exit(1);
            }
        }
    }
}
