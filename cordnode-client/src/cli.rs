use std::path::PathBuf;

use clap::{Parser, Subcommand};

const HELP_EPILOG: &str = r#"Config resolution order:
  1) --config/-c PATH
  2) $CORDNODE_CONFIG
  3) platform default, e.g. ~/.config/cordnode/client.yaml
"#;

#[derive(Debug, Parser)]
#[command(
    name = "cordnode-client",
    version,
    about = "CordNode mining node",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Optional subcommand. Without one, runs the mining node.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in with a Discord identity and write the client config
    Login {
        /// Server URL (e.g., http://127.0.0.1:5151). Falls back to config or prompt.
        #[arg(long)]
        server: Option<String>,
        /// Discord user id (snowflake). Falls back to prompt.
        #[arg(long)]
        discord_id: Option<String>,
        /// Discord username. Falls back to prompt.
        #[arg(long)]
        username: Option<String>,
        /// Referral code, honoured only when the account is new
        #[arg(long)]
        referral_code: Option<String>,
    },
    /// Run the mining node until interrupted
    Mine,
    /// Show balances, the open session and the anti-cheat verdict
    Status,
    /// List tasks with progress
    Tasks,
    /// Claim a completed task
    Claim {
        task_id: String,
    },
    /// Redeem a referral code
    Redeem {
        code: String,
    },
    /// Show settings, or change them with the flags below
    Settings {
        #[arg(long)]
        show_on_leaderboard: Option<bool>,
        /// dark, light or system
        #[arg(long)]
        theme: Option<String>,
        /// low, balanced or high
        #[arg(long)]
        intensity: Option<String>,
        #[arg(long)]
        auto_start: Option<bool>,
    },
}
