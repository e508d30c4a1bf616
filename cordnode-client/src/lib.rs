pub mod agent;
pub mod anticheat;
pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod login;
pub mod mining;
pub mod notify;
pub mod remote;
#[cfg(test)]
mod testing;

pub use cli::{Cli, Command};
pub use config::{ClientConfig, load_config, resolve_config_path};

use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid state: {0}")]
    State(String),
}

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

pub async fn run(cli: Cli) -> Result<(), AppError> {
    init_tracing();

    let command = cli.command.unwrap_or(Command::Mine);
    if let Command::Login {
        server,
        discord_id,
        username,
        referral_code,
    } = command
    {
        return login::login(
            login::LoginArgs {
                server,
                discord_id,
                username,
                referral_code,
            },
            cli.config,
        )
        .await;
    }

    let (cfg_path, cfg) = ClientConfig::find_and_load(cli.config)?;
    info!(path=?cfg_path, user_id=%cfg.user_id, "loaded config");

    match command {
        Command::Login { .. } => Ok(()),
        Command::Mine => agent::run(cfg).await,
        Command::Status => commands::status(&cfg).await,
        Command::Tasks => commands::tasks(&cfg).await,
        Command::Claim { task_id } => commands::claim(&cfg, &task_id).await,
        Command::Redeem { code } => commands::redeem(&cfg, &code).await,
        Command::Settings {
            show_on_leaderboard,
            theme,
            intensity,
            auto_start,
        } => {
            commands::settings(
                &cfg,
                commands::SettingsChange {
                    show_on_leaderboard,
                    theme,
                    intensity,
                    auto_start,
                },
            )
            .await
        }
    }
}
