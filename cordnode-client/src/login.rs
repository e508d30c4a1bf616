use std::io::{self, Write};
use std::path::PathBuf;

use cordnode_shared::api;

use crate::AppError;
use crate::config::{ClientConfig, MiningTiming, load_config, resolve_config_path};

pub struct LoginArgs {
    pub server: Option<String>,
    pub discord_id: Option<String>,
    pub username: Option<String>,
    pub referral_code: Option<String>,
}

pub async fn login(args: LoginArgs, cfg_path_opt: Option<PathBuf>) -> Result<(), AppError> {
    let existing = resolve_config_path(cfg_path_opt.clone())
        .ok()
        .and_then(|p| load_config(&p).ok());

    let server_url = match args.server {
        Some(s) => crate::config::normalize_server_url(&s),
        None => match &existing {
            Some(cfg) => cfg.base_url(),
            None => {
                crate::config::normalize_server_url(&prompt("Server URL (e.g., 127.0.0.1:5151): ")?)
            }
        },
    };
    let discord_id = match args.discord_id {
        Some(d) => d,
        None => prompt("Discord user id: ")?,
    };
    let username = match args.username {
        Some(u) => u,
        None => prompt("Discord username: ")?,
    };

    let req = api::CreateUserReq {
        discord_id,
        username,
        discriminator: None,
        avatar: None,
        account_created_at_ms: None,
        referral_code: args.referral_code.filter(|c| !c.trim().is_empty()),
    };
    let resp = api::rest::login_user(&server_url, &req)
        .await
        .map_err(|e| AppError::Http(format!("login failed: {e}")))?;

    let cfg = ClientConfig {
        server_url: server_url.clone(),
        user_id: resp.user.id.clone(),
        mining: existing
            .as_ref()
            .map(|c| c.mining)
            .unwrap_or_else(MiningTiming::default),
        cache_path: existing.and_then(|c| c.cache_path),
    };
    let path = resolve_config_path(cfg_path_opt)?;
    crate::config::save_config(&path, &cfg)?;

    let verb = if resp.created {
        "Created"
    } else {
        "Signed in as"
    };
    println!(
        "{verb} {} ({}x multiplier, account age {:.1} years)",
        resp.user.username, resp.user.multiplier, resp.user.account_age_years
    );
    if let Some(r) = &resp.referral {
        println!("Referral applied: welcome bonus {:.2} CORD", r.welcome_bonus);
    }
    if let Some(reason) = &resp.referral_error {
        println!("Referral code not applied: {reason}");
    }
    println!("Wrote config to {}", path.display());
    Ok(())
}

fn prompt(msg: &str) -> Result<String, AppError> {
    print!("{}", msg);
    io::stdout().flush().ok();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).map_err(AppError::Io)?;
    Ok(buf.trim().to_string())
}
