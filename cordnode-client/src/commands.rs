//! One-shot subcommands that talk to the ledger and print the result.

use cordnode_shared::api::{self, rest::RestError};
use cordnode_shared::domain::{MiningIntensity, Theme};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::AppError;
use crate::cache::SessionCache;
use crate::config::ClientConfig;
use crate::notify::{self, NoticeKind, NotificationCenter};

fn http(what: &str) -> impl FnOnce(RestError) -> AppError + '_ {
    move |e| AppError::Http(format!("{what} failed: {e}"))
}

pub async fn status(cfg: &ClientConfig) -> Result<(), AppError> {
    let base = cfg.base_url();
    let user = api::rest::get_user(&base, &cfg.user_id)
        .await
        .map_err(http("fetch user"))?;
    let session = api::rest::current_mining(&base, &cfg.user_id)
        .await
        .map_err(http("fetch session"))?;

    println!(
        "{}  {}x  (account age {:.1} years)",
        user.username, user.multiplier, user.account_age_years
    );
    println!("balance       {:.4} CORD", user.current_balance);
    println!("total earned  {:.4}", user.total_earned);
    println!("this week     {:.4}", user.weekly_earnings);
    println!("this month    {:.4}", user.monthly_earnings);
    println!(
        "referrals     {} ({:.4} earned), code {}",
        user.total_referrals, user.referral_earnings, user.referral_code
    );
    match &session {
        Some(s) => println!(
            "session #{}   started {}, {:.4} earned",
            s.id, s.start_time, s.earnings
        ),
        None => println!("session       none"),
    }
    match api::rest::anti_cheat_check(&base, &cfg.user_id).await {
        Ok(ac) => println!(
            "efficiency    {:.0}% ({} other account(s) on your network)",
            ac.efficiency_multiplier * 100.0,
            ac.other_accounts
        ),
        Err(e) => warn!(error=%e, "anti-cheat check failed"),
    }

    if let Ok(path) = cfg.resolved_cache_path() {
        let mut cache = SessionCache::load(&path).unwrap_or_default();
        cache.reconcile(&user);
        if let Err(e) = cache.save(&path) {
            warn!(error=%e, "session cache write failed");
        }
    }
    Ok(())
}

pub async fn tasks(cfg: &ClientConfig) -> Result<(), AppError> {
    let rows = api::rest::user_tasks(&cfg.base_url(), &cfg.user_id)
        .await
        .map_err(http("fetch tasks"))?;
    for t in rows {
        let mark = if t.completed {
            "done"
        } else if t.claimable {
            "ready"
        } else {
            ""
        };
        println!(
            "{:<20} {:<12} {:>3}/{:<3} {:>8.2}  {:<5} {}",
            t.task.id,
            t.task.task_type.as_str(),
            t.progress,
            t.task.max_progress,
            t.task.reward,
            mark,
            t.task.title
        );
    }
    Ok(())
}

pub async fn claim(cfg: &ClientConfig, task_id: &str) -> Result<(), AppError> {
    let base = cfg.base_url();
    let notices = NotificationCenter::new(notify::default_backend());
    let res = api::rest::complete_task(
        &base,
        &cfg.user_id,
        task_id,
        &api::CompleteTaskReq::default(),
    )
    .await;
    match res {
        Ok(resp) => {
            notices
                .push(
                    NoticeKind::Success,
                    "Task complete",
                    format!(
                        "+{:.2} CORD, balance {:.2}",
                        resp.reward.unwrap_or_default(),
                        resp.new_balance.unwrap_or_default()
                    ),
                )
                .await;
            Ok(())
        }
        Err(e) => match e.reason().as_deref() {
            Some(reason @ ("already_completed" | "check_in_claimed")) => {
                let msg = if reason == "check_in_claimed" {
                    "Today's check-in is already claimed."
                } else {
                    "This task was already completed."
                };
                notices.push(NoticeKind::Info, "Nothing to claim", msg).await;
                let user = api::rest::get_user(&base, &cfg.user_id)
                    .await
                    .map_err(http("refresh user"))?;
                println!("balance {:.4} CORD", user.current_balance);
                Ok(())
            }
            Some("not_eligible") => {
                notices
                    .push(
                        NoticeKind::Warning,
                        "Not yet",
                        format!("{task_id} is not complete yet."),
                    )
                    .await;
                Err(AppError::Http(format!("claim rejected: {e}")))
            }
            _ => Err(http("claim")(e)),
        },
    }
}

pub async fn redeem(cfg: &ClientConfig, code: &str) -> Result<(), AppError> {
    let base = cfg.base_url();
    let notices = NotificationCenter::new(notify::default_backend());
    let res = api::rest::redeem_referral(
        &base,
        &cfg.user_id,
        &api::RedeemReferralReq {
            code: code.to_string(),
        },
    )
    .await;
    match res {
        Ok(r) => {
            notices
                .push(
                    NoticeKind::Success,
                    "Referral applied",
                    format!("Welcome bonus {:.2} CORD", r.welcome_bonus),
                )
                .await;
            Ok(())
        }
        Err(e) if e.reason().as_deref() == Some("already_referred") => {
            notices
                .push(
                    NoticeKind::Info,
                    "Referral already used",
                    "Your account already has a referrer.",
                )
                .await;
            Ok(())
        }
        Err(e) => Err(http("redeem")(e)),
    }
}

pub struct SettingsChange {
    pub show_on_leaderboard: Option<bool>,
    pub theme: Option<String>,
    pub intensity: Option<String>,
    pub auto_start: Option<bool>,
}

impl SettingsChange {
    fn is_empty(&self) -> bool {
        self.show_on_leaderboard.is_none()
            && self.theme.is_none()
            && self.intensity.is_none()
            && self.auto_start.is_none()
    }

    fn apply(self, s: &mut api::SettingsDto) -> Result<(), AppError> {
        if let Some(v) = self.show_on_leaderboard {
            s.privacy.show_on_leaderboard = v;
        }
        if let Some(t) = self.theme {
            s.display.theme = parse_option::<Theme>("theme", &t)?;
        }
        if let Some(i) = self.intensity {
            s.mining.intensity = parse_option::<MiningIntensity>("intensity", &i)?;
        }
        if let Some(v) = self.auto_start {
            s.mining.auto_start = v;
        }
        Ok(())
    }
}

fn parse_option<T: DeserializeOwned>(name: &str, raw: &str) -> Result<T, AppError> {
    serde_json::from_value(serde_json::Value::String(raw.trim().to_lowercase()))
        .map_err(|_| AppError::Config(format!("unknown {name}: {raw}")))
}

pub async fn settings(cfg: &ClientConfig, change: SettingsChange) -> Result<(), AppError> {
    let base = cfg.base_url();
    let mut current = api::rest::get_settings(&base, &cfg.user_id)
        .await
        .map_err(http("fetch settings"))?;
    if !change.is_empty() {
        change.apply(&mut current)?;
        current = api::rest::put_settings(&base, &cfg.user_id, &current)
            .await
            .map_err(http("save settings"))?;
    }
    let text = serde_yaml::to_string(&current)
        .map_err(|e| AppError::Config(format!("serialize settings failed: {e}")))?;
    print!("{text}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_change_applies_known_options() {
        let mut s = api::SettingsDto::default();
        SettingsChange {
            show_on_leaderboard: Some(false),
            theme: Some("Light".into()),
            intensity: Some("high".into()),
            auto_start: None,
        }
        .apply(&mut s)
        .unwrap();
        assert!(!s.privacy.show_on_leaderboard);
        assert_eq!(s.display.theme, Theme::Light);
        assert_eq!(s.mining.intensity, MiningIntensity::High);
        assert!(!s.mining.auto_start);
    }

    #[test]
    fn unknown_option_is_a_config_error() {
        let mut s = api::SettingsDto::default();
        let res = SettingsChange {
            show_on_leaderboard: None,
            theme: Some("neon".into()),
            intensity: None,
            auto_start: None,
        }
        .apply(&mut s);
        assert!(matches!(res, Err(AppError::Config(_))));
        assert_eq!(s, api::SettingsDto::default());
    }
}
