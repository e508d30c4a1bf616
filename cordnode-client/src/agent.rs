use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::AppError;
use crate::cache::SessionCache;
use crate::config::ClientConfig;
use crate::mining::{MiningNode, MiningState};
use crate::notify::{self, NotificationCenter};
use crate::remote::{LedgerApi, RestLedger};

/// Runs the mining node until a shutdown signal arrives or the server
/// closes the session.
pub async fn run(cfg: ClientConfig) -> Result<(), AppError> {
    let cache_path = cfg.resolved_cache_path()?;
    let cache = match SessionCache::load(&cache_path) {
        Ok(c) => c,
        Err(e) => {
            warn!(error=%e, path=%cache_path.display(), "session cache unreadable; starting fresh");
            SessionCache::default()
        }
    };

    let api: Arc<dyn LedgerApi> = Arc::new(RestLedger::new(cfg.base_url()));
    let notices = NotificationCenter::new(notify::default_backend());
    let node = MiningNode::new(api.clone(), cfg.user_id.clone(), cfg.mining, notices);
    if let Some(unsent) = cache.unsent_for(&cfg.user_id) {
        node.carry_over(unsent).await;
    }

    node.start().await?;

    let cancel = CancellationToken::new();
    let cancel_child = cancel.child_token();
    let node_cloned = node.clone();
    let api_cloned = api.clone();
    let user_id = cfg.user_id.clone();
    let sync_every = cfg.mining.sync();
    let mut handle = tokio::spawn(async move {
        sync_loop(
            cancel_child,
            node_cloned,
            api_cloned,
            user_id,
            sync_every,
            cache_path,
            cache,
        )
        .await
    });

    let finished = tokio::select! {
        _ = shutdown_signal() => {
            info!("shutdown signal received; stopping node");
            cancel.cancel();
            None
        }
        res = &mut handle => {
            info!("node stopped by server");
            Some(res)
        }
    };

    if let Err(e) = node.flush_now().await {
        warn!(error=%e, "flush before shutdown failed; end will reconcile");
    }
    let stopped = node.stop().await;
    // still active means the server could not be reached; keep the rest on disk
    let unsent = if node.state().await == MiningState::Active {
        node.detach().await
    } else {
        None
    };

    let cache = match finished {
        Some(res) => res.ok(),
        None => tokio::time::timeout(Duration::from_secs(3), handle)
            .await
            .ok()
            .and_then(Result::ok),
    };
    let mut cache = match cache {
        Some(c) => c,
        None => cfg
            .resolved_cache_path()
            .ok()
            .and_then(|p| SessionCache::load(&p).ok())
            .unwrap_or_default(),
    };
    cache.record(&node.snapshot().await);
    if let Some(unsent) = unsent {
        warn!(
            session_id = unsent.session_id,
            pending = unsent.pending,
            in_flight = ?unsent.in_flight,
            "server unreachable; unsent earnings kept for the next run"
        );
        cache.keep_unsent(unsent);
    }
    save_cache(&cfg, &cache);

    match stopped {
        Ok(resp) => {
            info!(
                session_id = resp.session.id,
                earnings = resp.session.earnings,
                balance = resp.current_balance,
                "session closed"
            );
            Ok(())
        }
        Err(AppError::State(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Mirrors the node into the session cache and reconciles with the server
/// on a slow cadence. Exits when cancelled or when the node has stopped.
async fn sync_loop(
    cancel: CancellationToken,
    node: MiningNode,
    api: Arc<dyn LedgerApi>,
    user_id: String,
    every: Duration,
    cache_path: PathBuf,
    mut cache: SessionCache,
) -> SessionCache {
    let mut failures: u32 = 0;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(every) => {}
        }

        let snap = node.snapshot().await;
        if snap.session_id.is_none() {
            debug!("node no longer has a session; leaving sync loop");
            break;
        }
        match api.user(&user_id).await {
            Ok(u) => {
                failures = 0;
                cache.reconcile(&u);
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                error!(error=%e, failures, "user refresh failed");
            }
        }
        cache.record(&snap);
        if let Err(e) = cache.save(&cache_path) {
            warn!(error=%e, path=%cache_path.display(), "session cache write failed");
        }
        info!(
            earned = snap.display_total,
            unconfirmed = snap.unconfirmed,
            efficiency = snap.efficiency,
            "mining"
        );
    }
    cache
}

fn save_cache(cfg: &ClientConfig, cache: &SessionCache) {
    match cfg.resolved_cache_path() {
        Ok(p) => {
            if let Err(e) = cache.save(&p) {
                warn!(error=%e, "session cache write failed");
            }
        }
        Err(e) => warn!(error=%e, "no session cache path"),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let (Ok(mut sigint), Ok(mut sigterm)) = (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) else {
            warn!("shutdown: unix signal handlers unavailable, using Ctrl+C");
            let _ = tokio::signal::ctrl_c().await;
            return;
        };
        tokio::select! {
            _ = sigint.recv() => {
                info!("shutdown: received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("shutdown: received SIGTERM");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown: received Ctrl+C");
    }
}
