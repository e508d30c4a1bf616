use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NoticeKind,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Presents a notification to the user. The queue does not care how.
#[async_trait]
pub trait NotificationBackend: Send + Sync {
    async fn show(&self, notice: &Notification);
}

/// Writes notifications to the log only.
#[derive(Debug, Default)]
pub struct LogBackend;

#[async_trait]
impl NotificationBackend for LogBackend {
    async fn show(&self, n: &Notification) {
        match n.kind {
            NoticeKind::Info | NoticeKind::Success => {
                info!(kind = ?n.kind, title = %n.title, "{}", n.message)
            }
            NoticeKind::Warning => warn!(title = %n.title, "{}", n.message),
            NoticeKind::Error => error!(title = %n.title, "{}", n.message),
        }
    }
}

/// Desktop popups via notify-rust; falls back to the log once the
/// notification daemon fails.
#[cfg(not(target_os = "windows"))]
#[derive(Debug, Default)]
pub struct DesktopBackend {
    degraded: std::sync::atomic::AtomicBool,
}

#[cfg(not(target_os = "windows"))]
#[async_trait]
impl NotificationBackend for DesktopBackend {
    async fn show(&self, n: &Notification) {
        use std::sync::atomic::Ordering;
        if !self.degraded.load(Ordering::Relaxed) {
            let urgency = match n.kind {
                NoticeKind::Error => notify_rust::Urgency::Critical,
                NoticeKind::Warning => notify_rust::Urgency::Normal,
                NoticeKind::Info | NoticeKind::Success => notify_rust::Urgency::Low,
            };
            let mut popup = notify_rust::Notification::new();
            let res = popup
                .appname("CordNode")
                .summary(&n.title)
                .body(&n.message)
                .urgency(urgency)
                .show_async()
                .await;
            match res {
                Ok(_) => {
                    debug!(title = %n.title, "desktop notification shown");
                    return;
                }
                Err(e) => {
                    warn!(error=%e, "notify-rust failed; downgrading to log notifications");
                    self.degraded.store(true, Ordering::Relaxed);
                }
            }
        }
        LogBackend.show(n).await;
    }
}

/// Default backend for the current platform.
pub fn default_backend() -> Arc<dyn NotificationBackend> {
    #[cfg(not(target_os = "windows"))]
    {
        Arc::new(DesktopBackend::default())
    }
    #[cfg(target_os = "windows")]
    {
        Arc::new(LogBackend)
    }
}

/// Bounded queue of recent notifications; each push is also shown through
/// the backend.
#[derive(Clone)]
pub struct NotificationCenter {
    queue: Arc<Mutex<VecDeque<Notification>>>,
    backend: Arc<dyn NotificationBackend>,
    capacity: usize,
}

impl NotificationCenter {
    pub fn new(backend: Arc<dyn NotificationBackend>) -> Self {
        Self::with_capacity(backend, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(backend: Arc<dyn NotificationBackend>, capacity: usize) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            backend,
            capacity: capacity.max(1),
        }
    }

    pub async fn push(
        &self,
        kind: NoticeKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Notification {
        let notice = Notification {
            id: Uuid::new_v4(),
            kind,
            title: title.into(),
            message: message.into(),
            timestamp: Utc::now(),
        };
        self.backend.show(&notice).await;
        let mut q = self.queue.lock().await;
        q.push_back(notice.clone());
        while q.len() > self.capacity {
            q.pop_front();
        }
        notice
    }

    /// Oldest first.
    pub async fn recent(&self) -> Vec<Notification> {
        self.queue.lock().await.iter().cloned().collect()
    }

    pub async fn dismiss(&self, id: Uuid) -> bool {
        let mut q = self.queue.lock().await;
        let before = q.len();
        q.retain(|n| n.id != id);
        q.len() != before
    }

    pub async fn drain(&self) -> Vec<Notification> {
        self.queue.lock().await.drain(..).collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Records what it was asked to show.
    #[derive(Default)]
    pub(crate) struct Recorder {
        pub shown: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl NotificationBackend for Recorder {
        async fn show(&self, n: &Notification) {
            self.shown.lock().await.push(n.clone());
        }
    }

    #[tokio::test]
    async fn push_shows_and_queues() {
        let rec = Arc::new(Recorder::default());
        let center = NotificationCenter::new(rec.clone());
        let n = center
            .push(NoticeKind::Success, "Task complete", "+15 CORD")
            .await;
        assert_eq!(rec.shown.lock().await.as_slice(), &[n.clone()]);
        assert_eq!(center.recent().await, vec![n]);
    }

    #[tokio::test]
    async fn queue_is_bounded_oldest_out() {
        let center = NotificationCenter::with_capacity(Arc::new(LogBackend), 2);
        center.push(NoticeKind::Info, "one", "").await;
        center.push(NoticeKind::Info, "two", "").await;
        center.push(NoticeKind::Info, "three", "").await;
        let titles: Vec<String> = center.recent().await.into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["two", "three"]);
    }

    #[tokio::test]
    async fn dismiss_and_drain() {
        let center = NotificationCenter::new(Arc::new(LogBackend));
        let a = center.push(NoticeKind::Warning, "a", "").await;
        center.push(NoticeKind::Error, "b", "").await;
        assert!(center.dismiss(a.id).await);
        assert!(!center.dismiss(a.id).await);
        let rest = center.drain().await;
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].kind, NoticeKind::Error);
        assert!(center.recent().await.is_empty());
    }
}
