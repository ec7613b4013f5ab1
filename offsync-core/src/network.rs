//! Connectivity tracking.
//!
//! [`NetworkMonitor`] holds the last known reachability and notifies
//! subscribers only when it flips. It can be fed by the host platform through
//! [`NetworkMonitor::set_online`] or by a background [`ConnectivityProbe`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Timeout for a single reachability check.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Point-in-time reachability check.
pub trait ConnectivityProbe: Send + Sync + 'static {
    fn probe(&self) -> impl Future<Output = bool> + Send;
}

/// Checks reachability with `GET {server_url}/health`.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    health_url: String,
}

impl HttpProbe {
    pub fn new(server_url: &str) -> Self {
        let base_url = if !server_url.starts_with("http://") && !server_url.starts_with("https://")
        {
            format!("http://{}", server_url)
        } else {
            server_url.to_string()
        };

        Self {
            client: reqwest::Client::new(),
            health_url: format!("{}/health", base_url.trim_end_matches('/')),
        }
    }

    pub fn health_url(&self) -> &str {
        &self.health_url
    }
}

impl ConnectivityProbe for HttpProbe {
    async fn probe(&self) -> bool {
        match self
            .client
            .get(&self.health_url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("reachability check failed: {}", e);
                false
            }
        }
    }
}

/// Tracks online/offline state and broadcasts transitions.
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl NetworkMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        Self { tx: Arc::new(tx) }
    }

    pub fn currently_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Records the current reachability. Returns true if it flipped.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
        if changed {
            if online {
                tracing::info!("network: became online");
            } else {
                tracing::warn!("network: became offline");
            }
        }
        changed
    }

    /// Receiver that wakes on every connectivity change.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Polls `probe` every `interval` and records the result.
    ///
    /// The first check runs immediately. Abort the handle to stop polling.
    pub fn spawn_probe<P: ConnectivityProbe>(&self, probe: P, interval: Duration) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let online = probe.probe().await;
                monitor.set_online(online);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FlagProbe {
        online: Arc<AtomicBool>,
        calls: Arc<AtomicUsize>,
    }

    impl ConnectivityProbe for FlagProbe {
        async fn probe(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.online.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_set_online_reports_flips_only() {
        let monitor = NetworkMonitor::new(false);

        assert!(!monitor.set_online(false));
        assert!(monitor.set_online(true));
        assert!(monitor.currently_online());
        assert!(!monitor.set_online(true));
        assert!(monitor.set_online(false));
        assert!(!monitor.currently_online());
    }

    #[tokio::test]
    async fn test_subscribers_wake_on_change() {
        let monitor = NetworkMonitor::new(false);
        let mut rx = monitor.subscribe();

        monitor.set_online(true);

        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());

        // Repeated value does not wake
        monitor.set_online(true);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_probe_feeds_monitor() {
        let monitor = NetworkMonitor::new(false);
        let online = Arc::new(AtomicBool::new(true));
        let calls = Arc::new(AtomicUsize::new(0));
        let mut rx = monitor.subscribe();

        let handle = monitor.spawn_probe(
            FlagProbe {
                online: online.clone(),
                calls: calls.clone(),
            },
            Duration::from_secs(5),
        );

        rx.changed().await.unwrap();
        assert!(monitor.currently_online());

        online.store(false, Ordering::SeqCst);
        rx.changed().await.unwrap();
        assert!(!monitor.currently_online());
        assert!(calls.load(Ordering::SeqCst) >= 2);

        handle.abort();
    }

    #[test]
    fn test_health_url() {
        assert_eq!(
            HttpProbe::new("http://localhost:8080/").health_url(),
            "http://localhost:8080/health"
        );
        assert_eq!(
            HttpProbe::new("localhost:8080").health_url(),
            "http://localhost:8080/health"
        );
    }
}
