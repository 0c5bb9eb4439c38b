// ABOUTME: Connectivity monitor that polls a reachability probe and requests a drain when the network comes back.
// ABOUTME: The default probe is a timed TCP connect to the delivery API host.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::worker::{DrainHandle, TriggerSource};

pub const DEFAULT_PROBE_ADDR: &str = "api.telegram.org:443";
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Answers "can we reach the delivery service right now?"
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Reports online when a TCP connection to `addr` opens within the timeout.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    addr: String,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ConnectivityProbe for TcpProbe {
    async fn is_online(&self) -> bool {
        matches!(
            tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr)).await,
            Ok(Ok(_))
        )
    }
}

/// Polls a probe and fires [`TriggerSource::ConnectivityRestored`] on every
/// offline to online transition. The first observation never fires; the
/// startup drain covers it.
pub struct ConnectivityMonitor {
    probe: Arc<dyn ConnectivityProbe>,
    interval: Duration,
}

impl ConnectivityMonitor {
    pub fn new(probe: Arc<dyn ConnectivityProbe>, interval: Duration) -> Self {
        Self { probe, interval }
    }

    /// Run until `shutdown` becomes true.
    pub fn spawn(self, handle: DrainHandle, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(handle, shutdown))
    }

    async fn run(self, handle: DrainHandle, mut shutdown: watch::Receiver<bool>) {
        let mut online = self.probe.is_online().await;
        tracing::info!(online, "connectivity monitor started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            let now_online = self.probe.is_online().await;
            if now_online && !online {
                tracing::info!("connectivity restored, requesting drain");
                handle.trigger(TriggerSource::ConnectivityRestored);
            } else if !now_online && online {
                tracing::info!("connectivity lost");
            }
            online = now_online;
        }
        tracing::debug!("connectivity monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use crate::worker::drain_channel;

    /// Probe that replays a fixed sequence, then repeats the last answer.
    struct SequenceProbe {
        answers: Mutex<VecDeque<bool>>,
        last: Mutex<bool>,
    }

    impl SequenceProbe {
        fn new(answers: &[bool]) -> Self {
            Self {
                answers: Mutex::new(answers.iter().copied().collect()),
                last: Mutex::new(false),
            }
        }
    }

    #[async_trait]
    impl ConnectivityProbe for SequenceProbe {
        async fn is_online(&self) -> bool {
            let mut last = self.last.lock().unwrap();
            if let Some(next) = self.answers.lock().unwrap().pop_front() {
                *last = next;
            }
            *last
        }
    }

    #[tokio::test]
    async fn fires_once_per_offline_to_online_edge() {
        let probe = Arc::new(SequenceProbe::new(&[false, false, true, true, false, true]));
        let (handle, mut rx) = drain_channel();
        let (shutdown_tx, shutdown) = watch::channel(false);
        let monitor = ConnectivityMonitor::new(probe, Duration::from_millis(5));
        let join = monitor.spawn(handle, shutdown);

        for _ in 0..2 {
            let request = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(request.source, TriggerSource::ConnectivityRestored);
        }
        let extra = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(extra.is_err(), "steady online state must not fire again");

        shutdown_tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(1), join)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn starting_online_does_not_fire() {
        let probe = Arc::new(SequenceProbe::new(&[true]));
        let (handle, mut rx) = drain_channel();
        let (shutdown_tx, shutdown) = watch::channel(false);
        let join = ConnectivityMonitor::new(probe, Duration::from_millis(5)).spawn(handle, shutdown);

        let fired = tokio::time::timeout(Duration::from_millis(60), rx.recv()).await;
        assert!(fired.is_err());

        shutdown_tx.send_replace(true);
        join.await.unwrap();
    }

    #[tokio::test]
    async fn tcp_probe_sees_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let up = TcpProbe::new(addr.to_string(), Duration::from_secs(1));
        assert!(up.is_online().await);

        drop(listener);
        let down = TcpProbe::new("127.0.0.1:1", Duration::from_millis(500));
        assert!(!down.is_online().await);
    }
}
