//! Reload notification seam

use crate::NotifyError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Notifier asks the proxy to reload its dispatcher list.
///
/// Success means the request was sent; the proxy does not acknowledge it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self) -> Result<(), NotifyError>;
}

/// Send one more reload request after `delay`.
///
/// The proxy may not be listening yet when the startup notification goes
/// out, and a sent datagram gives no sign of that. This is a best-effort
/// follow-up and runs at most once; it is dropped if `cancel` fires first.
pub fn schedule_renotify(
    notifier: Arc<dyn Notifier>,
    delay: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Follow-up reload notification cancelled");
            }
            _ = tokio::time::sleep(delay) => {
                match notifier.notify().await {
                    Ok(()) => debug!("Sent follow-up reload notification"),
                    Err(e) => warn!("Follow-up reload notification failed: {}", e),
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingNotifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn notify(&self) -> Result<(), NotifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_renotify_fires_once_after_delay() {
        let notifier = Arc::new(CountingNotifier::default());
        let handle = schedule_renotify(
            notifier.clone(),
            Duration::from_secs(60),
            CancellationToken::new(),
        );

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);

        handle.await.unwrap();
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_renotify_cancelled() {
        let notifier = Arc::new(CountingNotifier::default());
        let cancel = CancellationToken::new();
        let handle = schedule_renotify(notifier.clone(), Duration::from_secs(60), cancel.clone());

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);
    }
}
