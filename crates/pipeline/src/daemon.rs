//! Fixed-delay re-invocation loop.
//!
//! Runs one pass, sleeps the full interval, runs again. The delay starts
//! when a pass finishes, so passes never overlap however long one takes.
//! Shutdown wins the race against the sleep; an in-flight pass still honors
//! its own between-account check.

use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

pub async fn run_fixed_delay<F, Fut>(
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
    mut pass: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    info!(interval_secs = interval.as_secs(), "Daemon started");
    let mut passes: u64 = 0;

    loop {
        pass().await;
        passes += 1;
        info!(passes = passes, "Pass complete, sleeping");

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.recv() => {
                info!("Daemon shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_shutdown_ends_loop_after_current_pass() {
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = count.clone();
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(run_fixed_delay(
            Duration::from_secs(3600),
            rx,
            move || {
                let count = count_clone.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                }
            },
        ));

        // Give the first pass a moment, then signal.
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("daemon did not stop")
            .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
