//! Tiered wait for the capture signal.
//!
//! The policy is an explicit ordered table of (label, duration) tiers raced
//! against the interceptor's single-shot signal, not nested ad hoc timers.
//! Headless sessions get the first tier only; the second, longer tier
//! allows manual interaction at a visible browser.

use crate::cdp::CdpClient;
use crate::intercept::TokenCapture;
use beartrap_core::config::WaitConfig;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTier {
    pub label: &'static str,
    pub duration: Duration,
}

/// The tier table for one session.
pub fn tiers(config: &WaitConfig, headless: bool) -> Vec<WaitTier> {
    let mut tiers = vec![WaitTier {
        label: "network",
        duration: Duration::from_secs(config.first_tier_secs),
    }];
    if !headless {
        tiers.push(WaitTier {
            label: "manual",
            duration: Duration::from_secs(config.second_tier_secs),
        });
    }
    tiers
}

/// Wait for a token according to the tier table. Returns immediately when
/// the login flow already produced a capture.
pub async fn await_token(
    cdp: &CdpClient,
    capture: &TokenCapture,
    config: &WaitConfig,
    headless: bool,
) -> Option<String> {
    if let Some(token) = capture.captured_token() {
        debug!("Token already captured during login");
        return Some(token);
    }

    settle_network(cdp, config.idle_settle_secs).await;
    provoke_requests(cdp).await;

    let mut rx = capture.subscribe();
    for tier in tiers(config, headless) {
        info!(tier = tier.label, bound_secs = tier.duration.as_secs(), "Waiting for token");
        match tokio::time::timeout(tier.duration, recv_token(&mut rx)).await {
            Ok(Some(token)) => return Some(token),
            Ok(None) => return None, // signal source gone, nothing more will arrive
            Err(_) => debug!(tier = tier.label, "Tier expired without capture"),
        }
    }
    None
}

async fn recv_token(rx: &mut watch::Receiver<Option<String>>) -> Option<String> {
    loop {
        if let Some(token) = rx.borrow().clone() {
            return Some(token);
        }
        if rx.changed().await.is_err() {
            return rx.borrow().clone();
        }
    }
}

/// Bounded attempt to let in-flight requests drain; a timeout is fine.
async fn settle_network(cdp: &CdpClient, bound_secs: u64) {
    let script = format!(
        r#"(async () => {{
            const bound = {bound_ms};
            const idleMs = 1000;
            const interval = 250;
            const start = Date.now();
            let last = 0;
            let stable = 0;
            try {{ last = performance.getEntriesByType('resource').length; }} catch (_) {{}}
            while (Date.now() - start < bound) {{
                await new Promise(r => setTimeout(r, interval));
                let count = last;
                try {{ count = performance.getEntriesByType('resource').length; }} catch (_) {{}}
                if (count === last) {{
                    stable += interval;
                    if (stable >= idleMs) return true;
                }} else {{
                    stable = 0;
                    last = count;
                }}
            }}
            return false;
        }})()"#,
        bound_ms = bound_secs * 1000,
    );

    let bound = Duration::from_secs(bound_secs + 2);
    match tokio::time::timeout(bound, cdp.evaluate_js(&script)).await {
        Ok(Ok(_)) => debug!("Network settled"),
        Ok(Err(e)) => debug!("Network settle probe failed: {}", e),
        Err(_) => debug!("Network settle bound expired"),
    }
}

/// One benign interaction to provoke lazily issued API calls.
async fn provoke_requests(cdp: &CdpClient) {
    if let Err(e) = cdp.evaluate_js("window.scrollBy(0, 400)").await {
        debug!("Scroll provocation failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WaitConfig {
        WaitConfig {
            idle_settle_secs: 1,
            first_tier_secs: 30,
            second_tier_secs: 180,
        }
    }

    #[test]
    fn test_headless_gets_single_tier() {
        let table = tiers(&config(), true);
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].label, "network");
    }

    #[test]
    fn test_interactive_gets_escalating_tiers() {
        let table = tiers(&config(), false);
        assert_eq!(table.len(), 2);
        assert!(table[1].duration > table[0].duration);
    }

    #[tokio::test]
    async fn test_recv_token_sees_existing_value() {
        let (tx, mut rx) = watch::channel(Some("T1".to_string()));
        drop(tx);
        assert_eq!(recv_token(&mut rx).await, Some("T1".to_string()));
    }

    #[tokio::test]
    async fn test_recv_token_sees_late_value() {
        let (tx, mut rx) = watch::channel(None::<String>);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = tx.send(Some("T2".to_string()));
        });
        assert_eq!(recv_token(&mut rx).await, Some("T2".to_string()));
    }

    #[tokio::test]
    async fn test_recv_token_none_when_sender_gone() {
        let (tx, mut rx) = watch::channel(None::<String>);
        drop(tx);
        assert_eq!(recv_token(&mut rx).await, None);
    }
}
