//! Network observation: first-wins bearer capture and best-effort usage
//! metadata extraction.
//!
//! Attached before the first navigation so early calls are not missed. The
//! capture signal is single-shot: the first request to the API host bearing
//! an Authorization credential resolves it, every later match in the same
//! session is discarded. The usage channel is independent and never blocks
//! the capture.

use crate::cdp::CdpClient;
use beartrap_core::config::TargetConfig;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, trace};

#[derive(Debug, Default, Clone)]
struct UsageState {
    credits: Option<f64>,
    tier: Option<String>,
}

/// Handle over the two observer tasks. Dropping it detaches both, so no
/// listener leaks into the next account's session.
pub struct TokenCapture {
    token_rx: watch::Receiver<Option<String>>,
    usage: Arc<Mutex<UsageState>>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl TokenCapture {
    /// Register both observers on the session. Must run before navigation.
    pub async fn attach(cdp: &Arc<CdpClient>, target: &TargetConfig) -> Self {
        let (token_tx, token_rx) = watch::channel(None::<String>);
        let usage = Arc::new(Mutex::new(UsageState::default()));

        let mut request_rx = cdp.subscribe_event("Network.requestWillBeSent").await;
        let api_host = target.api_host.clone();
        let request_task = tokio::spawn(async move {
            let mut captured = false;
            while let Some(params) = request_rx.recv().await {
                if captured {
                    // First-wins: the signal has fired, later matches are
                    // discarded, not merged.
                    trace!("Ignoring post-capture request event");
                    continue;
                }
                if let Some(token) = bearer_from_request(&params, &api_host) {
                    debug!("Captured bearer credential");
                    captured = true;
                    let _ = token_tx.send(Some(token));
                }
            }
        });

        let mut response_rx = cdp.subscribe_event("Network.responseReceived").await;
        let usage_path = target.usage_path.clone();
        let usage_clone = usage.clone();
        let cdp_clone = cdp.clone();
        let response_task = tokio::spawn(async move {
            while let Some(params) = response_rx.recv().await {
                let Some(request_id) = usage_request_id(&params, &usage_path) else {
                    continue;
                };
                // Best-effort: a missing or malformed body is swallowed.
                match cdp_clone.get_response_body(&request_id).await {
                    Ok(body) => {
                        if let Some((credits, tier)) = usage_from_body(&body) {
                            debug!(credits = ?credits, tier = ?tier, "Captured usage metadata");
                            let mut state = usage_clone.lock().unwrap_or_else(|e| e.into_inner());
                            if credits.is_some() {
                                state.credits = credits;
                            }
                            if tier.is_some() {
                                state.tier = tier;
                            }
                        }
                    }
                    Err(e) => debug!("Usage body unavailable: {}", e),
                }
            }
        });

        Self {
            token_rx,
            usage,
            tasks: vec![request_task, response_task],
        }
    }

    /// The captured token, if the signal already fired.
    pub fn captured_token(&self) -> Option<String> {
        self.token_rx.borrow().clone()
    }

    /// A receiver for the single-shot capture signal, for racing against
    /// timeouts.
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.token_rx.clone()
    }

    /// Whatever usage metadata has been observed so far.
    pub fn usage(&self) -> (Option<f64>, Option<String>) {
        let state = self.usage.lock().unwrap_or_else(|e| e.into_inner());
        (state.credits, state.tier.clone())
    }

    /// Abort the observer tasks. Also happens on drop.
    pub fn detach(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for TokenCapture {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Extract a bearer credential from a `Network.requestWillBeSent` event when
/// the request targets the API host.
fn bearer_from_request(params: &Value, api_host: &str) -> Option<String> {
    let request = params.get("request")?;
    let url = request.get("url")?.as_str()?;
    if !url.contains(api_host) {
        return None;
    }

    let headers = request.get("headers")?.as_object()?;
    let auth = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("authorization"))
        .and_then(|(_, v)| v.as_str())?;

    let token = auth.strip_prefix("Bearer ").or_else(|| auth.strip_prefix("bearer "))?;
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

/// Request id of a successful usage/quota response, or None.
fn usage_request_id(params: &Value, usage_path: &str) -> Option<String> {
    let response = params.get("response")?;
    let url = response.get("url")?.as_str()?;
    if !url.contains(usage_path) {
        return None;
    }
    let status = response.get("status")?.as_u64()?;
    if !(200..300).contains(&status) {
        return None;
    }
    params
        .get("requestId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Pull a numeric quota figure and an optional tier label out of a usage
/// payload. The schema is not ours, so accept the common spellings and
/// ignore everything else.
fn usage_from_body(body: &str) -> Option<(Option<f64>, Option<String>)> {
    let value: Value = serde_json::from_str(body).ok()?;
    let root = value.get("data").filter(|d| d.is_object()).unwrap_or(&value);

    let credits = ["credits", "balance", "remaining"]
        .iter()
        .find_map(|k| root.get(*k).and_then(|v| v.as_f64()));
    let tier = ["tier", "plan", "level"]
        .iter()
        .find_map(|k| root.get(*k).and_then(|v| v.as_str()))
        .map(|s| s.to_string());

    if credits.is_none() && tier.is_none() {
        return None;
    }
    Some((credits, tier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request_event(url: &str, auth: Option<&str>) -> Value {
        let mut headers = serde_json::Map::new();
        if let Some(a) = auth {
            headers.insert("Authorization".to_string(), json!(a));
        }
        json!({
            "requestId": "r1",
            "request": { "url": url, "headers": headers }
        })
    }

    #[test]
    fn test_bearer_extraction() {
        let event = request_event("https://api.lumina.chat/v1/chat", Some("Bearer abc123"));
        assert_eq!(
            bearer_from_request(&event, "api.lumina.chat"),
            Some("abc123".to_string())
        );
    }

    #[test]
    fn test_bearer_requires_api_host() {
        let event = request_event("https://cdn.lumina.chat/app.js", Some("Bearer abc123"));
        assert_eq!(bearer_from_request(&event, "api.lumina.chat"), None);
    }

    #[test]
    fn test_bearer_requires_prefix() {
        let event = request_event("https://api.lumina.chat/v1/chat", Some("Basic dXNlcg=="));
        assert_eq!(bearer_from_request(&event, "api.lumina.chat"), None);
        let event = request_event("https://api.lumina.chat/v1/chat", None);
        assert_eq!(bearer_from_request(&event, "api.lumina.chat"), None);
    }

    #[test]
    fn test_header_name_case_insensitive() {
        let event = json!({
            "request": {
                "url": "https://api.lumina.chat/v1/chat",
                "headers": { "authorization": "Bearer xyz" }
            }
        });
        assert_eq!(
            bearer_from_request(&event, "api.lumina.chat"),
            Some("xyz".to_string())
        );
    }

    #[tokio::test]
    async fn test_first_observation_wins() {
        // Drive the same single-shot logic the request task runs.
        let (tx, rx) = watch::channel(None::<String>);
        let events = vec![
            request_event("https://api.lumina.chat/v1/a", Some("Bearer FIRST")),
            request_event("https://api.lumina.chat/v1/b", Some("Bearer SECOND")),
        ];
        let mut captured = false;
        for event in &events {
            if captured {
                continue;
            }
            if let Some(token) = bearer_from_request(event, "api.lumina.chat") {
                captured = true;
                let _ = tx.send(Some(token));
            }
        }
        assert_eq!(rx.borrow().as_deref(), Some("FIRST"));
    }

    #[test]
    fn test_usage_response_filter() {
        let event = json!({
            "requestId": "r7",
            "response": { "url": "https://api.lumina.chat/api/v1/credits", "status": 200 }
        });
        assert_eq!(
            usage_request_id(&event, "/api/v1/credits"),
            Some("r7".to_string())
        );

        let failed = json!({
            "requestId": "r8",
            "response": { "url": "https://api.lumina.chat/api/v1/credits", "status": 401 }
        });
        assert_eq!(usage_request_id(&failed, "/api/v1/credits"), None);

        let other = json!({
            "requestId": "r9",
            "response": { "url": "https://api.lumina.chat/v1/chat", "status": 200 }
        });
        assert_eq!(usage_request_id(&other, "/api/v1/credits"), None);
    }

    #[test]
    fn test_usage_body_parsing() {
        assert_eq!(
            usage_from_body(r#"{"credits": 42.5, "tier": "pro"}"#),
            Some((Some(42.5), Some("pro".to_string())))
        );
        assert_eq!(
            usage_from_body(r#"{"data": {"balance": 10, "plan": "free"}}"#),
            Some((Some(10.0), Some("free".to_string())))
        );
        // Malformed or unrelated bodies are swallowed.
        assert_eq!(usage_from_body("not json"), None);
        assert_eq!(usage_from_body(r#"{"unrelated": true}"#), None);
    }
}
