//! Low-level Chrome DevTools Protocol (CDP) client over WebSocket.
//!
//! Talks to one page target of a Chrome/Chromium instance via its debugging
//! WebSocket endpoint. Supports sending commands, receiving responses, and
//! fanning out events to subscribers.

use beartrap_core::{Error, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, warn};

/// A CDP WebSocket client bound to a single page target.
pub struct CdpClient {
    /// Sender to write messages to the WebSocket.
    ws_tx: mpsc::Sender<String>,
    /// Pending command responses, keyed by request ID.
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>,
    /// Auto-incrementing command ID.
    next_id: AtomicU64,
    /// Event listeners (domain.event -> channels).
    event_listeners: Arc<Mutex<HashMap<String, Vec<mpsc::Sender<Value>>>>>,
    /// Handle to the reader task so we can abort on close.
    _reader_handle: tokio::task::JoinHandle<()>,
    /// Handle to the writer task.
    _writer_handle: tokio::task::JoinHandle<()>,
}

impl CdpClient {
    /// Connect to a CDP WebSocket endpoint.
    pub async fn connect(ws_url: &str) -> Result<Self> {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::connect_async;
        use tokio_tungstenite::tungstenite::Message;

        let (ws_stream, _) = connect_async(ws_url).await.map_err(|e| {
            Error::Browser(format!("Failed to connect to CDP endpoint {}: {}", ws_url, e))
        })?;

        let (mut ws_sink, mut ws_stream_read) = ws_stream.split();

        // Channel for outgoing messages
        let (ws_tx, mut ws_rx) = mpsc::channel::<String>(256);

        // Pending responses
        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let pending_clone = pending.clone();

        // Event listeners
        let event_listeners: Arc<Mutex<HashMap<String, Vec<mpsc::Sender<Value>>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let events_clone = event_listeners.clone();

        // Writer task: owns the sink, forwards messages from the channel
        let writer_handle = tokio::spawn(async move {
            while let Some(msg) = ws_rx.recv().await {
                if let Err(e) = ws_sink.send(Message::Text(msg)).await {
                    error!("CDP WebSocket write error: {}", e);
                    break;
                }
            }
        });

        // Reader task: reads from the WebSocket, dispatches responses and events
        let reader_handle = tokio::spawn(async move {
            while let Some(msg_result) = ws_stream_read.next().await {
                match msg_result {
                    Ok(Message::Text(text)) => {
                        if let Ok(val) = serde_json::from_str::<Value>(&text) {
                            if let Some(id) = val.get("id").and_then(|v| v.as_u64()) {
                                // Command response
                                let mut pending = pending_clone.lock().await;
                                if let Some(tx) = pending.remove(&id) {
                                    let _ = tx.send(val);
                                }
                            } else if let Some(method) = val.get("method").and_then(|v| v.as_str())
                            {
                                // Event
                                let listeners = events_clone.lock().await;
                                if let Some(senders) = listeners.get(method) {
                                    let params =
                                        val.get("params").cloned().unwrap_or(Value::Null);
                                    for tx in senders {
                                        let _ = tx.try_send(params.clone());
                                    }
                                }
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("CDP WebSocket closed by server");
                        break;
                    }
                    Err(e) => {
                        warn!("CDP WebSocket read error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
        });

        Ok(Self {
            ws_tx,
            pending,
            next_id: AtomicU64::new(1),
            event_listeners,
            _reader_handle: reader_handle,
            _writer_handle: writer_handle,
        })
    }

    /// Send a CDP command and wait for the response.
    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let msg = json!({
            "id": id,
            "method": method,
            "params": params,
        });

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id, tx);
        }

        self.ws_tx
            .send(msg.to_string())
            .await
            .map_err(|e| Error::Browser(format!("Failed to send CDP command: {}", e)))?;

        let timeout = tokio::time::timeout(std::time::Duration::from_secs(30), rx);
        match timeout.await {
            Ok(Ok(response)) => {
                if let Some(error) = response.get("error") {
                    Err(Error::Browser(format!("CDP error: {}", error)))
                } else {
                    Ok(response.get("result").cloned().unwrap_or(Value::Null))
                }
            }
            Ok(Err(_)) => Err(Error::Browser("CDP response channel closed".to_string())),
            Err(_) => {
                let mut pending = self.pending.lock().await;
                pending.remove(&id);
                Err(Error::Timeout(format!(
                    "CDP command '{}' timed out after 30s",
                    method
                )))
            }
        }
    }

    /// Subscribe to a CDP event. Returns a receiver that will get event params.
    pub async fn subscribe_event(&self, method: &str) -> mpsc::Receiver<Value> {
        let (tx, rx) = mpsc::channel(64);
        let mut listeners = self.event_listeners.lock().await;
        listeners
            .entry(method.to_string())
            .or_insert_with(Vec::new)
            .push(tx);
        rx
    }

    /// Enable a CDP domain (e.g., "Page", "Runtime", "Network").
    pub async fn enable_domain(&self, domain: &str) -> Result<()> {
        self.send_command(&format!("{}.enable", domain), json!({}))
            .await?;
        Ok(())
    }

    /// Navigate the page. Resolves when the navigation is accepted, not when
    /// the page finishes loading.
    pub async fn navigate(&self, url: &str) -> Result<Value> {
        self.send_command("Page.navigate", json!({"url": url}))
            .await
    }

    /// Evaluate JavaScript in the page context.
    pub async fn evaluate_js(&self, expression: &str) -> Result<Value> {
        self.send_command(
            "Runtime.evaluate",
            json!({
                "expression": expression,
                "returnByValue": true,
                "awaitPromise": true,
            }),
        )
        .await
    }

    /// Evaluate an expression expected to yield a string.
    pub async fn evaluate_string(&self, expression: &str) -> Result<String> {
        let result = self.evaluate_js(expression).await?;
        result
            .pointer("/result/value")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| Error::Browser(format!("Expression returned no string: {}", expression)))
    }

    /// Evaluate an expression expected to yield a boolean. Anything else
    /// reads as false.
    pub async fn evaluate_bool(&self, expression: &str) -> Result<bool> {
        let result = self.evaluate_js(expression).await?;
        Ok(result
            .pointer("/result/value")
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    /// Current page URL.
    pub async fn current_url(&self) -> Result<String> {
        self.evaluate_string("window.location.href").await
    }

    /// Dispatch a key event via the Input domain.
    pub async fn dispatch_key_event(&self, event_type: &str, key: &str, code: &str) -> Result<()> {
        let mut params = json!({
            "type": event_type,
            "key": key,
            "code": code,
        });
        if event_type == "keyDown" && key.len() == 1 {
            params["text"] = json!(key);
        }
        self.send_command("Input.dispatchKeyEvent", params).await?;
        Ok(())
    }

    /// Press and release a named key (e.g. "Enter").
    pub async fn press_key(&self, key: &str, code: &str) -> Result<()> {
        self.dispatch_key_event("keyDown", key, code).await?;
        self.dispatch_key_event("keyUp", key, code).await?;
        Ok(())
    }

    /// Insert text into the focused element.
    pub async fn insert_text(&self, text: &str) -> Result<()> {
        self.send_command("Input.insertText", json!({"text": text}))
            .await?;
        Ok(())
    }

    /// Override the user agent for all subsequent requests from this target.
    pub async fn set_user_agent(&self, user_agent: &str) -> Result<()> {
        self.send_command(
            "Network.setUserAgentOverride",
            json!({"userAgent": user_agent}),
        )
        .await?;
        Ok(())
    }

    /// Register a script evaluated in every new document before the page's
    /// own scripts run.
    pub async fn add_script_on_new_document(&self, source: &str) -> Result<()> {
        self.send_command(
            "Page.addScriptToEvaluateOnNewDocument",
            json!({"source": source}),
        )
        .await?;
        Ok(())
    }

    /// Fetch a response body captured by the Network domain.
    pub async fn get_response_body(&self, request_id: &str) -> Result<String> {
        let result = self
            .send_command(
                "Network.getResponseBody",
                json!({"requestId": request_id}),
            )
            .await?;
        let body = result
            .get("body")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Browser("No response body returned".to_string()))?;
        Ok(body.to_string())
    }

    /// Create a new page target, returning its targetId.
    pub async fn create_target(&self, url: &str) -> Result<String> {
        let result = self
            .send_command("Target.createTarget", json!({"url": url}))
            .await?;
        result
            .get("targetId")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| Error::Browser("No targetId returned from createTarget".to_string()))
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self._reader_handle.abort();
        self._writer_handle.abort();
    }
}
