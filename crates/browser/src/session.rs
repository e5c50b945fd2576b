//! Browser session lifecycle.
//!
//! One persistent Chrome/Chromium instance per account, bound to that
//! account's profile directory. The session owns the child process and the
//! CDP connection; teardown runs on every exit path (graceful close plus
//! kill-on-drop for the paths that never reach it).

use crate::cdp::CdpClient;
use beartrap_core::config::BrowserConfig;
use beartrap_core::{Error, Paths, Result};
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Script installed in every new document so the page never sees the
/// automation flag.
const WEBDRIVER_SCRUB: &str =
    "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });";

/// A launched browser bound to one account's profile.
pub struct BrowserSession {
    pub account_key: String,
    pub headless: bool,
    pub debug_port: u16,
    pub profile_dir: PathBuf,
    pub cdp: Arc<CdpClient>,
    process: Child,
}

impl BrowserSession {
    /// Launch a persistent session for `account_key`.
    ///
    /// With `force_refresh`, an existing profile directory is deleted before
    /// the process spawns, so the subsequent login is a clean one rather
    /// than an incremental refresh of stale state.
    pub async fn launch(
        paths: &Paths,
        config: &BrowserConfig,
        account_key: &str,
        headless: bool,
        force_refresh: bool,
    ) -> Result<Self> {
        let profile_dir = prepare_profile_dir(paths, account_key, force_refresh)?;

        let browser_path = find_browser_binary()
            .ok_or_else(|| Error::NotFound("No Chrome/Chromium binary found".to_string()))?;

        let debug_port = find_free_port().await?;
        let args = build_browser_args(debug_port, &profile_dir, config, headless);

        info!(
            account = account_key,
            port = debug_port,
            headless = headless,
            "Launching browser"
        );

        let process = Command::new(&browser_path)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Browser(format!("Failed to launch {}: {}", browser_path, e)))?;

        let session =
            Self::connect(account_key, headless, debug_port, profile_dir, process).await?;

        // The page must never see the automation flag, and the UA must be
        // the configured desktop string rather than the headless default.
        session.cdp.set_user_agent(&config.user_agent).await?;
        session
            .cdp
            .add_script_on_new_document(WEBDRIVER_SCRUB)
            .await?;

        Ok(session)
    }

    async fn connect(
        account_key: &str,
        headless: bool,
        debug_port: u16,
        profile_dir: PathBuf,
        mut process: Child,
    ) -> Result<Self> {
        // Kill the child ourselves when anything below fails; kill_on_drop
        // only covers the drop path once this function has returned.
        let connected: Result<Arc<CdpClient>> = async {
            wait_for_cdp_ready(debug_port, 15).await?;
            let page_ws_url = get_page_ws_url(debug_port).await?;
            let cdp = Arc::new(CdpClient::connect(&page_ws_url).await?);
            cdp.enable_domain("Page").await?;
            cdp.enable_domain("Runtime").await?;
            cdp.enable_domain("Network").await?;
            Ok(cdp)
        }
        .await;

        match connected {
            Ok(cdp) => {
                debug!(account = account_key, "CDP connection established");
                Ok(Self {
                    account_key: account_key.to_string(),
                    headless,
                    debug_port,
                    profile_dir,
                    cdp,
                    process,
                })
            }
            Err(e) => {
                let _ = process.kill().await;
                Err(e)
            }
        }
    }

    /// Tear the session down: graceful close via CDP, then kill.
    pub async fn close(&mut self) {
        if let Err(e) = self.cdp.send_command("Browser.close", serde_json::json!({})).await {
            debug!("CDP Browser.close failed (may already be closed): {}", e);
        }
        let _ = self.process.kill().await;
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        // Best-effort kill on drop
        let _ = self.process.start_kill();
    }
}

/// Resolve the account's profile directory, wiping it first on a forced
/// refresh. The old profile is gone before the browser process ever spawns.
fn prepare_profile_dir(
    paths: &Paths,
    account_key: &str,
    force_refresh: bool,
) -> Result<PathBuf> {
    let profile_dir = paths.profile_dir(account_key);
    if force_refresh && profile_dir.exists() {
        info!(account = account_key, "Forced refresh, wiping profile");
        std::fs::remove_dir_all(&profile_dir)?;
    }
    std::fs::create_dir_all(&profile_dir)?;
    Ok(profile_dir)
}

/// Launch arguments: persistent profile, debugging port, hygiene flags, and
/// the anti-automation-detection set.
fn build_browser_args(
    debug_port: u16,
    profile_dir: &std::path::Path,
    config: &BrowserConfig,
    headless: bool,
) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={}", debug_port),
        format!("--user-data-dir={}", profile_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-extensions".to_string(),
        "--disable-sync".to_string(),
        "--disable-translate".to_string(),
        "--metrics-recording-only".to_string(),
        "--password-store=basic".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
        "--exclude-switches=enable-automation".to_string(),
    ];
    if headless {
        args.push("--headless=new".to_string());
    }
    args.push(format!(
        "--window-size={},{}",
        config.window_width, config.window_height
    ));
    args.push("about:blank".to_string());
    args
}

/// Find a Chrome-family binary on the system.
pub fn find_browser_binary() -> Option<String> {
    let candidates = if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ]
    } else if cfg!(target_os = "linux") {
        vec![
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
        ]
    } else {
        vec![
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    };

    for candidate in candidates {
        if std::path::Path::new(candidate).exists() {
            return Some(candidate.to_string());
        }
        if !candidate.contains('/') && !candidate.contains('\\') && which::which(candidate).is_ok()
        {
            return Some(candidate.to_string());
        }
    }
    None
}

/// Find a free TCP port.
async fn find_free_port() -> Result<u16> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| Error::Browser(format!("Failed to bind to find free port: {}", e)))?;
    let port = listener
        .local_addr()
        .map_err(|e| Error::Browser(format!("Failed to get local addr: {}", e)))?
        .port();
    drop(listener);
    Ok(port)
}

/// Wait for the CDP endpoint to come up, polling /json/version.
async fn wait_for_cdp_ready(port: u16, timeout_secs: u64) -> Result<String> {
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_secs(timeout_secs);
    let url = format!("http://127.0.0.1:{}/json/version", port);

    loop {
        if start.elapsed() > timeout {
            return Err(Error::Timeout(format!(
                "Browser CDP not ready after {}s on port {}",
                timeout_secs, port
            )));
        }

        if let Ok(resp) = reqwest::get(&url).await {
            if let Ok(body) = resp.json::<Value>().await {
                if let Some(ws_url) = body.get("webSocketDebuggerUrl").and_then(|v| v.as_str()) {
                    return Ok(ws_url.to_string());
                }
            }
        }

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }
}

/// Resolve the first open page target's WebSocket URL via /json/list,
/// creating a page through the browser target when none shows up.
async fn get_page_ws_url(port: u16) -> Result<String> {
    if let Some(ws_url) = find_page_ws_url(port, 10).await {
        return Ok(ws_url);
    }

    // No page target: ask the browser endpoint for one, then look again.
    warn!(port = port, "No page target found, creating one");
    let browser_ws = wait_for_cdp_ready(port, 5).await?;
    let browser_cdp = CdpClient::connect(&browser_ws).await?;
    browser_cdp.create_target("about:blank").await?;
    drop(browser_cdp);

    find_page_ws_url(port, 10)
        .await
        .ok_or_else(|| Error::Browser("No page target found after creating one".to_string()))
}

async fn find_page_ws_url(port: u16, attempts: u32) -> Option<String> {
    let url = format!("http://127.0.0.1:{}/json/list", port);

    for attempt in 0..attempts {
        if attempt > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        }

        let resp = match reqwest::get(&url).await {
            Ok(r) => r,
            Err(_) => continue,
        };
        let targets: Vec<Value> = match resp.json().await {
            Ok(t) => t,
            Err(_) => continue,
        };

        for target in &targets {
            if target.get("type").and_then(|v| v.as_str()) == Some("page") {
                if let Some(ws_url) = target.get("webSocketDebuggerUrl").and_then(|v| v.as_str()) {
                    return Some(ws_url.to_string());
                }
            }
        }
    }
    None
}
