//! Login-state detection and automated credential submission.
//!
//! The flow is a small state machine: navigate, poke the entry control,
//! classify the page (login page / signed in / unknown), and when a login is
//! required and the session is interactive, type credentials with
//! human-like pacing and wait out the redirect back to the target host.
//!
//! Everything site-specific (selectors, keywords, pacing bounds) comes from
//! `LoginConfig`; the markup changes more often than this code does.

use crate::cdp::CdpClient;
use crate::session::BrowserSession;
use beartrap_core::config::{LoginConfig, TargetConfig};
use beartrap_core::{AuthProbe, Result};
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Where the login flow ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Signed-in markers present, or the post-login redirect completed.
    Authenticated,
    /// Neither a login page nor signed-in markers were recognized. The flow
    /// proceeds to capture without claiming either known state.
    Indeterminate,
    /// A login page in a headless session; interactive retry required.
    RequiresInteractive,
    /// Credentials submitted but the redirect never completed in bound.
    TimedOut,
}

/// Drive the full flow against a freshly launched session.
pub async fn run(
    session: &BrowserSession,
    login: &LoginConfig,
    target: &TargetConfig,
    nav_timeout: Duration,
    email: &str,
    password: Option<&str>,
) -> Result<LoginOutcome> {
    let cdp = &session.cdp;

    navigate_bounded(cdp, &target.url, nav_timeout, login.settle_ms).await;
    trigger_entry(cdp, login).await?;
    sleep(Duration::from_millis(login.settle_ms)).await;

    let probe = probe_auth_state(cdp, login, target).await?;
    debug!(probe = ?probe, "Classified page state");

    match probe {
        AuthProbe::PossiblyAuthenticated => Ok(LoginOutcome::Authenticated),
        AuthProbe::Unknown => {
            info!("Page state unrecognized; proceeding without login automation");
            Ok(LoginOutcome::Indeterminate)
        }
        AuthProbe::NeedsLogin if session.headless => {
            info!("Login required but session is headless");
            Ok(LoginOutcome::RequiresInteractive)
        }
        AuthProbe::NeedsLogin => submit_credentials(cdp, login, target, email, password).await,
    }
}

/// Navigation with a bounded wait. A timeout is logged and tolerated; the
/// flow continues with whatever state the page reached.
async fn navigate_bounded(cdp: &CdpClient, url: &str, nav_timeout: Duration, settle_ms: u64) {
    match tokio::time::timeout(nav_timeout, cdp.navigate(url)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!("Navigation error (continuing): {}", e),
        Err(_) => warn!("Navigation timed out (continuing)"),
    }
    sleep(Duration::from_millis(settle_ms)).await;
}

/// Try the configured entry controls in order; first visible match wins.
/// Falls back to a keyword scan over visible clickables. Matching nothing
/// is not fatal.
async fn trigger_entry(cdp: &CdpClient, login: &LoginConfig) -> Result<()> {
    for selector in &login.entry_selectors {
        if cdp.evaluate_bool(&click_visible_js(selector)).await? {
            debug!(selector = %selector, "Clicked entry control");
            return Ok(());
        }
    }

    if cdp
        .evaluate_bool(&click_by_keywords_js(&login.entry_keywords))
        .await?
    {
        debug!("Clicked entry control via keyword fallback");
        return Ok(());
    }

    debug!("No entry control matched; proceeding without click");
    Ok(())
}

/// URL first, DOM markers second, and an honest `Unknown` when neither
/// heuristic recognizes anything.
async fn probe_auth_state(
    cdp: &CdpClient,
    login: &LoginConfig,
    target: &TargetConfig,
) -> Result<AuthProbe> {
    let url = cdp.current_url().await.unwrap_or_default();
    if is_login_url(&url, &target.login_host) {
        return Ok(AuthProbe::NeedsLogin);
    }

    for selector in &login.signed_in_selectors {
        if cdp.evaluate_bool(&marker_present_js(selector)).await? {
            debug!(selector = %selector, "Signed-in marker present");
            return Ok(AuthProbe::PossiblyAuthenticated);
        }
    }

    Ok(AuthProbe::Unknown)
}

/// Interactive credential entry with human-like pacing, then the long
/// redirect wait. This wait dominates the pipeline's wall-clock time.
async fn submit_credentials(
    cdp: &CdpClient,
    login: &LoginConfig,
    target: &TargetConfig,
    email: &str,
    password: Option<&str>,
) -> Result<LoginOutcome> {
    let Some(field) = find_first_field(cdp, &login.email_selectors).await? else {
        warn!("Login page without a recognizable email input; waiting for manual entry");
        return await_redirect(cdp, login, target).await;
    };

    debug!(selector = %field, "Typing email address");
    field_pause(login).await;
    type_like_human(cdp, email, login).await?;
    field_pause(login).await;
    cdp.press_key("Enter", "Enter").await?;

    if let Some(password) = password {
        match discover_password_field(cdp, login).await? {
            Some(selector) => {
                debug!(selector = %selector, "Typing password");
                field_pause(login).await;
                type_like_human(cdp, password, login).await?;
                field_pause(login).await;
                cdp.press_key("Enter", "Enter").await?;
            }
            None => {
                // Tolerated: the operator finishes the form by hand.
                info!("No password field appeared; falling back to manual entry");
            }
        }
    }

    await_redirect(cdp, login, target).await
}

/// First selector from the list that focuses an on-page input.
async fn find_first_field(cdp: &CdpClient, selectors: &[String]) -> Result<Option<String>> {
    for selector in selectors {
        if cdp.evaluate_bool(&focus_field_js(selector)).await? {
            return Ok(Some(selector.clone()));
        }
    }
    Ok(None)
}

/// The password field often renders only after the email step, so poll for
/// it with a shorter bound than the main redirect wait.
async fn discover_password_field(
    cdp: &CdpClient,
    login: &LoginConfig,
) -> Result<Option<String>> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(login.password_probe_secs);
    loop {
        if let Some(selector) = find_first_field(cdp, &login.password_selectors).await? {
            return Ok(Some(selector));
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(None);
        }
        sleep(Duration::from_millis(500)).await;
    }
}

/// Character-by-character input with a bounded randomized delay per key.
async fn type_like_human(cdp: &CdpClient, text: &str, login: &LoginConfig) -> Result<()> {
    let mut buf = [0u8; 4];
    for ch in text.chars() {
        cdp.insert_text(ch.encode_utf8(&mut buf)).await?;
        sleep(Duration::from_millis(jitter_ms(
            login.type_delay_min_ms,
            login.type_delay_max_ms,
        )))
        .await;
    }
    Ok(())
}

/// Poll until the URL has left the login host and reached the target host.
/// Evaluate errors are tolerated while the page is mid-navigation.
async fn await_redirect(
    cdp: &CdpClient,
    login: &LoginConfig,
    target: &TargetConfig,
) -> Result<LoginOutcome> {
    let target_host = target_host(&target.url);
    let deadline =
        tokio::time::Instant::now() + Duration::from_secs(login.redirect_timeout_secs);

    info!(
        bound_secs = login.redirect_timeout_secs,
        "Waiting for login redirect"
    );
    loop {
        if let Ok(url) = cdp.current_url().await {
            if redirect_complete(&url, &target.login_host, &target_host) {
                info!("Login redirect completed");
                return Ok(LoginOutcome::Authenticated);
            }
        }
        if tokio::time::Instant::now() >= deadline {
            warn!("Login not completed within bound");
            return Ok(LoginOutcome::TimedOut);
        }
        sleep(Duration::from_secs(1)).await;
    }
}

async fn field_pause(login: &LoginConfig) {
    sleep(Duration::from_millis(jitter_ms(
        login.field_pause_min_ms,
        login.field_pause_max_ms,
    )))
    .await;
}

/// Uniform sample in [min, max]; collapses cleanly when min >= max.
fn jitter_ms(min: u64, max: u64) -> u64 {
    if min >= max {
        return min;
    }
    rand::thread_rng().gen_range(min..=max)
}

pub(crate) fn is_login_url(url: &str, login_host: &str) -> bool {
    !login_host.is_empty() && url.contains(login_host)
}

/// Done when we are both off the login host and back on the target host.
pub(crate) fn redirect_complete(url: &str, login_host: &str, target_host: &str) -> bool {
    !is_login_url(url, login_host) && !target_host.is_empty() && url.contains(target_host)
}

fn target_host(target_url: &str) -> String {
    url::Url::parse(target_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_default()
}

// ── JS snippets ─────────────────────────────────────────────────────────
//
// All selector/keyword values pass through serde_json so user-configured
// strings cannot break out of the script.

fn click_visible_js(selector: &str) -> String {
    let sel = serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        r#"(() => {{
            const el = document.querySelector({sel});
            if (!el) return false;
            const r = el.getBoundingClientRect();
            if (r.width === 0 || r.height === 0) return false;
            el.click();
            return true;
        }})()"#
    )
}

fn click_by_keywords_js(keywords: &[String]) -> String {
    let lowered: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    let kws = serde_json::to_string(&lowered).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"(() => {{
            const kws = {kws};
            const els = Array.from(document.querySelectorAll("button, a, [role='button']"));
            for (const el of els) {{
                const r = el.getBoundingClientRect();
                if (r.width === 0 || r.height === 0) continue;
                const text = (el.innerText || '').trim().toLowerCase();
                if (!text) continue;
                if (kws.some(k => text.includes(k))) {{ el.click(); return true; }}
            }}
            return false;
        }})()"#
    )
}

fn marker_present_js(selector: &str) -> String {
    let sel = serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string());
    format!("!!document.querySelector({sel})")
}

fn focus_field_js(selector: &str) -> String {
    let sel = serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        r#"(() => {{
            const el = document.querySelector({sel});
            if (!el) return false;
            const r = el.getBoundingClientRect();
            if (r.width === 0 || r.height === 0) return false;
            el.click();
            el.focus();
            return true;
        }})()"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_url_classification() {
        assert!(is_login_url(
            "https://auth.lumina.chat/signin?next=%2F",
            "auth.lumina.chat"
        ));
        assert!(!is_login_url("https://lumina.chat/workspace", "auth.lumina.chat"));
        // An empty pattern never classifies anything as a login page.
        assert!(!is_login_url("https://auth.lumina.chat/signin", ""));
    }

    #[test]
    fn test_redirect_completion_needs_both_conditions() {
        let login_host = "auth.lumina.chat";
        let target = "lumina.chat";
        // Still on the login host.
        assert!(!redirect_complete(
            "https://auth.lumina.chat/mfa",
            login_host,
            target
        ));
        // Off the login host but parked somewhere else.
        assert!(!redirect_complete("https://example.com/", login_host, target));
        // Back on the target host.
        assert!(redirect_complete(
            "https://lumina.chat/workspace",
            login_host,
            target
        ));
    }

    #[test]
    fn test_jitter_bounds() {
        for _ in 0..100 {
            let v = jitter_ms(30, 90);
            assert!((30..=90).contains(&v));
        }
        assert_eq!(jitter_ms(50, 50), 50);
        assert_eq!(jitter_ms(60, 40), 60);
    }

    #[test]
    fn test_js_escapes_hostile_selector() {
        let js = click_visible_js("input[name=\"x\"]");
        // The quote arrives escaped inside the script literal.
        assert!(js.contains("\\\"x\\\""));
        let js = marker_present_js("a'); alert('pwn");
        assert!(!js.contains("alert('pwn')"));
    }

    #[test]
    fn test_keyword_js_lowercases() {
        let js = click_by_keywords_js(&["Get Started".to_string()]);
        assert!(js.contains("get started"));
    }
}
