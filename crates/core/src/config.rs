use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::paths::Paths;

/// Target-site coordinates: the page we drive and the patterns that identify
/// the token source and the quota endpoint on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfig {
    #[serde(default = "default_target_url")]
    pub url: String,
    /// Requests whose URL contains this host carry the bearer we want.
    #[serde(default = "default_api_host")]
    pub api_host: String,
    /// Narrower path identifying the usage/quota endpoint.
    #[serde(default = "default_usage_path")]
    pub usage_path: String,
    /// URLs containing this host are login pages.
    #[serde(default = "default_login_host")]
    pub login_host: String,
}

fn default_target_url() -> String {
    "https://lumina.chat/".to_string()
}

fn default_api_host() -> String {
    "api.lumina.chat".to_string()
}

fn default_usage_path() -> String {
    "/api/v1/credits".to_string()
}

fn default_login_host() -> String {
    "auth.lumina.chat".to_string()
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            url: default_target_url(),
            api_host: default_api_host(),
            usage_path: default_usage_path(),
            login_host: default_login_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    /// Fixed desktop-class identification string, never rotated.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    #[serde(default = "default_nav_timeout_secs")]
    pub nav_timeout_secs: u64,
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
        .to_string()
}

fn default_window_width() -> u32 {
    1280
}

fn default_window_height() -> u32 {
    800
}

fn default_nav_timeout_secs() -> u64 {
    30
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            window_width: default_window_width(),
            window_height: default_window_height(),
            nav_timeout_secs: default_nav_timeout_secs(),
        }
    }
}

/// Selector tables and pacing for the login flow. Every site heuristic
/// lives here, not in flow code; the target's markup changes often.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginConfig {
    /// Entry controls tried in order; the first visible match is clicked.
    #[serde(default = "default_entry_selectors")]
    pub entry_selectors: Vec<String>,
    /// Fallback: any visible clickable whose text contains one of these.
    #[serde(default = "default_entry_keywords")]
    pub entry_keywords: Vec<String>,
    #[serde(default = "default_email_selectors")]
    pub email_selectors: Vec<String>,
    #[serde(default = "default_password_selectors")]
    pub password_selectors: Vec<String>,
    /// Signed-in UI markers (avatar/account indicators). Advisory only.
    #[serde(default = "default_signed_in_selectors")]
    pub signed_in_selectors: Vec<String>,
    /// Settle delay after the entry click, before classification.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_type_delay_min_ms")]
    pub type_delay_min_ms: u64,
    #[serde(default = "default_type_delay_max_ms")]
    pub type_delay_max_ms: u64,
    /// Pause before/after focusing a credential field.
    #[serde(default = "default_field_pause_min_ms")]
    pub field_pause_min_ms: u64,
    #[serde(default = "default_field_pause_max_ms")]
    pub field_pause_max_ms: u64,
    /// How long to probe for a password field before falling back to
    /// manual entry.
    #[serde(default = "default_password_probe_secs")]
    pub password_probe_secs: u64,
    /// Post-submit bound for the URL to leave the login host and reach the
    /// target host. Dominant wall-clock cost of the pipeline.
    #[serde(default = "default_redirect_timeout_secs")]
    pub redirect_timeout_secs: u64,
}

fn default_entry_selectors() -> Vec<String> {
    vec![
        "[data-testid='open-workspace']".to_string(),
        "button.workspace-launch".to_string(),
        "a[href*='/workspace']".to_string(),
    ]
}

fn default_entry_keywords() -> Vec<String> {
    vec![
        "workspace".to_string(),
        "get started".to_string(),
        "start".to_string(),
        "launch".to_string(),
    ]
}

fn default_email_selectors() -> Vec<String> {
    vec![
        "input[type='email']".to_string(),
        "input[name='email']".to_string(),
        "input[autocomplete='username']".to_string(),
    ]
}

fn default_password_selectors() -> Vec<String> {
    vec![
        "input[type='password']".to_string(),
        "input[name='password']".to_string(),
    ]
}

fn default_signed_in_selectors() -> Vec<String> {
    vec![
        "[data-testid='user-avatar']".to_string(),
        "img[alt='avatar']".to_string(),
        ".account-menu".to_string(),
    ]
}

fn default_settle_ms() -> u64 {
    2000
}

fn default_type_delay_min_ms() -> u64 {
    30
}

fn default_type_delay_max_ms() -> u64 {
    90
}

fn default_field_pause_min_ms() -> u64 {
    400
}

fn default_field_pause_max_ms() -> u64 {
    1200
}

fn default_password_probe_secs() -> u64 {
    8
}

fn default_redirect_timeout_secs() -> u64 {
    300
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            entry_selectors: default_entry_selectors(),
            entry_keywords: default_entry_keywords(),
            email_selectors: default_email_selectors(),
            password_selectors: default_password_selectors(),
            signed_in_selectors: default_signed_in_selectors(),
            settle_ms: default_settle_ms(),
            type_delay_min_ms: default_type_delay_min_ms(),
            type_delay_max_ms: default_type_delay_max_ms(),
            field_pause_min_ms: default_field_pause_min_ms(),
            field_pause_max_ms: default_field_pause_max_ms(),
            password_probe_secs: default_password_probe_secs(),
            redirect_timeout_secs: default_redirect_timeout_secs(),
        }
    }
}

/// Tiered token-wait policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitConfig {
    /// Bounded network-settle attempt before provoking lazy requests.
    #[serde(default = "default_idle_settle_secs")]
    pub idle_settle_secs: u64,
    #[serde(default = "default_first_tier_secs")]
    pub first_tier_secs: u64,
    /// Interactive sessions only; allows manual interaction to finish.
    #[serde(default = "default_second_tier_secs")]
    pub second_tier_secs: u64,
}

fn default_idle_settle_secs() -> u64 {
    10
}

fn default_first_tier_secs() -> u64 {
    30
}

fn default_second_tier_secs() -> u64 {
    180
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            idle_settle_secs: default_idle_settle_secs(),
            first_tier_secs: default_first_tier_secs(),
            second_tier_secs: default_second_tier_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocStoreConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Credentials file required before any account is processed when the
    /// doc-store sink is requested.
    #[serde(default)]
    pub credentials_file: Option<String>,
}

fn default_collection() -> String {
    "sessions".to_string()
}

impl Default for DocStoreConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            collection: default_collection(),
            credentials_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SinksConfig {
    /// HTTP submission sink: one POST per pass, successes only.
    #[serde(default)]
    pub submit_url: Option<String>,
    #[serde(default)]
    pub docstore: DocStoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub login: LoginConfig,
    #[serde(default)]
    pub wait: WaitConfig,
    #[serde(default)]
    pub sinks: SinksConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.target.api_host, config.target.api_host);
        assert_eq!(back.wait.first_tier_secs, config.wait.first_tier_secs);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"target": {"url": "https://example.test/"}}"#).unwrap();
        assert_eq!(config.target.url, "https://example.test/");
        assert_eq!(config.target.api_host, default_api_host());
        assert!(!config.login.entry_selectors.is_empty());
    }
}
