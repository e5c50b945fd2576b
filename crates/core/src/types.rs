use serde::{Deserialize, Serialize};

/// One entry of the stored account list. Order matters: orchestration runs
/// and reports accounts in list order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
}

/// Storage key shared by profile directories and token-map entries.
/// Case and surrounding whitespace never produce distinct identities.
pub fn sanitize_email(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// A captured bearer token plus whatever usage metadata the session yielded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub token: String,
    pub updated_at: String,
    #[serde(default)]
    pub credits: Option<f64>,
    #[serde(default)]
    pub tier: Option<String>,
}

impl TokenRecord {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            updated_at: chrono::Utc::now().to_rfc3339(),
            credits: None,
            tier: None,
        }
    }

    pub fn with_usage(mut self, credits: Option<f64>, tier: Option<String>) -> Self {
        self.credits = credits;
        self.tier = tier;
        self
    }
}

/// Per-account failure taxonomy. Every variant is non-fatal to the run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AcquireFailure {
    /// Authentication needed but the session is non-interactive.
    LoginRequired,
    /// Interactive login did not complete within the bounded wait.
    LoginTimeout,
    /// Authenticated-looking state but no qualifying network call observed.
    NoToken,
}

impl AcquireFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoginRequired => "login_required",
            Self::LoginTimeout => "login_timeout",
            Self::NoToken => "no_token",
        }
    }
}

impl std::fmt::Display for AcquireFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome for one account in one orchestration pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResult {
    pub email: String,
    pub success: bool,
    pub token: Option<String>,
    pub credits: Option<f64>,
    pub tier: Option<String>,
    pub error: Option<AcquireFailure>,
}

impl AccountResult {
    pub fn success(email: impl Into<String>, record: &TokenRecord) -> Self {
        Self {
            email: email.into(),
            success: true,
            token: Some(record.token.clone()),
            credits: record.credits,
            tier: record.tier.clone(),
            error: None,
        }
    }

    pub fn failure(email: impl Into<String>, failure: AcquireFailure) -> Self {
        Self {
            email: email.into(),
            success: false,
            token: None,
            credits: None,
            tier: None,
            error: Some(failure),
        }
    }
}

/// What the post-navigation probe concluded about the page.
///
/// `Unknown` is deliberate: when neither the login-host pattern nor any
/// signed-in marker matches, the classifier says so instead of guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthProbe {
    NeedsLogin,
    PossiblyAuthenticated,
    Unknown,
}

/// Caller-facing options for one orchestration pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    pub headless: bool,
    pub force_login: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_email_case_and_whitespace() {
        assert_eq!(sanitize_email("User@Example.com"), "user@example.com");
        assert_eq!(sanitize_email("user@example.com "), "user@example.com");
        assert_eq!(sanitize_email("  USER@EXAMPLE.COM\t"), "user@example.com");
    }

    #[test]
    fn test_failure_wire_strings() {
        let json = serde_json::to_string(&AcquireFailure::LoginRequired).unwrap();
        assert_eq!(json, "\"login_required\"");
        let json = serde_json::to_string(&AcquireFailure::LoginTimeout).unwrap();
        assert_eq!(json, "\"login_timeout\"");
        let json = serde_json::to_string(&AcquireFailure::NoToken).unwrap();
        assert_eq!(json, "\"no_token\"");
    }

    #[test]
    fn test_result_serializes_null_usage_fields() {
        let record = TokenRecord::new("T1");
        let result = AccountResult::success("a@x.com", &record);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["token"], "T1");
        assert!(value["credits"].is_null());
        assert!(value["tier"].is_null());
        assert!(value["error"].is_null());
    }
}
