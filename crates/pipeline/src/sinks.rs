//! Downstream sinks for orchestration results.
//!
//! Both sinks consume successful results only. The HTTP submission sink is
//! one POST per pass; the document-store sink is one merge-write per
//! account. Sink faults are logged and non-fatal, with one exception: a
//! missing credentials file is a prerequisite failure and aborts the pass
//! before any account is processed (the caller constructs the client
//! first).

use beartrap_core::{sanitize_email, AccountResult, Error, Result};
use once_cell::sync::OnceCell;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Successful results, in input order.
pub fn successes(results: &[AccountResult]) -> Vec<&AccountResult> {
    results.iter().filter(|r| r.success).collect()
}

// ── HTTP submission ─────────────────────────────────────────────────────

pub struct HttpSubmitSink {
    client: reqwest::Client,
    url: String,
}

impl HttpSubmitSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    /// One POST per pass: a JSON array of the successful results.
    pub async fn submit(&self, results: &[AccountResult]) -> Result<usize> {
        let successes = successes(results);
        if successes.is_empty() {
            debug!("No successful results; skipping submission");
            return Ok(0);
        }

        let resp = self
            .client
            .post(&self.url)
            .json(&successes)
            .send()
            .await
            .map_err(|e| Error::Sink(format!("Submission POST failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(Error::Sink(format!(
                "Submission rejected with status {}",
                resp.status()
            )));
        }

        info!(count = successes.len(), "Submitted results");
        Ok(successes.len())
    }
}

// ── Document store ──────────────────────────────────────────────────────

/// Credentials for the document-store API, read from a JSON file.
#[derive(Debug, Clone)]
struct DocStoreCredentials {
    api_key: String,
}

fn load_credentials(path: &Path) -> Result<DocStoreCredentials> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Document-store credentials file {} unreadable: {}",
            path.display(),
            e
        ))
    })?;
    let value: Value = serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Credentials file is not valid JSON: {}", e)))?;
    let api_key = value
        .get("apiKey")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Config("Credentials file is missing apiKey".to_string()))?;
    Ok(DocStoreCredentials {
        api_key: api_key.to_string(),
    })
}

/// REST client for the document store. Constructed at most once per process
/// through [`DocStoreClient::connect`]; the instance is passed into the
/// sink explicitly rather than reached for ambiently.
pub struct DocStoreClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

static DOC_CLIENT: OnceCell<Arc<DocStoreClient>> = OnceCell::new();

impl DocStoreClient {
    /// Guarded factory: the first call reads the credentials file and builds
    /// the client; later calls return the same instance. A missing or
    /// malformed credentials file fails here, before any account work.
    pub fn connect(base_url: &str, credentials_file: &Path) -> Result<Arc<Self>> {
        DOC_CLIENT
            .get_or_try_init(|| {
                let creds = load_credentials(credentials_file)?;
                Ok(Arc::new(Self {
                    client: reqwest::Client::new(),
                    base_url: base_url.trim_end_matches('/').to_string(),
                    api_key: creds.api_key,
                }))
            })
            .cloned()
    }

    fn document_url(&self, collection: &str, doc_id: &str) -> String {
        format!(
            "{}/v1/{}/{}",
            self.base_url,
            collection,
            urlencoding::encode(doc_id)
        )
    }
}

pub struct DocStoreSink {
    client: Arc<DocStoreClient>,
    collection: String,
}

impl DocStoreSink {
    pub fn new(client: Arc<DocStoreClient>, collection: impl Into<String>) -> Self {
        Self {
            client,
            collection: collection.into(),
        }
    }

    /// Merge-write one document per successful account. The server assigns
    /// the update timestamp; the client never sends one.
    pub async fn upsert_all(&self, results: &[AccountResult]) -> Result<usize> {
        let successes = successes(results);
        for result in &successes {
            self.upsert(result).await?;
        }
        info!(count = successes.len(), "Upserted documents");
        Ok(successes.len())
    }

    async fn upsert(&self, result: &AccountResult) -> Result<()> {
        let doc_id = sanitize_email(&result.email);
        let url = self.client.document_url(&self.collection, &doc_id);
        let body = document_body(result);

        let resp = self
            .client
            .client
            .patch(&url)
            .query(&[("merge", "true")])
            .header("Authorization", format!("Bearer {}", self.client.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Sink(format!("Document upsert failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(Error::Sink(format!(
                "Document upsert for {} rejected with status {}",
                doc_id,
                resp.status()
            )));
        }
        Ok(())
    }
}

/// Only fields the pass actually produced; merge semantics leave the rest
/// of the document alone and the timestamp comes from the server.
fn document_body(result: &AccountResult) -> Value {
    let mut body = json!({ "token": result.token });
    if let Some(credits) = result.credits {
        body["credits"] = json!(credits);
    }
    if let Some(tier) = &result.tier {
        body["tier"] = json!(tier);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use beartrap_core::{AcquireFailure, TokenRecord};

    fn sample() -> Vec<AccountResult> {
        vec![
            AccountResult::success(
                "a@x.com",
                &TokenRecord::new("T1").with_usage(Some(3.0), Some("pro".to_string())),
            ),
            AccountResult::failure("b@x.com", AcquireFailure::NoToken),
            AccountResult::success("c@x.com", &TokenRecord::new("T3")),
        ]
    }

    #[test]
    fn test_successes_filter_keeps_order() {
        let results = sample();
        let picked = successes(&results);
        let emails: Vec<&str> = picked.iter().map(|r| r.email.as_str()).collect();
        assert_eq!(emails, vec!["a@x.com", "c@x.com"]);
    }

    #[test]
    fn test_document_body_has_no_timestamp() {
        let results = sample();
        let body = document_body(&results[0]);
        assert_eq!(body["token"], "T1");
        assert_eq!(body["credits"], 3.0);
        assert_eq!(body["tier"], "pro");
        assert!(body.get("updatedAt").is_none());

        let sparse = document_body(&results[2]);
        assert_eq!(sparse["token"], "T3");
        assert!(sparse.get("credits").is_none());
        assert!(sparse.get("tier").is_none());
    }

    #[test]
    fn test_missing_credentials_file_is_config_error() {
        let err = load_credentials(Path::new("/nonexistent/creds.json")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_credentials_require_api_key() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("creds.json");
        std::fs::write(&path, r#"{"something": "else"}"#).unwrap();
        assert!(matches!(
            load_credentials(&path).unwrap_err(),
            Error::Config(_)
        ));

        std::fs::write(&path, r#"{"apiKey": "k-123"}"#).unwrap();
        assert_eq!(load_credentials(&path).unwrap().api_key, "k-123");
    }
}
