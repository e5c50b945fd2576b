//! Sequential per-account orchestration.
//!
//! Accounts run strictly one at a time; sessions are never concurrent.
//! Results come back in input order whatever the per-account outcomes, and
//! a shutdown signal is honored only between accounts; an in-flight session
//! is never interrupted mid-step.

use async_trait::async_trait;
use beartrap_core::{
    sanitize_email, Account, AccountResult, AcquireFailure, FetchOptions, Result, TokenRecord,
};
use beartrap_storage::SessionStore;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// What one acquisition attempt produced.
#[derive(Debug, Clone)]
pub enum AcquireOutcome {
    Token {
        token: String,
        credits: Option<f64>,
        tier: Option<String>,
    },
    Failed(AcquireFailure),
}

/// The browser-driving seam. The production implementation launches a real
/// browser; tests script outcomes instead.
#[async_trait]
pub trait Acquirer: Send + Sync {
    async fn acquire(&self, account: &Account, opts: FetchOptions) -> Result<AcquireOutcome>;
}

pub struct Orchestrator {
    store: Arc<SessionStore>,
    acquirer: Arc<dyn Acquirer>,
}

impl Orchestrator {
    pub fn new(store: Arc<SessionStore>, acquirer: Arc<dyn Acquirer>) -> Self {
        Self { store, acquirer }
    }

    /// Run one pass over `emails`, in order. Passwords are resolved from
    /// the stored account list, never taken from the caller.
    pub async fn run(
        &self,
        emails: &[String],
        opts: FetchOptions,
        mut shutdown: Option<broadcast::Receiver<()>>,
    ) -> Vec<AccountResult> {
        let mut results = Vec::with_capacity(emails.len());

        for email in emails {
            if let Some(rx) = shutdown.as_mut() {
                if rx.try_recv().is_ok() {
                    info!("Shutdown requested; stopping before next account");
                    break;
                }
            }

            info!(account = %email, "Processing account");
            let result = self.run_account(email, opts).await;
            if let Some(failure) = result.error {
                warn!(account = %email, error = %failure, "Account did not yield a token");
            } else {
                info!(account = %email, "Token acquired");
            }
            results.push(result);
        }

        results
    }

    async fn run_account(&self, email: &str, opts: FetchOptions) -> AccountResult {
        let account = Account {
            email: email.to_string(),
            password: self.store.find_password(email),
        };

        match self.acquirer.acquire(&account, opts).await {
            Ok(AcquireOutcome::Token {
                token,
                credits,
                tier,
            }) => {
                let record = TokenRecord::new(token).with_usage(credits, tier);
                if let Err(e) = self.store.upsert_token(email, record.clone()) {
                    error!(account = %email, error = %e, "Failed to persist token");
                }
                AccountResult::success(sanitize_email(email), &record)
            }
            Ok(AcquireOutcome::Failed(failure)) => {
                AccountResult::failure(sanitize_email(email), failure)
            }
            Err(e) => {
                // Infrastructure fault (launch failure, lost CDP transport).
                // It lands in the report as the transient taxonomy entry;
                // detail stays in the log.
                error!(account = %email, error = %e, "Acquisition failed");
                AccountResult::failure(sanitize_email(email), AcquireFailure::NoToken)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beartrap_core::{Error, Paths};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Scripted acquirer: maps sanitized email -> outcome.
    struct ScriptedAcquirer {
        script: HashMap<String, AcquireOutcome>,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedAcquirer {
        fn new(script: HashMap<String, AcquireOutcome>) -> Self {
            Self {
                script,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Acquirer for ScriptedAcquirer {
        async fn acquire(&self, account: &Account, _opts: FetchOptions) -> Result<AcquireOutcome> {
            let key = sanitize_email(&account.email);
            self.seen.lock().unwrap().push(key.clone());
            match self.script.get(&key) {
                Some(outcome) => Ok(outcome.clone()),
                None => Err(Error::Browser("unscripted account".to_string())),
            }
        }
    }

    fn test_store() -> (Arc<SessionStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SessionStore::new(Paths::with_base(dir.path().to_path_buf())));
        (store, dir)
    }

    fn token_outcome(token: &str) -> AcquireOutcome {
        AcquireOutcome::Token {
            token: token.to_string(),
            credits: None,
            tier: None,
        }
    }

    #[tokio::test]
    async fn test_end_to_end_single_account() {
        let (store, _dir) = test_store();
        store
            .upsert_account(Account {
                email: "a@x.com".to_string(),
                password: Some("p".to_string()),
            })
            .unwrap();

        let mut script = HashMap::new();
        script.insert("a@x.com".to_string(), token_outcome("T1"));
        let orchestrator =
            Orchestrator::new(store.clone(), Arc::new(ScriptedAcquirer::new(script)));

        let results = orchestrator
            .run(&["a@x.com".to_string()], FetchOptions::default(), None)
            .await;

        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.email, "a@x.com");
        assert!(r.success);
        assert_eq!(r.token.as_deref(), Some("T1"));
        assert_eq!(r.credits, None);
        assert_eq!(r.tier, None);
        assert!(r.error.is_none());

        let tokens = store.list_tokens();
        assert_eq!(tokens["a@x.com"].token, "T1");
        assert!(!tokens["a@x.com"].updated_at.is_empty());
    }

    #[tokio::test]
    async fn test_mixed_outcomes_preserve_input_order() {
        let (store, _dir) = test_store();
        let mut script = HashMap::new();
        script.insert("a@x.com".to_string(), token_outcome("TA"));
        script.insert(
            "b@x.com".to_string(),
            AcquireOutcome::Failed(AcquireFailure::LoginRequired),
        );
        script.insert("c@x.com".to_string(), token_outcome("TC"));
        script.insert(
            "d@x.com".to_string(),
            AcquireOutcome::Failed(AcquireFailure::NoToken),
        );
        let orchestrator =
            Orchestrator::new(store.clone(), Arc::new(ScriptedAcquirer::new(script)));

        let emails: Vec<String> = ["a@x.com", "b@x.com", "c@x.com", "d@x.com"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let results = orchestrator
            .run(&emails, FetchOptions::default(), None)
            .await;

        assert_eq!(results.len(), emails.len());
        let got: Vec<&str> = results.iter().map(|r| r.email.as_str()).collect();
        assert_eq!(got, vec!["a@x.com", "b@x.com", "c@x.com", "d@x.com"]);
        assert!(results[0].success);
        assert_eq!(results[1].error, Some(AcquireFailure::LoginRequired));
        assert!(results[2].success);
        assert_eq!(results[3].error, Some(AcquireFailure::NoToken));
    }

    #[tokio::test]
    async fn test_headless_login_required_writes_no_record() {
        let (store, _dir) = test_store();
        let mut script = HashMap::new();
        script.insert(
            "a@x.com".to_string(),
            AcquireOutcome::Failed(AcquireFailure::LoginRequired),
        );
        let orchestrator =
            Orchestrator::new(store.clone(), Arc::new(ScriptedAcquirer::new(script)));

        let opts = FetchOptions {
            headless: true,
            force_login: false,
        };
        let results = orchestrator.run(&["a@x.com".to_string()], opts, None).await;

        assert!(!results[0].success);
        assert_eq!(results[0].error, Some(AcquireFailure::LoginRequired));
        assert!(store.list_tokens().is_empty());
    }

    #[tokio::test]
    async fn test_acquirer_error_becomes_no_token_result() {
        let (store, _dir) = test_store();
        let orchestrator = Orchestrator::new(
            store.clone(),
            Arc::new(ScriptedAcquirer::new(HashMap::new())),
        );

        let results = orchestrator
            .run(&["a@x.com".to_string()], FetchOptions::default(), None)
            .await;

        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert_eq!(results[0].error, Some(AcquireFailure::NoToken));
        assert!(store.list_tokens().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_stops_between_accounts() {
        let (store, _dir) = test_store();
        let mut script = HashMap::new();
        script.insert("a@x.com".to_string(), token_outcome("TA"));
        script.insert("b@x.com".to_string(), token_outcome("TB"));
        let orchestrator =
            Orchestrator::new(store.clone(), Arc::new(ScriptedAcquirer::new(script)));

        let (tx, rx) = broadcast::channel(1);
        tx.send(()).unwrap();

        let results = orchestrator
            .run(
                &["a@x.com".to_string(), "b@x.com".to_string()],
                FetchOptions::default(),
                Some(rx),
            )
            .await;

        // The signal was already pending, so not even the first account ran.
        assert!(results.is_empty());
    }
}
