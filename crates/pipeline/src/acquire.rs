//! The production `Acquirer`: one real browser session per account.

use crate::orchestrator::{AcquireOutcome, Acquirer};
use async_trait::async_trait;
use beartrap_browser::{login, waiter, BrowserSession, LoginOutcome, TokenCapture};
use beartrap_core::{sanitize_email, Account, AcquireFailure, Config, FetchOptions, Paths, Result};
use tracing::debug;

pub struct BrowserAcquirer {
    paths: Paths,
    config: Config,
}

impl BrowserAcquirer {
    pub fn new(paths: Paths, config: Config) -> Self {
        Self { paths, config }
    }

    async fn drive(
        &self,
        session: &BrowserSession,
        account: &Account,
    ) -> Result<AcquireOutcome> {
        // Attach before navigation so the earliest calls are observable.
        let mut capture = TokenCapture::attach(&session.cdp, &self.config.target).await;

        let outcome = login::run(
            session,
            &self.config.login,
            &self.config.target,
            std::time::Duration::from_secs(self.config.browser.nav_timeout_secs),
            &account.email,
            account.password.as_deref(),
        )
        .await?;

        let outcome = match outcome {
            LoginOutcome::RequiresInteractive => {
                AcquireOutcome::Failed(AcquireFailure::LoginRequired)
            }
            LoginOutcome::TimedOut => AcquireOutcome::Failed(AcquireFailure::LoginTimeout),
            LoginOutcome::Authenticated | LoginOutcome::Indeterminate => {
                let token = waiter::await_token(
                    &session.cdp,
                    &capture,
                    &self.config.wait,
                    session.headless,
                )
                .await;
                match token {
                    Some(token) => {
                        let (credits, tier) = capture.usage();
                        AcquireOutcome::Token {
                            token,
                            credits,
                            tier,
                        }
                    }
                    None => AcquireOutcome::Failed(AcquireFailure::NoToken),
                }
            }
        };

        capture.detach();
        Ok(outcome)
    }
}

#[async_trait]
impl Acquirer for BrowserAcquirer {
    async fn acquire(&self, account: &Account, opts: FetchOptions) -> Result<AcquireOutcome> {
        let key = sanitize_email(&account.email);
        let mut session = BrowserSession::launch(
            &self.paths,
            &self.config.browser,
            &key,
            opts.headless,
            opts.force_login,
        )
        .await?;

        // Teardown happens before any outcome propagates, hard errors
        // included.
        let outcome = self.drive(&session, account).await;
        session.close().await;
        debug!(account = %key, "Session closed");
        outcome
    }
}
