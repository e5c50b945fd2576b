//! Browser-side machinery: CDP transport, per-account session lifecycle,
//! network interception, login automation, and the tiered token wait.

pub mod cdp;
pub mod intercept;
pub mod login;
pub mod session;
pub mod waiter;

pub use cdp::CdpClient;
pub use intercept::TokenCapture;
pub use login::LoginOutcome;
pub use session::BrowserSession;
