//! ACME DNS-01 challenge provisioning.
//!
//! An ACME client proving control of [`Config::domain`][`crate::config::Config::domain`] hands
//! its [RFC-8555][RFC-8555] [DNS-01] key authorization to a [`ChallengeProvider`]. The provider
//! makes it visible as the `TXT` record of `_acme-challenge.<domain>` on every running DNS
//! listener, and withdraws it again once validation is over.
//!
//! [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4

use crate::error::Error;
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod bridge;

pub use bridge::ChallengeBridge;

/// `DynChallengeProvider` is a type alias for a [`ChallengeProvider`] shared between
/// concurrent HTTP requests.
#[allow(clippy::module_name_repetitions)]
pub type DynChallengeProvider = Arc<dyn ChallengeProvider + Send + Sync>;

/// The contract an ACME client library uses to solve DNS-01 challenges.
#[async_trait::async_trait]
pub trait ChallengeProvider {
    /// Make `token` the served challenge value.
    async fn present(&self, token: &str) -> Result<(), Error>;

    /// Stop serving the challenge value.
    async fn clean_up(&self) -> Result<(), Error>;

    /// Wait until a presented value is visible to DNS clients.
    async fn wait(&self) -> Result<(), Error>;
}

/// The live challenge value of one DNS listener. Empty when no challenge is active.
///
/// Clones share the same value. Reads and writes are exclusive, so a query never observes a
/// partially written token.
#[derive(Debug, Clone, Default)]
#[allow(clippy::module_name_repetitions)]
pub struct ChallengeToken(Arc<RwLock<String>>);

impl ChallengeToken {
    pub async fn get(&self) -> String {
        self.0.read().await.clone()
    }

    pub async fn set(&self, token: &str) {
        let mut current = self.0.write().await;
        current.clear();
        current.push_str(token);
    }

    pub async fn clear(&self) {
        self.0.write().await.clear();
    }
}
