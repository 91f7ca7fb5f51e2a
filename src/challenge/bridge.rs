//! A [`ChallengeProvider`][super::ChallengeProvider] writing straight into the DNS listeners
//! of a [`ServerGroup`].
use crate::challenge::{ChallengeProvider, ChallengeToken};
use crate::dns::ServerGroup;
use crate::error::Error;

/// Broadcasts challenge values to every listener of a [`ServerGroup`].
///
/// Listeners don't share zones, so each listener's [`ChallengeToken`] is written individually.
/// The write is complete by the time [`ChallengeProvider::present`] returns, which is why
/// [`ChallengeProvider::wait`] has nothing to wait for.
#[derive(Debug, Clone, Default)]
#[allow(clippy::module_name_repetitions)]
pub struct ChallengeBridge {
    tokens: Vec<ChallengeToken>,
}

impl ChallengeBridge {
    pub fn new(servers: &ServerGroup) -> Self {
        Self::from_tokens(
            servers
                .listeners()
                .iter()
                .map(|l| l.challenge().clone())
                .collect(),
        )
    }

    pub fn from_tokens(tokens: Vec<ChallengeToken>) -> Self {
        ChallengeBridge { tokens }
    }
}

#[async_trait::async_trait]
impl ChallengeProvider for ChallengeBridge {
    async fn present(&self, token: &str) -> Result<(), Error> {
        for cell in &self.tokens {
            cell.set(token).await;
        }
        tracing::info!(listeners = self.tokens.len(), "presented ACME challenge");
        Ok(())
    }

    async fn clean_up(&self) -> Result<(), Error> {
        for cell in &self.tokens {
            cell.clear().await;
        }
        tracing::info!(listeners = self.tokens.len(), "cleaned up ACME challenge");
        Ok(())
    }

    async fn wait(&self) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn values(tokens: &[ChallengeToken]) -> Vec<String> {
        let mut values = Vec::new();
        for token in tokens {
            values.push(token.get().await);
        }
        values
    }

    #[tokio::test]
    async fn present_and_clean_up_reach_every_listener() {
        let tokens = vec![ChallengeToken::default(), ChallengeToken::default()];
        let bridge = ChallengeBridge::from_tokens(tokens.clone());

        bridge.present("x").await.unwrap();
        bridge.present("x").await.unwrap();
        assert_eq!(values(&tokens).await, vec!["x", "x"]);

        bridge.wait().await.unwrap();

        bridge.clean_up().await.unwrap();
        assert_eq!(values(&tokens).await, vec!["", ""]);
        bridge.clean_up().await.unwrap();
        assert_eq!(values(&tokens).await, vec!["", ""]);
    }

    #[tokio::test]
    async fn last_write_wins() {
        let tokens = vec![ChallengeToken::default()];
        let bridge = ChallengeBridge::from_tokens(tokens.clone());
        bridge.present("first").await.unwrap();
        bridge.present("second").await.unwrap();
        assert_eq!(values(&tokens).await, vec!["second"]);
    }
}
