//! Shared Google Cloud credentials for the storage and queue adapters.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::OnceCell;

/// Lazily discovered GCP token provider.
///
/// Discovery runs at most once even under concurrent first calls; every
/// adapter holding this handle shares the resulting provider.
#[derive(Default)]
pub struct GcpAuth {
    provider: OnceCell<Arc<dyn gcp_auth::TokenProvider>>,
}

impl GcpAuth {
    /// A handle that has not discovered credentials yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a bearer token for `scopes`.
    pub async fn token(&self, scopes: &[&str]) -> anyhow::Result<String> {
        let provider = self
            .provider
            .get_or_try_init(|| async { gcp_auth::provider().await })
            .await
            .context("discover GCP credentials")?;
        let token = provider
            .token(scopes)
            .await
            .context("fetch GCP access token")?;
        Ok(token.as_str().to_string())
    }
}

impl std::fmt::Debug for GcpAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpAuth")
            .field("initialized", &self.provider.initialized())
            .finish()
    }
}
