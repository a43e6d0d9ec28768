//! GitHub App client: installation tokens, run log archives, PR comments.
//!
//! Tokens are minted per continuation and never cached; each one lives only
//! as long as the invocation that asked for it.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use commenter_core::model::RepoSlug;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{header, redirect, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const USER_AGENT: &str = concat!("commenter-daemon/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";

/// Short-lived installation access token.
#[derive(Clone)]
pub struct InstallationToken(String);

impl InstallationToken {
    /// Wraps a raw token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for an `Authorization` header.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for InstallationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("InstallationToken(<redacted>)")
    }
}

/// The code-hosting calls the pipeline needs.
#[async_trait]
pub trait ProvenanceClient: Send + Sync {
    /// Exchanges the app identity for a token scoped to `installation_id`.
    async fn installation_token(&self, installation_id: u64) -> anyhow::Result<InstallationToken>;

    /// Download location of the zipped logs of a workflow run.
    async fn run_logs_url(
        &self,
        token: &InstallationToken,
        repo: &RepoSlug,
        run_id: u64,
    ) -> anyhow::Result<String>;

    /// Posts `body` as a new pull request comment.
    async fn create_pr_comment(
        &self,
        token: &InstallationToken,
        repo: &RepoSlug,
        pr_number: u64,
        body: &str,
    ) -> anyhow::Result<()>;
}

/// REST client authenticating as a GitHub App.
pub struct GitHubAppClient {
    app_id: String,
    key: EncodingKey,
    api_base: String,
    http: reqwest::Client,
}

impl GitHubAppClient {
    /// `private_key_pem` is the App's RSA key in PEM form.
    pub fn new(
        app_id: impl Into<String>,
        private_key_pem: &[u8],
        api_base: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let app_id = app_id.into();
        if app_id.trim().is_empty() {
            return Err(anyhow!("github app id must not be empty"));
        }
        let key = EncodingKey::from_rsa_pem(private_key_pem).context("parse github app private key")?;
        // The logs endpoint answers with a redirect whose Location is the result.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(60))
            .redirect(redirect::Policy::none())
            .build()
            .context("build github HTTP client")?;
        Ok(Self {
            app_id,
            key,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn app_jwt(&self) -> anyhow::Result<String> {
        #[derive(Debug, Serialize)]
        struct Claims {
            iat: u64,
            exp: u64,
            iss: String,
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("system clock before unix epoch")?
            .as_secs();
        // Backdated to absorb clock drift against GitHub.
        let claims = Claims {
            iat: now.saturating_sub(60),
            exp: now + 540,
            iss: self.app_id.clone(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .context("sign github app jwt")
    }

    fn request(&self, method: reqwest::Method, path: &str, bearer: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_base, path))
            .bearer_auth(bearer)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header(header::USER_AGENT, USER_AGENT)
            .header("x-github-api-version", API_VERSION)
    }
}

#[async_trait]
impl ProvenanceClient for GitHubAppClient {
    async fn installation_token(&self, installation_id: u64) -> anyhow::Result<InstallationToken> {
        #[derive(Debug, Deserialize)]
        struct AccessTokenResponse {
            token: String,
        }

        let jwt = self.app_jwt()?;
        let resp: AccessTokenResponse = self
            .request(
                reqwest::Method::POST,
                &format!("/app/installations/{installation_id}/access_tokens"),
                &jwt,
            )
            .send()
            .await
            .context("request installation token")?
            .error_for_status()
            .context("request installation token status")?
            .json()
            .await
            .context("decode installation token")?;
        debug!(installation_id, "minted installation token");
        Ok(InstallationToken(resp.token))
    }

    async fn run_logs_url(
        &self,
        token: &InstallationToken,
        repo: &RepoSlug,
        run_id: u64,
    ) -> anyhow::Result<String> {
        let path = format!(
            "/repos/{}/{}/actions/runs/{run_id}/logs",
            repo.owner, repo.name
        );
        let resp = self
            .request(reqwest::Method::GET, &path, token.as_str())
            .send()
            .await
            .context("request run logs")?;

        if resp.status() != StatusCode::FOUND {
            resp.error_for_status_ref().context("request run logs status")?;
            return Err(anyhow!(
                "run logs for {repo}#{run_id}: expected redirect, got {}",
                resp.status()
            ));
        }
        let location = resp
            .headers()
            .get(header::LOCATION)
            .ok_or_else(|| anyhow!("run logs redirect without location"))?
            .to_str()
            .context("run logs location is not valid text")?;
        Ok(location.to_string())
    }

    async fn create_pr_comment(
        &self,
        token: &InstallationToken,
        repo: &RepoSlug,
        pr_number: u64,
        body: &str,
    ) -> anyhow::Result<()> {
        #[derive(Debug, Serialize)]
        struct CommentBody<'a> {
            body: &'a str,
        }

        let path = format!(
            "/repos/{}/{}/issues/{pr_number}/comments",
            repo.owner, repo.name
        );
        self.request(reqwest::Method::POST, &path, token.as_str())
            .json(&CommentBody { body })
            .send()
            .await
            .context("create pr comment")?
            .error_for_status()
            .context("create pr comment status")?;
        info!(repository = %repo, pr_number, "commented on pull request");
        Ok(())
    }
}
