//! Process configuration from flags and environment.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use base64::Engine;
use clap::Parser;

/// Runtime configuration. `Debug` never prints the private key.
#[derive(Clone)]
pub struct Config {
    /// Address the HTTP server binds.
    pub listen: SocketAddr,
    /// Env-filter directive for logging.
    pub log: String,

    /// GitHub App id, the `iss` of app JWTs.
    pub app_id: String,
    /// PEM bytes of the GitHub App private key.
    pub private_key_pem: Vec<u8>,
    /// Default installation.
    pub installation_id: u64,
    /// REST API base, without trailing slash.
    pub github_api_url: String,

    /// Private staging bucket.
    pub staging_bucket: String,
    /// Public screenshot bucket.
    pub public_bucket: String,
    /// Storage endpoint; also the prefix of public URLs.
    pub storage_host: String,
    /// `Cache-Control` of published screenshots.
    pub public_cache_control: String,

    /// Self URL targeted by the deferred task.
    pub function_url: String,
    /// Cloud Tasks project.
    pub gcp_project: String,
    /// Cloud Tasks region.
    pub queue_location: String,
    /// Cloud Tasks queue.
    pub queue_name: String,
    /// OIDC identity attached to delivered tasks.
    pub task_service_account: Option<String>,
    /// Minimum wait before a continuation runs.
    pub continuation_delay: Duration,

    /// Request body limit in bytes.
    pub max_body_bytes: usize,
}

#[derive(Parser, Debug)]
#[command(name = "commenter-daemon", version, about = "Verifies CI screenshots against run logs and posts them to the PR")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,
    /// Log level (env-filter syntax).
    #[arg(long, env = "LOG", default_value = "info")]
    log: String,

    /// GitHub App id.
    #[arg(long, env = "APP_ID")]
    app_id: String,
    /// Base64-encoded PEM private key of the GitHub App.
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    private_key: String,
    /// Installation used when a submission names none.
    #[arg(long, env = "INSTALLATION_ID")]
    installation_id: u64,
    #[arg(long, env = "GITHUB_API_URL", default_value = "https://api.github.com")]
    github_api_url: String,

    /// Private bucket holding submissions until verification.
    #[arg(long, env = "STAGING_BUCKET")]
    staging_bucket: String,
    /// Public bucket verified screenshots are published to.
    #[arg(long, env = "PUBLIC_BUCKET")]
    public_bucket: String,
    #[arg(long, env = "STORAGE_HOST", default_value = "https://storage.googleapis.com")]
    storage_host: String,
    #[arg(long, env = "PUBLIC_CACHE_CONTROL", default_value = "public, max-age=31536000")]
    public_cache_control: String,

    /// Public URL of this service; continuations are delivered here.
    #[arg(long, env = "FUNCTION_URL")]
    function_url: String,
    #[arg(long, env = "GCP_PROJECT")]
    gcp_project: String,
    #[arg(long, env = "QUEUE_LOCATION")]
    queue_location: String,
    #[arg(long, env = "QUEUE_NAME")]
    queue_name: String,
    /// Service account whose OIDC token authenticates continuations.
    #[arg(long, env = "TASK_SERVICE_ACCOUNT")]
    task_service_account: Option<String>,
    /// Seconds to wait before verifying, so the run's logs are downloadable.
    #[arg(long, env = "CONTINUATION_DELAY_SECS", default_value_t = 60)]
    continuation_delay_secs: u64,

    #[arg(long, env = "MAX_BODY_BYTES", default_value_t = 32 * 1024 * 1024)]
    max_body_bytes: usize,
}

impl Config {
    /// Parses flags and environment into a validated configuration.
    pub fn from_args() -> anyhow::Result<Self> {
        Self::from_parsed(Args::parse())
    }

    fn from_parsed(a: Args) -> anyhow::Result<Self> {
        let private_key_pem = base64::engine::general_purpose::STANDARD
            .decode(a.private_key.trim())
            .context("PRIVATE_KEY is not valid base64")?;

        Ok(Self {
            listen: a.listen,
            log: a.log,
            app_id: a.app_id,
            private_key_pem,
            installation_id: a.installation_id,
            github_api_url: a.github_api_url,
            staging_bucket: a.staging_bucket,
            public_bucket: a.public_bucket,
            storage_host: a.storage_host,
            public_cache_control: a.public_cache_control,
            function_url: a.function_url,
            gcp_project: a.gcp_project,
            queue_location: a.queue_location,
            queue_name: a.queue_name,
            task_service_account: a.task_service_account,
            continuation_delay: Duration::from_secs(a.continuation_delay_secs),
            max_body_bytes: a.max_body_bytes,
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("listen", &self.listen)
            .field("log", &self.log)
            .field("app_id", &self.app_id)
            .field("private_key_pem", &"<redacted>")
            .field("installation_id", &self.installation_id)
            .field("github_api_url", &self.github_api_url)
            .field("staging_bucket", &self.staging_bucket)
            .field("public_bucket", &self.public_bucket)
            .field("storage_host", &self.storage_host)
            .field("public_cache_control", &self.public_cache_control)
            .field("function_url", &self.function_url)
            .field("gcp_project", &self.gcp_project)
            .field("queue_location", &self.queue_location)
            .field("queue_name", &self.queue_name)
            .field("task_service_account", &self.task_service_account)
            .field("continuation_delay", &self.continuation_delay)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}
