#![forbid(unsafe_code)]

use std::future::Future;
use std::sync::Arc;

use commenter_daemon::{
    config::Config,
    dispatch::{CloudTasksConfig, CloudTasksDispatcher},
    gcp::GcpAuth,
    github::GitHubAppClient,
    http,
    logs::HttpArchiveFetcher,
    pipeline::{Pipeline, PipelineConfig},
    storage::{BlobStore, GcsBlobStore, PublicationStore, StagingStore},
};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args()?;

    tracing_subscriber::registry()
        .with(EnvFilter::new(&config.log))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    info!("starting daemon with config: {:?}", config);

    // Credentials are discovered on first use and shared by storage and queue.
    let gcp = Arc::new(GcpAuth::new());
    let blobs: Arc<dyn BlobStore> = Arc::new(GcsBlobStore::new(&config.storage_host, Arc::clone(&gcp))?);

    let dispatcher = CloudTasksDispatcher::new(
        CloudTasksConfig {
            project_id: config.gcp_project.clone(),
            location: config.queue_location.clone(),
            queue_name: config.queue_name.clone(),
            service_account_email: config.task_service_account.clone(),
        },
        Arc::clone(&gcp),
    )?;
    let github = GitHubAppClient::new(
        config.app_id.clone(),
        &config.private_key_pem,
        config.github_api_url.clone(),
    )?;

    let pipeline = Pipeline::new(
        StagingStore::new(Arc::clone(&blobs), config.staging_bucket.clone()),
        PublicationStore::new(
            blobs,
            config.public_bucket.clone(),
            config.storage_host.clone(),
            config.public_cache_control.clone(),
        ),
        Arc::new(dispatcher),
        Arc::new(github),
        Arc::new(HttpArchiveFetcher::new()?),
        PipelineConfig {
            function_url: config.function_url.clone(),
            continuation_delay: config.continuation_delay,
            default_installation_id: config.installation_id,
        },
    );

    let app = http::router(Arc::new(pipeline), config.max_body_bytes);

    info!(listen = %config.listen, "listening");
    axum::serve(tokio::net::TcpListener::bind(config.listen).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    wait_for_shutdown(signal::ctrl_c()).await;
}

/// Resolves when `signal` fires. If the handler could not be installed, never
/// resolves, so the server keeps running instead of shutting down at once.
async fn wait_for_shutdown(signal: impl Future<Output = std::io::Result<()>>) {
    match signal.await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => {
            warn!(error = %e, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    }
}
