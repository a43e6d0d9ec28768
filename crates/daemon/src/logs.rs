//! Downloading run log archives and turning them into a log corpus.

use std::io;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use commenter_core::archive::extract_matching_entries;
use futures::TryStreamExt;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tracing::{debug, info};

/// A readable archive body.
pub type ArchiveReader = Box<dyn AsyncRead + Send + Unpin>;

/// "fetch blob" for log archives.
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    /// Opens `url` for reading from the start.
    async fn open(&self, url: &str) -> anyhow::Result<ArchiveReader>;
}

/// Streams archives over HTTPS without buffering the whole body.
pub struct HttpArchiveFetcher {
    client: reqwest::Client,
}

impl HttpArchiveFetcher {
    /// Builds the download client.
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()
            .context("build archive HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ArchiveFetcher for HttpArchiveFetcher {
    async fn open(&self, url: &str) -> anyhow::Result<ArchiveReader> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .context("download log archive")?
            .error_for_status()
            .context("download log archive status")?;
        let stream = resp.bytes_stream().map_err(io::Error::other);
        Ok(Box::new(StreamReader::new(Box::pin(stream))))
    }
}

/// Downloads the archive at `url` and returns the text of entries whose name
/// contains `log_filename`. Empty when no entry matched.
///
/// The body is spooled to an anonymous temp file rather than held in memory;
/// the file is removed when the handle drops.
pub async fn fetch_log_corpus(
    fetcher: &dyn ArchiveFetcher,
    url: &str,
    log_filename: &str,
) -> anyhow::Result<String> {
    let mut reader = fetcher.open(url).await?;

    let spool = tokio::task::spawn_blocking(tempfile::tempfile)
        .await
        .context("spool task failed")?
        .context("create archive spool file")?;
    let mut spool = tokio::fs::File::from_std(spool);
    let size = tokio::io::copy(&mut reader, &mut spool)
        .await
        .context("download log archive body")?;
    spool.flush().await.context("flush archive spool file")?;
    let spool = spool.into_std().await;
    debug!(bytes = size, "spooled log archive");

    // The zip reader is blocking.
    let target = log_filename.to_string();
    let corpus = tokio::task::spawn_blocking(move || extract_matching_entries(spool, &target))
        .await
        .context("log extraction task failed")?
        .context("extract log archive")?;
    info!(log_filename, bytes = corpus.len(), "assembled log corpus");
    Ok(corpus)
}
