//! Blob storage: a private staging area and a public, content-addressed bucket.
//!
//! Both sit on top of the [`BlobStore`] capability so the pipeline can run
//! against Google Cloud Storage in production and an in-memory map in tests.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use commenter_core::model::{Image, Submission};
use flate2::{write::GzEncoder, Compression};
use reqwest::StatusCode;
use tracing::{debug, info};
use ulid::Ulid;

use crate::gcp::GcpAuth;

const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";

/// Per-object write settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOptions {
    /// `Content-Type` of the object.
    pub content_type: String,
    /// `Cache-Control` served with the object.
    pub cache_control: Option<String>,
    /// Store gzip-encoded; readers receive the decoded bytes.
    pub gzip: bool,
}

/// "put blob" / "get blob".
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Writes `bytes`, replacing any existing object.
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>, opts: &PutOptions) -> anyhow::Result<()>;

    /// Returns `None` when the object does not exist.
    async fn get(&self, bucket: &str, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
}

/// Google Cloud Storage over the XML API.
pub struct GcsBlobStore {
    host: String,
    auth: Arc<GcpAuth>,
    client: reqwest::Client,
}

impl GcsBlobStore {
    /// `host` is the XML API endpoint, e.g. `https://storage.googleapis.com`.
    pub fn new(host: impl Into<String>, auth: Arc<GcpAuth>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("build storage HTTP client")?;
        Ok(Self {
            host: host.into().trim_end_matches('/').to_string(),
            auth,
            client,
        })
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.host, bucket, key)
    }
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>, opts: &PutOptions) -> anyhow::Result<()> {
        let token = self.auth.token(&[STORAGE_SCOPE]).await?;
        let mut req = self
            .client
            .put(self.object_url(bucket, key))
            .bearer_auth(token)
            .header("content-type", &opts.content_type);
        if let Some(cc) = &opts.cache_control {
            req = req.header("cache-control", cc);
        }
        let body = if opts.gzip {
            req = req.header("content-encoding", "gzip");
            gzip(&bytes)?
        } else {
            bytes
        };

        req.body(body)
            .send()
            .await
            .with_context(|| format!("upload gs://{bucket}/{key}"))?
            .error_for_status()
            .with_context(|| format!("upload gs://{bucket}/{key} status"))?;
        debug!(bucket, key, "stored object");
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let token = self.auth.token(&[STORAGE_SCOPE]).await?;
        // Without Accept-Encoding, GCS serves gzip-encoded objects decompressed.
        let resp = self
            .client
            .get(self.object_url(bucket, key))
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("download gs://{bucket}/{key}"))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let bytes = resp
            .error_for_status()
            .with_context(|| format!("download gs://{bucket}/{key} status"))?
            .bytes()
            .await
            .with_context(|| format!("read gs://{bucket}/{key}"))?;
        Ok(Some(bytes.to_vec()))
    }
}

fn gzip(bytes: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(bytes).context("gzip object")?;
    enc.finish().context("gzip object")
}

/// A stored object as seen by [`InMemoryBlobStore`].
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Bytes as written, before any gzip.
    pub bytes: Vec<u8>,
    /// Options given at write time.
    pub options: PutOptions,
}

/// In-memory blob store for tests and local runs. Not durable.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    objects: Mutex<HashMap<(String, String), StoredObject>>,
}

impl InMemoryBlobStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The object at `bucket`/`key`, if written.
    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        let objects = self.objects.lock().unwrap_or_else(PoisonError::into_inner);
        objects.get(&(bucket.to_string(), key.to_string())).cloned()
    }

    /// Keys in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let objects = self.objects.lock().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>, opts: &PutOptions) -> anyhow::Result<()> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| anyhow!("blob store lock poisoned"))?;
        objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                bytes,
                options: opts.clone(),
            },
        );
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| anyhow!("blob store lock poisoned"))?;
        Ok(objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.bytes.clone()))
    }
}

/// Private holding area for submissions awaiting verification.
///
/// Records are written once and read by the continuation; deleting them is
/// left to the bucket's lifecycle rules.
pub struct StagingStore {
    store: Arc<dyn BlobStore>,
    bucket: String,
}

impl StagingStore {
    /// Records go to `bucket` on `store`.
    pub fn new(store: Arc<dyn BlobStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    /// Writes `submission` under `{request_id}.json`.
    pub async fn stage(&self, request_id: &str, submission: &Submission) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec(submission).context("serialize submission")?;
        let opts = PutOptions {
            content_type: "application/json".into(),
            cache_control: Some("private, no-store".into()),
            gzip: true,
        };
        self.store
            .put(&self.bucket, &record_key(request_id), bytes, &opts)
            .await
            .context("stage submission")
    }

    /// Loads a staged submission. Ids that are not ULIDs are never staged, so
    /// they resolve to `None` without touching the store.
    pub async fn load(&self, request_id: &str) -> anyhow::Result<Option<Submission>> {
        if Ulid::from_string(request_id).is_err() {
            return Ok(None);
        }
        let Some(bytes) = self
            .store
            .get(&self.bucket, &record_key(request_id))
            .await
            .context("load staged submission")?
        else {
            return Ok(None);
        };
        let submission = serde_json::from_slice(&bytes).context("decode staged submission")?;
        Ok(Some(submission))
    }
}

fn record_key(request_id: &str) -> String {
    format!("{request_id}.json")
}

/// Public bucket for verified screenshots.
pub struct PublicationStore {
    store: Arc<dyn BlobStore>,
    bucket: String,
    host: String,
    cache_control: String,
}

impl PublicationStore {
    /// Public URLs are `{host}/{bucket}/{key}`.
    pub fn new(
        store: Arc<dyn BlobStore>,
        bucket: impl Into<String>,
        host: impl Into<String>,
        cache_control: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            host: host.into().trim_end_matches('/').to_string(),
            cache_control: cache_control.into(),
        }
    }

    /// Uploads the decoded PNG and returns its public URL.
    pub async fn publish(&self, image: &Image, bytes: Vec<u8>) -> anyhow::Result<String> {
        let key = image.png_name();
        let opts = PutOptions {
            content_type: "image/png".into(),
            cache_control: Some(self.cache_control.clone()),
            gzip: false,
        };
        self.store
            .put(&self.bucket, &key, bytes, &opts)
            .await
            .with_context(|| format!("publish {}", image.name))?;
        let url = self.public_url(&key);
        info!(image = %image.name, %url, "published screenshot");
        Ok(url)
    }

    /// URL a published key is served from.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.host, self.bucket, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commenter_core::model::RepoSlug;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn submission() -> Submission {
        Submission {
            pr_number: 3,
            repository: RepoSlug {
                owner: "octo".into(),
                name: "widgets".into(),
            },
            run_id: 11,
            log_filename: "screenshots.txt".into(),
            images: vec![],
            installation_id: None,
        }
    }

    #[tokio::test]
    async fn staged_submission_round_trips() {
        let blobs = Arc::new(InMemoryBlobStore::new());
        let staging = StagingStore::new(blobs.clone(), "staging");
        let id = Ulid::new().to_string();

        staging.stage(&id, &submission()).await.unwrap();

        assert_eq!(blobs.keys("staging"), vec![format!("{id}.json")]);
        assert_eq!(staging.load(&id).await.unwrap(), Some(submission()));
    }

    #[tokio::test]
    async fn unknown_or_malformed_ids_load_nothing() {
        let staging = StagingStore::new(Arc::new(InMemoryBlobStore::new()), "staging");
        assert_eq!(staging.load(&Ulid::new().to_string()).await.unwrap(), None);
        assert_eq!(staging.load("../public/secret").await.unwrap(), None);
    }

    #[tokio::test]
    async fn publish_uses_png_name_and_public_url() {
        let blobs = Arc::new(InMemoryBlobStore::new());
        let public = PublicationStore::new(
            blobs.clone(),
            "public-shots",
            "https://storage.googleapis.com/",
            "public, max-age=60",
        );
        let image = Image {
            name: "home".into(),
            content: String::new(),
            sha: "abc123".into(),
        };

        let url = public.publish(&image, vec![1, 2, 3]).await.unwrap();

        assert_eq!(url, "https://storage.googleapis.com/public-shots/abc123.png");
        let stored = blobs.object("public-shots", "abc123.png").unwrap();
        assert_eq!(stored.bytes, vec![1, 2, 3]);
        assert_eq!(stored.options.content_type, "image/png");
        assert_eq!(stored.options.cache_control.as_deref(), Some("public, max-age=60"));
        assert!(!stored.options.gzip);
    }

    #[test]
    fn gzip_output_decodes_to_input() {
        let packed = gzip(b"{\"pr_number\":3}").unwrap();
        let mut out = String::new();
        GzDecoder::new(packed.as_slice()).read_to_string(&mut out).unwrap();
        assert_eq!(out, "{\"pr_number\":3}");
    }
}
