//! Fakes and fixtures shared by the daemon integration tests.
#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use base64::Engine;
use commenter_core::fingerprint::content_fingerprint;
use commenter_core::model::{ImageEntry, RepoSlug, SubmissionRequest};
use commenter_daemon::dispatch::InMemoryDispatcher;
use commenter_daemon::github::{InstallationToken, ProvenanceClient};
use commenter_daemon::logs::{ArchiveFetcher, ArchiveReader};
use commenter_daemon::pipeline::{Pipeline, PipelineConfig};
use commenter_daemon::storage::{InMemoryBlobStore, PublicationStore, StagingStore};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const STAGING: &str = "staging-bucket";
pub const PUBLIC: &str = "public-bucket";
pub const HOST: &str = "https://storage.googleapis.com";
pub const LOG_FILE: &str = "screenshots.txt";
pub const LOGS_URL: &str = "https://pipelines.example/logs/run-9001.zip";
pub const DELAY: Duration = Duration::from_secs(45);
pub const DEFAULT_INSTALLATION: u64 = 555;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedComment {
    pub repository: String,
    pub pr_number: u64,
    pub body: String,
}

#[derive(Default)]
pub struct FakeGitHub {
    pub fail_token: bool,
    pub installations: Mutex<Vec<u64>>,
    pub log_requests: Mutex<Vec<(String, u64)>>,
    pub comments: Mutex<Vec<PostedComment>>,
}

impl FakeGitHub {
    pub fn comments(&self) -> Vec<PostedComment> {
        self.comments.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProvenanceClient for FakeGitHub {
    async fn installation_token(&self, installation_id: u64) -> anyhow::Result<InstallationToken> {
        if self.fail_token {
            return Err(anyhow!("credential exchange refused"));
        }
        self.installations.lock().unwrap().push(installation_id);
        Ok(InstallationToken::new(format!("ghs_test_{installation_id}")))
    }

    async fn run_logs_url(
        &self,
        _token: &InstallationToken,
        repo: &RepoSlug,
        run_id: u64,
    ) -> anyhow::Result<String> {
        self.log_requests.lock().unwrap().push((repo.to_string(), run_id));
        Ok(LOGS_URL.to_string())
    }

    async fn create_pr_comment(
        &self,
        _token: &InstallationToken,
        repo: &RepoSlug,
        pr_number: u64,
        body: &str,
    ) -> anyhow::Result<()> {
        self.comments.lock().unwrap().push(PostedComment {
            repository: repo.to_string(),
            pr_number,
            body: body.to_string(),
        });
        Ok(())
    }
}

pub struct FakeFetcher {
    pub archive: Vec<u8>,
    pub opened: Mutex<Vec<String>>,
}

#[async_trait]
impl ArchiveFetcher for FakeFetcher {
    async fn open(&self, url: &str) -> anyhow::Result<ArchiveReader> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(Box::new(Cursor::new(self.archive.clone())))
    }
}

/// A zipped run log whose screenshot step printed `log_text`.
pub fn run_archive(log_text: &str) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    zip.add_directory("e2e/", options).unwrap();
    zip.start_file("e2e/1_Set up job.txt", options).unwrap();
    zip.write_all(b"Runner version 2.300\n").unwrap();
    zip.start_file(format!("e2e/4_{LOG_FILE}"), options).unwrap();
    zip.write_all(log_text.as_bytes()).unwrap();
    zip.start_file("e2e/9_Complete job.txt", options).unwrap();
    zip.write_all(b"Cleaning up orphan processes\n").unwrap();
    zip.finish().unwrap().into_inner()
}

/// Fake PNG bytes with their fingerprint and base64 form.
pub struct Shot {
    pub name: String,
    pub bytes: Vec<u8>,
    pub sha: String,
    pub base64: String,
}

pub fn shot(name: &str, seed: u8) -> Shot {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    bytes.extend(std::iter::repeat(seed).take(32));
    Shot {
        name: name.to_string(),
        sha: content_fingerprint(&bytes),
        base64: base64::engine::general_purpose::STANDARD.encode(&bytes),
        bytes,
    }
}

pub fn request(shots: &[&Shot]) -> SubmissionRequest {
    SubmissionRequest {
        pr_number: Some(42),
        repository: Some("octo/widgets".into()),
        run_id: Some(9001),
        log_filename: Some(LOG_FILE.into()),
        images: Some(
            shots
                .iter()
                .map(|s| ImageEntry {
                    name: Some(s.name.clone()),
                    content: Some(s.base64.clone()),
                    sha: Some(s.sha.clone()),
                })
                .collect(),
        ),
        installation_id: None,
    }
}

pub fn public_url(sha: &str) -> String {
    format!("{HOST}/{PUBLIC}/{sha}.png")
}

pub struct Harness {
    pub blobs: Arc<InMemoryBlobStore>,
    pub dispatcher: Arc<InMemoryDispatcher>,
    pub github: Arc<FakeGitHub>,
    pub fetcher: Arc<FakeFetcher>,
    pub pipeline: Arc<Pipeline>,
}

impl Harness {
    /// Pipeline whose run logs contain `log_text`.
    pub fn new(log_text: &str) -> Self {
        Self::with_github(log_text, FakeGitHub::default())
    }

    pub fn with_github(log_text: &str, github: FakeGitHub) -> Self {
        let blobs = Arc::new(InMemoryBlobStore::new());
        let dispatcher = Arc::new(InMemoryDispatcher::new());
        let github = Arc::new(github);
        let fetcher = Arc::new(FakeFetcher {
            archive: run_archive(log_text),
            opened: Mutex::new(vec![]),
        });
        let pipeline = Pipeline::new(
            StagingStore::new(blobs.clone(), STAGING),
            PublicationStore::new(blobs.clone(), PUBLIC, HOST, "public, max-age=31536000"),
            dispatcher.clone(),
            github.clone(),
            fetcher.clone(),
            PipelineConfig {
                function_url: "https://commenter.example/".into(),
                continuation_delay: DELAY,
                default_installation_id: DEFAULT_INSTALLATION,
            },
        );
        Self {
            blobs,
            dispatcher,
            github,
            fetcher,
            pipeline: Arc::new(pipeline),
        }
    }
}
