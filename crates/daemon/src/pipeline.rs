//! The two-phase screenshot pipeline.
//!
//! An initial submission is only checked for structural completeness, staged
//! privately and followed by a deferred task. The continuation, delivered by
//! the queue once the run's logs are downloadable, does the actual work:
//! every image's recomputed fingerprint must appear in the run logs before it
//! is published, and the PR comment is posted only when all of them passed.
//!
//! Two things are accepted as-is:
//! - images published before a failing one stay public (no rollback);
//! - a redelivered continuation publishes and comments again.

use std::sync::Arc;
use std::time::Duration;

use commenter_core::{
    fingerprint::{content_fingerprint, corpus_contains, decode_content},
    model::{DeferredTask, InboundRequest, RequestId, Submission},
    new_ulid, now_unix,
    validation::validate_submission,
};
use tracing::{info, warn};

use crate::dispatch::DeferredDispatcher;
use crate::error::PipelineError;
use crate::github::ProvenanceClient;
use crate::logs::{fetch_log_corpus, ArchiveFetcher};
use crate::storage::{PublicationStore, StagingStore};

/// Knobs the pipeline reads at run time.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// URL the deferred task re-invokes.
    pub function_url: String,
    /// Minimum wait before the continuation runs.
    pub continuation_delay: Duration,
    /// Used when a submission names no installation.
    pub default_installation_id: u64,
}

/// What an invocation achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Initial call: staged and scheduled.
    Staged {
        /// Id carried by the deferred task.
        request_id: RequestId,
    },
    /// Continuation: every image verified, published and commented.
    Published {
        /// Public URLs in submission order.
        urls: Vec<String>,
    },
}

/// Both phases over injected storage, queue and GitHub handles.
pub struct Pipeline {
    staging: StagingStore,
    publication: PublicationStore,
    dispatcher: Arc<dyn DeferredDispatcher>,
    github: Arc<dyn ProvenanceClient>,
    fetcher: Arc<dyn ArchiveFetcher>,
    config: PipelineConfig,
}

impl Pipeline {
    /// Wires the pipeline from its collaborators.
    pub fn new(
        staging: StagingStore,
        publication: PublicationStore,
        dispatcher: Arc<dyn DeferredDispatcher>,
        github: Arc<dyn ProvenanceClient>,
        fetcher: Arc<dyn ArchiveFetcher>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            staging,
            publication,
            dispatcher,
            github,
            fetcher,
            config,
        }
    }

    /// Runs whichever phase `req` belongs to.
    pub async fn handle(&self, req: InboundRequest) -> Result<Outcome, PipelineError> {
        match req {
            InboundRequest::Initial(raw) => {
                let submission = validate_submission(&raw)?;
                self.submit(submission).await
            }
            InboundRequest::Continuation(c) => self.resume(&c.request_id).await,
        }
    }

    /// Stages a submission and schedules its continuation.
    pub async fn submit(&self, submission: Submission) -> Result<Outcome, PipelineError> {
        let request_id = new_ulid().to_string();
        self.staging.stage(&request_id, &submission).await?;

        let task = DeferredTask {
            target_url: self.config.function_url.clone(),
            request_id: request_id.clone(),
            not_before_unix: now_unix() + self.config.continuation_delay.as_secs() as i64,
        };
        self.dispatcher.schedule(&task).await?;

        info!(
            %request_id,
            repository = %submission.repository,
            pr_number = submission.pr_number,
            run_id = submission.run_id,
            images = submission.images.len(),
            "submission staged"
        );
        Ok(Outcome::Staged { request_id })
    }

    /// Verifies a staged submission against its run logs, publishes the
    /// images in order and comments on the pull request.
    pub async fn resume(&self, request_id: &str) -> Result<Outcome, PipelineError> {
        let submission = self
            .staging
            .load(request_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(request_id.to_string()))?;
        let repo = &submission.repository;
        let installation_id = submission
            .installation_id
            .unwrap_or(self.config.default_installation_id);

        let token = self.github.installation_token(installation_id).await?;
        let logs_url = self
            .github
            .run_logs_url(&token, repo, submission.run_id)
            .await?;
        let corpus =
            fetch_log_corpus(self.fetcher.as_ref(), &logs_url, &submission.log_filename).await?;

        let mut comment = String::new();
        let mut urls = Vec::with_capacity(submission.images.len());
        for image in &submission.images {
            let bytes = decode_content(&image.content)?;
            let fingerprint = content_fingerprint(&bytes);
            if !corpus_contains(&corpus, &fingerprint) {
                warn!(
                    %request_id,
                    image = %image.name,
                    published = urls.len(),
                    "fingerprint missing from run logs; stopping batch"
                );
                return Err(PipelineError::ShaNotFound {
                    image: image.name.clone(),
                    fingerprint,
                });
            }
            let url = self.publication.publish(image, bytes).await?;
            comment.push_str(&render_image_section(&image.name, &url));
            urls.push(url);
        }

        self.github
            .create_pr_comment(&token, repo, submission.pr_number, &comment)
            .await?;
        info!(%request_id, repository = %repo, pr_number = submission.pr_number, images = urls.len(), "submission published");
        Ok(Outcome::Published { urls })
    }
}

/// Markdown for one screenshot in the PR comment.
pub fn render_image_section(name: &str, url: &str) -> String {
    format!("### {name}\n\n![{name}]({url})\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_section_embeds_public_url() {
        assert_eq!(
            render_image_section("Login page", "https://storage.googleapis.com/b/ab.png"),
            "### Login page\n\n![Login page](https://storage.googleapis.com/b/ab.png)\n\n"
        );
    }
}
