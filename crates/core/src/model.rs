use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque id under which a submission is staged (ULID as string by convention).
pub type RequestId = String;

/// Webhook payload as posted by a CI workflow.
///
/// Every field is optional on the wire so that a missing one can be reported
/// by name instead of failing deserialization as a whole.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmissionRequest {
    /// Pull request the screenshots belong to.
    pub pr_number: Option<u64>,
    /// Repository slug, `owner/name`.
    pub repository: Option<String>,
    /// Workflow run whose logs attest the screenshots.
    pub run_id: Option<u64>,
    /// Name (or name fragment) of the log entries to search.
    pub log_filename: Option<String>,
    /// Screenshots in the order they should appear in the comment.
    pub images: Option<Vec<ImageEntry>>,
    /// Overrides the configured GitHub App installation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installation_id: Option<u64>,
}

/// One screenshot as posted on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageEntry {
    /// Display label.
    pub name: Option<String>,
    /// Base64-encoded PNG.
    pub content: Option<String>,
    /// Fingerprint claimed by the submitter.
    pub sha: Option<String>,
}

/// A structurally complete submission, ready to be staged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Submission {
    /// Pull request to comment on.
    pub pr_number: u64,
    /// Repository hosting the pull request and the run.
    pub repository: RepoSlug,
    /// Workflow run whose logs must attest every image.
    pub run_id: u64,
    /// Fragment matched against log archive entry paths.
    pub log_filename: String,
    /// Screenshots, in comment order. Never empty.
    pub images: Vec<Image>,
    /// Installation override; the configured default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installation_id: Option<u64>,
}

/// A screenshot inside a validated submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Image {
    /// Label used as the comment heading.
    pub name: String,
    /// Base64-encoded PNG, decoded only during the continuation.
    pub content: String,
    /// Claimed fingerprint. Names the published blob; never used for verification.
    pub sha: String,
}

impl Image {
    /// Object key the image is published under.
    pub fn png_name(&self) -> String {
        format!("{}.png", self.sha)
    }
}

/// `owner/name` repository identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoSlug {
    /// User or organization.
    pub owner: String,
    /// Repository name.
    pub name: String,
}

/// A repository string that is not `owner/name`.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("repository must look like owner/name (got {0:?})")]
pub struct RepoSlugError(pub String);

impl FromStr for RepoSlug {
    type Err = RepoSlugError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(RepoSlugError(s.to_string())),
        }
    }
}

impl TryFrom<String> for RepoSlug {
    type Error = RepoSlugError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RepoSlug> for String {
    fn from(value: RepoSlug) -> Self {
        value.to_string()
    }
}

impl fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Body of the deferred re-invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContinuationRequest {
    /// Id the submission was staged under.
    pub request_id: RequestId,
}

/// An inbound call, classified at the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundRequest {
    /// First delivery from CI: stage and schedule.
    Initial(SubmissionRequest),
    /// Queue redelivery: verify, publish, comment.
    Continuation(ContinuationRequest),
}

impl InboundRequest {
    /// Classifies a request body. The presence of a queue task name marks a continuation.
    pub fn from_parts(task_name: Option<&str>, body: &[u8]) -> Result<Self, serde_json::Error> {
        match task_name {
            Some(_) => Ok(Self::Continuation(serde_json::from_slice(body)?)),
            None => Ok(Self::Initial(serde_json::from_slice(body)?)),
        }
    }

    /// Short label for logs.
    pub fn phase(&self) -> &'static str {
        match self {
            Self::Initial(_) => "initial",
            Self::Continuation(_) => "continuation",
        }
    }
}

/// A scheduled re-invocation of the entry point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeferredTask {
    /// URL the queue will POST to.
    pub target_url: String,
    /// Staged submission to resume.
    pub request_id: RequestId,
    /// Earliest delivery time, unix seconds.
    pub not_before_unix: i64,
}

impl DeferredTask {
    /// JSON body delivered back to the entry point.
    pub fn body(&self) -> ContinuationRequest {
        ContinuationRequest {
            request_id: self.request_id.clone(),
        }
    }
}

/// `{"status": ...}` response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    /// `ok`, or the reason verification stopped.
    pub status: String,
}

impl StatusResponse {
    /// The success body.
    pub fn ok() -> Self {
        Self {
            status: "ok".into(),
        }
    }
}

/// `{"message": ...}` response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageResponse {
    /// Human-readable error.
    pub message: String,
}
