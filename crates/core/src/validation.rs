use thiserror::Error;

use crate::model::{Image, ImageEntry, RepoSlug, RepoSlugError, Submission, SubmissionRequest};

/// Why a submission was rejected before staging.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A top-level field is absent (or empty, for `log_filename`).
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    /// An image lacks `content` or `sha`.
    #[error("missing required field: images[{index}].{field}")]
    MissingImageField {
        /// Position in `images`.
        index: usize,
        /// Name of the absent field.
        field: &'static str,
    },
    /// An image field has characters it cannot carry.
    #[error("invalid field: images[{index}].{field} must be alphanumeric")]
    InvalidImageField {
        /// Position in `images`.
        index: usize,
        /// Name of the offending field.
        field: &'static str,
    },
    /// `images` is present but empty.
    #[error("images must not be empty")]
    NoImages,
    /// `repository` is not `owner/name`.
    #[error(transparent)]
    Repository(#[from] RepoSlugError),
}

/// Checks that a submission is structurally complete.
///
/// Image content is not inspected here; it is only decoded and fingerprinted
/// once the run logs are available.
pub fn validate_submission(req: &SubmissionRequest) -> Result<Submission, ValidationError> {
    let pr_number = req.pr_number.ok_or(ValidationError::MissingField("pr_number"))?;
    let repository = req
        .repository
        .as_deref()
        .ok_or(ValidationError::MissingField("repository"))?;
    let run_id = req.run_id.ok_or(ValidationError::MissingField("run_id"))?;
    let log_filename = req
        .log_filename
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or(ValidationError::MissingField("log_filename"))?;
    let entries = req
        .images
        .as_ref()
        .ok_or(ValidationError::MissingField("images"))?;

    let repository: RepoSlug = repository.parse()?;

    if entries.is_empty() {
        return Err(ValidationError::NoImages);
    }
    let images = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| validate_image(index, entry))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Submission {
        pr_number,
        repository,
        run_id,
        log_filename: log_filename.to_string(),
        images,
        installation_id: req.installation_id,
    })
}

fn validate_image(index: usize, entry: &ImageEntry) -> Result<Image, ValidationError> {
    let content = entry
        .content
        .clone()
        .ok_or(ValidationError::MissingImageField { index, field: "content" })?;
    let sha = entry
        .sha
        .clone()
        .filter(|s| !s.is_empty())
        .ok_or(ValidationError::MissingImageField { index, field: "sha" })?;
    // The claimed sha becomes a public object key.
    if !sha.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidImageField { index, field: "sha" });
    }
    // Labels are cosmetic; fall back to the fingerprint.
    let name = entry.name.clone().unwrap_or_else(|| sha.clone());
    Ok(Image { name, content, sha })
}
