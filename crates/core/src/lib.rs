#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Shared models and verification logic for the screenshot commenter.
//!
//! Everything in this crate is free of network I/O: the daemon feeds it bytes
//! and readers obtained from the outside world.

pub mod archive;
pub mod fingerprint;
/// Wire payloads, staged records and queue task descriptions.
pub mod model;
/// Structural checks on incoming submissions.
pub mod validation;

mod util;

pub use util::{new_ulid, now_unix};
