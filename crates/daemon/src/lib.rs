#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Screenshot commenter daemon: stages CI submissions, verifies them against
//! run logs on a deferred re-invocation, publishes them and comments on the PR.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod gcp;
pub mod github;
pub mod http;
pub mod logs;
pub mod pipeline;
pub mod storage;
