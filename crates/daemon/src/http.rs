//! The HTTP boundary.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use commenter_core::model::{InboundRequest, StatusResponse};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::PipelineError;
use crate::pipeline::Pipeline;

/// Set by Cloud Tasks on every delivery; its presence marks a continuation.
pub const TASK_NAME_HEADER: &str = "x-cloudtasks-taskname";

/// Router state.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
}

/// Single `POST /` entry point for both phases.
pub fn router(pipeline: Arc<Pipeline>, max_body_bytes: usize) -> Router {
    let state = AppState { pipeline };
    Router::new()
        .route("/", post(invoke))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn invoke(
    State(st): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<StatusResponse>, PipelineError> {
    let task_name = headers
        .get(TASK_NAME_HEADER)
        .map(|v| v.to_str().unwrap_or("<non-utf8>"));
    let req = InboundRequest::from_parts(task_name, &body)?;

    match &req {
        InboundRequest::Initial(sub) => info!(
            phase = req.phase(),
            repository = sub.repository.as_deref().unwrap_or("-"),
            pr_number = ?sub.pr_number,
            run_id = ?sub.run_id,
            images = sub.images.as_ref().map_or(0, Vec::len),
            "invocation"
        ),
        InboundRequest::Continuation(c) => info!(
            phase = req.phase(),
            task = task_name.unwrap_or("-"),
            request_id = %c.request_id,
            "invocation"
        ),
    }

    st.pipeline.handle(req).await?;
    Ok(Json(StatusResponse::ok()))
}
