//! Debug text sink: accepts relayed output lines and re-emits them locally.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::Extension,
    http::{Method, StatusCode, Uri},
    routing::post,
    Router,
};
use stdhttp_common::{
    models::{SOURCE_STDERR, SOURCE_STDOUT},
    output::SharedWriter,
    PostTextBody,
};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

#[derive(Clone)]
pub struct DebugSinkState {
    inner: Arc<DebugSinkInner>,
}

struct DebugSinkInner {
    stdout: SharedWriter,
    stderr: SharedWriter,
}

impl DebugSinkState {
    pub fn new(stdout: SharedWriter, stderr: SharedWriter) -> Self {
        Self {
            inner: Arc::new(DebugSinkInner { stdout, stderr }),
        }
    }

    fn emit(&self, body: &PostTextBody) {
        for item in &body.items {
            let writer = match item.source.as_str() {
                SOURCE_STDOUT => &self.inner.stdout,
                SOURCE_STDERR => &self.inner.stderr,
                source => {
                    warn!(source, "Unknown source");
                    continue;
                }
            };
            let _ = writer.write_line(&item.message);
        }
    }
}

pub fn router(state: DebugSinkState) -> Router {
    Router::new()
        .route("/", post(post_text))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
}

async fn post_text(
    Extension(state): Extension<DebugSinkState>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> StatusCode {
    if body.is_empty() {
        error!(%method, %uri, "Request received without body");
        return StatusCode::BAD_REQUEST;
    }

    let body: PostTextBody = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(err) => {
            error!(
                %method,
                %uri,
                error = %err,
                body = %String::from_utf8_lossy(&body),
                "Request received with invalid body format"
            );
            return StatusCode::BAD_REQUEST;
        }
    };

    debug!(%method, %uri, items = body.items.len(), "Request received");
    state.emit(&body);
    StatusCode::NO_CONTENT
}
