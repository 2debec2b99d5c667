use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, put},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize};
use stdhttp_common::{
    output::SharedWriter, BrokerError, ProcessBroker, ProcessPattern, ProcessRecord,
    ProcessesBody, ProcessesBodyItem,
};
use tower_http::trace::TraceLayer;

/// Shared state handed to every protocol handler.
#[derive(Clone)]
pub struct HttpState {
    inner: Arc<HttpStateInner>,
}

struct HttpStateInner {
    broker: Arc<dyn ProcessBroker>,
    audit: SharedWriter,
    protected_pid: Option<u32>,
}

impl HttpState {
    pub fn new(broker: Arc<dyn ProcessBroker>, audit: SharedWriter) -> Self {
        Self::with_protected_pid(broker, audit, parent_pid())
    }

    /// `protected_pid` is never killed by a pattern kill.
    pub fn with_protected_pid(
        broker: Arc<dyn ProcessBroker>,
        audit: SharedWriter,
        protected_pid: Option<u32>,
    ) -> Self {
        Self {
            inner: Arc::new(HttpStateInner {
                broker,
                audit,
                protected_pid,
            }),
        }
    }

    fn broker(&self) -> &Arc<dyn ProcessBroker> {
        &self.inner.broker
    }

    fn audit(&self, line: impl AsRef<str>) {
        let _ = self.inner.audit.write_line(line.as_ref());
    }

    fn is_protected(&self, pid: u32) -> bool {
        self.inner.protected_pid == Some(pid)
    }
}

#[cfg(unix)]
fn parent_pid() -> Option<u32> {
    Some(std::os::unix::process::parent_id())
}

#[cfg(not(unix))]
fn parent_pid() -> Option<u32> {
    None
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Broker(BrokerError),
}

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        Self::Broker(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            ApiError::Broker(err) => {
                let status = match &err {
                    BrokerError::AlreadyExists | BrokerError::Busy => StatusCode::CONFLICT,
                    BrokerError::NotFound => StatusCode::NOT_FOUND,
                    BrokerError::Killed => StatusCode::GONE,
                    BrokerError::WaitTimeout => StatusCode::REQUEST_TIMEOUT,
                    BrokerError::UnexpectedStatus(_) | BrokerError::Other(_) => {
                        tracing::error!("Broker request failed: {:#}", err);
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, err.to_string()).into_response()
            }
        }
    }
}

/// Routes of the broker protocol, relative to the API prefix.
pub fn router(state: HttpState) -> Router {
    Router::new()
        .route(
            "/processes",
            get(list_processes)
                .post(register_process)
                .delete(kill_many_processes),
        )
        .route("/processes/:pid", delete(kill_process))
        .route(
            "/processes/:pid/command",
            put(send_command).get(wait_command),
        )
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
}

fn parse_pid(raw: &str) -> Result<u32, ApiError> {
    raw.parse()
        .map_err(|err| ApiError::BadRequest(format!("invalid pid '{raw}': {err}")))
}

fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|err| ApiError::BadRequest(err.to_string()))
}

async fn register_process(
    Extension(state): Extension<HttpState>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let item: ProcessesBodyItem = parse_json(&body)?;
    let process = ProcessRecord {
        expired: false,
        ..ProcessRecord::from(item)
    };
    let pid = process.pid;

    state.broker().register(process).await?;
    state.audit(format!("process '{pid}': registered"));
    Ok(StatusCode::CREATED)
}

#[derive(Debug, Default, Deserialize)]
struct KillManyQuery {
    #[serde(default)]
    pattern: String,
}

async fn kill_many_processes(
    Extension(state): Extension<HttpState>,
    Query(query): Query<KillManyQuery>,
) -> Result<StatusCode, ApiError> {
    let pattern = ProcessPattern::new(&query.pattern);
    let processes = state.broker().list().await?;
    for process in processes.iter().filter(|process| pattern.matches(process)) {
        if state.is_protected(process.pid) {
            continue;
        }
        match state.broker().kill(process.pid).await {
            Ok(()) => state.audit(format!("kill '{}': success", process.pid)),
            Err(BrokerError::NotFound) => continue,
            Err(err) => {
                state.audit(format!("kill '{}': error", process.pid));
                return Err(BrokerError::Other(anyhow::Error::new(err)).into());
            }
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn kill_process(
    Extension(state): Extension<HttpState>,
    Path(pid): Path<String>,
) -> Result<StatusCode, ApiError> {
    let pid = parse_pid(&pid)?;
    match state.broker().kill(pid).await {
        Ok(()) => {
            state.audit(format!("kill '{pid}': success"));
            Ok(StatusCode::NO_CONTENT)
        }
        Err(BrokerError::NotFound) => {
            state.audit(format!("kill '{pid}': process not found"));
            Err(BrokerError::NotFound.into())
        }
        Err(err) => {
            state.audit(format!("kill '{pid}': error"));
            Err(err.into())
        }
    }
}

async fn send_command(
    Extension(state): Extension<HttpState>,
    Path(pid): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let pid = parse_pid(&pid)?;
    let command: String = parse_json(&body)?;

    let outcome = state.broker().send_command(pid, command.clone()).await;
    let summary = match &outcome {
        Ok(()) => "success",
        Err(BrokerError::NotFound) => "process not found",
        Err(BrokerError::Busy) => "process busy",
        Err(_) => "unexpected error",
    };
    state.audit(format!(
        "send command '{command}' to process '{pid}': {summary}"
    ));

    outcome?;
    Ok(StatusCode::NO_CONTENT)
}

async fn wait_command(
    Extension(state): Extension<HttpState>,
    Path(pid): Path<String>,
) -> Result<Json<String>, ApiError> {
    let pid = parse_pid(&pid)?;
    match state.broker().wait_command(pid).await {
        Ok(command) => {
            state.audit(format!("process '{pid}': received command '{command}'"));
            Ok(Json(command))
        }
        Err(err) => {
            let reason = match &err {
                BrokerError::WaitTimeout => None,
                BrokerError::NotFound => Some("process not found"),
                BrokerError::Killed => Some("process killed"),
                _ => Some("unexpected error"),
            };
            if let Some(reason) = reason {
                state.audit(format!("process '{pid}': wait error: {reason}"));
            }
            Err(err.into())
        }
    }
}

async fn list_processes(
    Extension(state): Extension<HttpState>,
) -> Result<Json<ProcessesBody>, ApiError> {
    let processes = state.broker().list().await?;
    state.audit("list: success");
    Ok(Json(ProcessesBody::from_records(&processes)))
}
