//! stdhttp Broker Client Library
//!
//! HTTP client for the process broker, the per-process command loop built on
//! top of it, and the text relay that forwards output lines to a debug sink.

pub mod command_loop;
pub mod relay;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use stdhttp_common::config::{normalize_client_wait_timeout, WAIT_REQUEST_MARGIN};
use stdhttp_common::{
    BrokerError, BrokerResult, ProcessBroker, ProcessRecord, ProcessesBody, ProcessesBodyItem,
};

pub use command_loop::{CommandLoop, CommandSink, LoopExit, TracingSink};
pub use relay::TextRelay;

const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Builds the HTTP client shared by every outgoing stdhttp request.
pub fn http_client() -> BrokerResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(stdhttp_build_info::user_agent("stdhttp", CLIENT_VERSION))
        .build()
        .map_err(transport)
}

fn transport(err: reqwest::Error) -> BrokerError {
    BrokerError::Other(anyhow::Error::new(err))
}

fn unexpected(response: &Response) -> BrokerError {
    BrokerError::UnexpectedStatus(response.status().as_u16())
}

/// Talks to a broker's `/processes` collection over HTTP.
#[derive(Debug, Clone)]
pub struct BrokerClient {
    http: reqwest::Client,
    url: String,
    wait_timeout: Duration,
}

impl BrokerClient {
    /// `url` points at the collection, e.g. `http://localhost:8668/api/v1/processes`.
    pub fn new(url: impl Into<String>, wait_timeout: Duration) -> BrokerResult<Self> {
        Ok(Self::with_http_client(http_client()?, url, wait_timeout))
    }

    pub fn with_http_client(
        http: reqwest::Client,
        url: impl Into<String>,
        wait_timeout: Duration,
    ) -> Self {
        let url = url.into().trim_end_matches('/').to_string();
        Self {
            http,
            url,
            wait_timeout: normalize_client_wait_timeout(wait_timeout),
        }
    }

    /// Interval the broker holds a wait open for; also the retry backoff.
    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    fn process_url(&self, pid: u32) -> String {
        format!("{}/{}", self.url, pid)
    }

    fn command_url(&self, pid: u32) -> String {
        format!("{}/{}/command", self.url, pid)
    }

    /// Kills every process matching `pattern`. Succeeds even when nothing matched.
    pub async fn kill_many(&self, pattern: &str) -> BrokerResult<()> {
        let response = self
            .http
            .delete(&self.url)
            .query(&[("pattern", pattern)])
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(()),
            _ => Err(unexpected(&response)),
        }
    }
}

#[async_trait]
impl ProcessBroker for BrokerClient {
    async fn register(&self, process: ProcessRecord) -> BrokerResult<()> {
        let response = self
            .http
            .post(&self.url)
            .json(&ProcessesBodyItem::from(&process))
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            StatusCode::CREATED => Ok(()),
            StatusCode::CONFLICT => Err(BrokerError::AlreadyExists),
            _ => Err(unexpected(&response)),
        }
    }

    async fn kill(&self, pid: u32) -> BrokerResult<()> {
        let response = self
            .http
            .delete(self.process_url(pid))
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(()),
            StatusCode::NOT_FOUND => Err(BrokerError::NotFound),
            _ => Err(unexpected(&response)),
        }
    }

    async fn send_command(&self, pid: u32, command: String) -> BrokerResult<()> {
        let response = self
            .http
            .put(self.command_url(pid))
            .json(&command)
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(()),
            StatusCode::NOT_FOUND => Err(BrokerError::NotFound),
            StatusCode::CONFLICT => Err(BrokerError::Busy),
            _ => Err(unexpected(&response)),
        }
    }

    async fn wait_command(&self, pid: u32) -> BrokerResult<String> {
        // Outlive the broker's own wait so its 408 is what we normally see.
        let response = self
            .http
            .get(self.command_url(pid))
            .timeout(self.wait_timeout + WAIT_REQUEST_MARGIN)
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            StatusCode::OK => response.json::<String>().await.map_err(transport),
            StatusCode::GONE => Err(BrokerError::Killed),
            StatusCode::NOT_FOUND => Err(BrokerError::NotFound),
            StatusCode::REQUEST_TIMEOUT => Err(BrokerError::WaitTimeout),
            _ => Err(unexpected(&response)),
        }
    }

    async fn list(&self) -> BrokerResult<Vec<ProcessRecord>> {
        let response = self.http.get(&self.url).send().await.map_err(transport)?;

        match response.status() {
            StatusCode::OK => {
                let body: ProcessesBody = response.json().await.map_err(transport)?;
                Ok(body.into_records())
            }
            _ => Err(unexpected(&response)),
        }
    }
}
