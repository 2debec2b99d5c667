use std::io;

use stdhttp_common::output::SharedWriter;
use stdhttp_common::{BrokerResult, PostTextBody};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::http_client;

/// Posts output lines, one `PostTextBody` item per request, to a debug sink.
#[derive(Debug, Clone)]
pub struct TextRelay {
    http: reqwest::Client,
    url: String,
    source: &'static str,
}

impl TextRelay {
    pub fn new(url: impl Into<String>, source: &'static str) -> BrokerResult<Self> {
        Ok(Self::with_http_client(http_client()?, url, source))
    }

    pub fn with_http_client(
        http: reqwest::Client,
        url: impl Into<String>,
        source: &'static str,
    ) -> Self {
        Self {
            http,
            url: url.into(),
            source,
        }
    }

    /// Never fails; relay problems are only logged.
    pub async fn post_line(&self, line: &str) {
        let body = PostTextBody::new(self.source, [line]);
        match self.http.post(&self.url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                debug!(url = %self.url, status = %response.status(), "Relay rejected line")
            }
            Err(err) => debug!(url = %self.url, error = %err, "Failed to relay line"),
        }
    }
}

/// Copies `reader` line by line to `output`, mirroring each line to `relay`.
///
/// Bytes reach `output` unchanged; only the relayed copy is decoded, lossily.
/// Returns when the reader reaches EOF or `cancel` fires.
pub async fn relay_lines<R>(
    reader: R,
    output: &SharedWriter,
    relay: Option<&TextRelay>,
    cancel: &CancellationToken,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        let read = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            read = reader.read_until(b'\n', &mut line) => read?,
        };
        if read == 0 {
            return Ok(());
        }
        if line.last() != Some(&b'\n') {
            line.push(b'\n');
        }
        output.write_all(&line)?;
        if let Some(relay) = relay {
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            relay.post_line(text.trim_end_matches('\r')).await;
        }
    }
}
