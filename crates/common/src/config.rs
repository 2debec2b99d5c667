//! Defaults and value parsers shared by the daemon, the client and the CLI.

use std::time::Duration;

pub const DEFAULT_BROKER_ADDRESS: &str = "localhost:8668";
pub const DEFAULT_BROKER_URL: &str = "http://localhost:8668/api/v1/processes";
pub const DEFAULT_DEBUG_ADDRESS: &str = "localhost:8888";
pub const DEFAULT_DEBUG_URL: &str = "http://localhost:8888/";
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Route prefix under which the broker protocol is mounted.
pub const API_PREFIX: &str = "/api/v1";

/// Extra time a client grants a long-poll request on top of the broker's own
/// wait timeout, so the broker's answer normally arrives first.
pub const WAIT_REQUEST_MARGIN: Duration = Duration::from_secs(1);

/// Broker-side floor: anything at or below one second falls back to the default.
pub fn normalize_broker_wait_timeout(timeout: Duration) -> Duration {
    if timeout <= Duration::from_secs(1) {
        DEFAULT_WAIT_TIMEOUT
    } else {
        timeout
    }
}

/// Client-side floor: only a zero timeout falls back to the default.
pub fn normalize_client_wait_timeout(timeout: Duration) -> Duration {
    if timeout.is_zero() {
        DEFAULT_WAIT_TIMEOUT
    } else {
        timeout
    }
}

/// Parses durations such as `250ms`, `10s`, `1m30s` or `2h`. A bare `0` is
/// accepted as zero.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let input = raw.trim();
    if input == "0" {
        return Ok(Duration::ZERO);
    }
    humantime::parse_duration(input).map_err(|err| format!("invalid duration '{input}': {err}"))
}
