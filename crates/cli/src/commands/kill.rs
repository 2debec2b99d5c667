use anyhow::{Context, Result};
use stdhttp_common::output::Output;
use stdhttp_common::{BrokerError, ProcessBroker};
use stdhttpd_client::BrokerClient;

/// What `stdhttp kill` was asked to kill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillTarget {
    Pid(i64),
    Pattern(String),
}

impl KillTarget {
    /// Integers, including `0x`/`0o`/`0b` and leading-zero octal forms, are
    /// pids. Everything else is a glob pattern.
    pub fn parse(raw: &str) -> Self {
        match parse_integer(raw) {
            Some(pid) => Self::Pid(pid),
            None => Self::Pattern(raw.to_string()),
        }
    }
}

fn parse_integer(raw: &str) -> Option<i64> {
    let (negative, unsigned) = match raw.as_bytes().first()? {
        b'-' => (true, &raw[1..]),
        b'+' => (false, &raw[1..]),
        _ => (false, raw),
    };

    let lower = unsigned.get(..2).map(str::to_ascii_lowercase);
    let (radix, digits) = match lower.as_deref() {
        Some("0x") => (16, &unsigned[2..]),
        Some("0o") => (8, &unsigned[2..]),
        Some("0b") => (2, &unsigned[2..]),
        _ if unsigned.len() > 1 && unsigned.starts_with('0') => (8, &unsigned[1..]),
        _ => (10, unsigned),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }

    let magnitude = i64::from_str_radix(digits, radix).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

pub async fn kill(broker_url: &str, target: &KillTarget, output: &Output) -> Result<()> {
    let writer = output
        .open_shared()
        .with_context(|| format!("Error creating stdout output {:?}", output))?;
    let client = BrokerClient::new(broker_url, std::time::Duration::ZERO)?;

    let outcome = match target {
        KillTarget::Pid(pid) => match u32::try_from(*pid) {
            Ok(pid) => client.kill(pid).await,
            Err(_) => Err(BrokerError::NotFound),
        },
        KillTarget::Pattern(pattern) => client.kill_many(pattern).await,
    };

    let message = match (outcome, target) {
        (Err(BrokerError::NotFound), _) => "Process not found",
        (Err(err), _) => return Err(err).context("Error killing processes"),
        (Ok(()), KillTarget::Pid(_)) => "Process killed",
        (Ok(()), KillTarget::Pattern(_)) => "Processes killed",
    };
    writer.write_line(message).context("Error writing output")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_and_prefixed_integers_are_pids() {
        assert_eq!(KillTarget::parse("1234"), KillTarget::Pid(1234));
        assert_eq!(KillTarget::parse("0x1F"), KillTarget::Pid(31));
        assert_eq!(KillTarget::parse("0o17"), KillTarget::Pid(15));
        assert_eq!(KillTarget::parse("0b101"), KillTarget::Pid(5));
        assert_eq!(KillTarget::parse("017"), KillTarget::Pid(15));
        assert_eq!(KillTarget::parse("0"), KillTarget::Pid(0));
        assert_eq!(KillTarget::parse("-3"), KillTarget::Pid(-3));
    }

    #[test]
    fn anything_else_is_a_pattern() {
        for raw in ["worker-*", "12*", "0x", "09", "1e3", "", "MYGROUP?"] {
            assert_eq!(KillTarget::parse(raw), KillTarget::Pattern(raw.to_string()), "{raw}");
        }
    }
}
