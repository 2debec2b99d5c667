use glob::{MatchOptions, Pattern};

use crate::models::ProcessRecord;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Operator-supplied glob used by pattern kills.
///
/// A record matches when the pattern matches its decimal pid, its client name
/// or its command name. An empty or malformed pattern matches nothing.
///
/// Character classes are negated with `[!..]`; `[^..]` is a literal class
/// that includes `^`.
#[derive(Debug, Clone)]
pub struct ProcessPattern {
    pattern: Option<Pattern>,
}

impl ProcessPattern {
    pub fn new(raw: &str) -> Self {
        let pattern = if raw.is_empty() {
            None
        } else {
            Pattern::new(raw).ok()
        };
        Self { pattern }
    }

    pub fn matches(&self, record: &ProcessRecord) -> bool {
        let Some(pattern) = &self.pattern else {
            return false;
        };
        let pid = record.pid.to_string();
        [
            pid.as_str(),
            record.client_name.as_str(),
            record.command_name.as_str(),
        ]
        .iter()
        .any(|candidate| pattern.matches_with(candidate, MATCH_OPTIONS))
    }
}
