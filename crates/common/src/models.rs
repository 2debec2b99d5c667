use serde::{Deserialize, Serialize};

/// A process registered with the broker.
///
/// `pid` is the registry key. `expired` is derived at list time from the
/// broker's expiry watermark and is never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessRecord {
    pub pid: u32,
    pub client_name: String,
    pub command_name: String,
    pub command_args: Vec<String>,
    pub persistent: bool,
    pub expired: bool,
}

impl ProcessRecord {
    /// A record with no command name describes a stdin pipe.
    pub fn is_pipe(&self) -> bool {
        self.command_name.is_empty()
    }
}

/// `GET /processes` response body.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessesBody {
    #[serde(default)]
    pub items: Vec<ProcessesBodyItem>,
}

impl ProcessesBody {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ProcessRecord>) -> Self {
        Self {
            items: records.into_iter().map(ProcessesBodyItem::from).collect(),
        }
    }

    pub fn into_records(self) -> Vec<ProcessRecord> {
        self.items.into_iter().map(ProcessRecord::from).collect()
    }
}

/// Wire shape of a single process, also the `POST /processes` request body.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessesBodyItem {
    pub pid: u32,
    #[serde(default)]
    pub client_name: String,
    #[serde(default)]
    pub command_name: String,
    #[serde(default)]
    pub command_args: Vec<String>,
    #[serde(default)]
    pub expired: bool,
    #[serde(default)]
    pub persistent: bool,
}

impl From<&ProcessRecord> for ProcessesBodyItem {
    fn from(record: &ProcessRecord) -> Self {
        Self {
            pid: record.pid,
            client_name: record.client_name.clone(),
            command_name: record.command_name.clone(),
            command_args: record.command_args.clone(),
            expired: record.expired,
            persistent: record.persistent,
        }
    }
}

impl From<ProcessesBodyItem> for ProcessRecord {
    fn from(item: ProcessesBodyItem) -> Self {
        Self {
            pid: item.pid,
            client_name: item.client_name,
            command_name: item.command_name,
            command_args: item.command_args,
            persistent: item.persistent,
            expired: item.expired,
        }
    }
}

pub const SOURCE_STDOUT: &str = "stdout";
pub const SOURCE_STDERR: &str = "stderr";

/// Text lines relayed to a debug sink.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostTextBody {
    #[serde(default)]
    pub items: Vec<PostTextBodyItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostTextBodyItem {
    pub source: String,
    pub message: String,
}

impl PostTextBody {
    pub fn new<I, S>(source: &str, messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: messages
                .into_iter()
                .map(|message| PostTextBodyItem {
                    source: source.to_string(),
                    message: message.into(),
                })
                .collect(),
        }
    }
}
