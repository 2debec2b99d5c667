//! Types shared by the broker daemon, its client library and the CLI.

pub mod broker;
pub mod config;
pub mod error;
pub mod models;
pub mod output;
pub mod pattern;

pub use broker::ProcessBroker;
pub use error::{BrokerError, BrokerResult};
pub use models::{PostTextBody, PostTextBodyItem, ProcessRecord, ProcessesBody, ProcessesBodyItem};
pub use pattern::ProcessPattern;
