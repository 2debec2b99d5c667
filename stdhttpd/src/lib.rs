//! stdhttp process broker.
//!
//! Keeps an in-memory registry of managed processes, each with a single-slot
//! command mailbox, and serves it over the long-poll HTTP protocol. Also hosts
//! the debug text sink that `stdhttp run` can relay output lines to.

pub mod debug_sink;
pub mod handlers;
pub mod mailbox;
pub mod registry;
pub mod server;
pub mod store;

pub use registry::ProcessRegistry;
pub use server::{
    bind_broker, bind_debug, broker_app, run_broker, run_debug, spawn_signal_handlers,
    BrokerConfig, DebugConfig, Server,
};
