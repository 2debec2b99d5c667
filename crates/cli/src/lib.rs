//! Subcommands and logging setup behind the `stdhttp` binary.

pub mod commands;
pub mod logging;
