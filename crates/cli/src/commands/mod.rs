//! One module per `stdhttp` subcommand.

pub mod broker;
pub mod debug;
pub mod kill;
pub mod list;
pub mod run;

pub use broker::broker;
pub use debug::debug;
pub use kill::{kill, KillTarget};
pub use list::list;
pub use run::{run, RunConfig};
