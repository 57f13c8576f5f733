//! Command implementations for the CLI.

mod config;
mod connect;
mod notify;
mod scan;

pub use config::cmd_config;
pub use connect::{ConnectArgs, cmd_connect};
pub use notify::{NotifyArgs, cmd_notify};
pub use scan::cmd_scan;
