//! CLI command implementations

mod check;
mod cleanup;
mod config;
mod up;

pub use check::check_command;
pub use cleanup::cleanup_command;
pub use config::{config_get, config_init, config_path, config_show};
pub use up::{up_command, UpOptions};
