//! Subcommand implementations

pub mod history;
pub mod settings;
pub mod status;
