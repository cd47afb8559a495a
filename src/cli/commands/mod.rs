//! Command implementations.

pub mod completions;
pub mod config;
pub mod init;
pub mod record;
pub mod sync;
pub mod version;
