//! tack - offline-first notes, reminders and agent tasks
//!
//! Records are written to a local SQLite store first and reconciled with a
//! remote record service in the background.
//!
//! # Architecture
//!
//! - [`model`] - Record types (notes, reminders, agent tasks)
//! - [`storage`] - SQLite record store and change notifications
//! - [`sync`] - Remote gateway, push/pull engine and background scheduler
//! - [`config`] - Data paths and sync settings
//! - [`cli`] - Command-line interface using clap
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod storage;
pub mod sync;

pub use error::{Error, Result};
