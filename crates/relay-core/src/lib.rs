//! Core domain and application logic for the content relay.
//!
//! Framework-agnostic: Telegram and the content providers live behind ports
//! (traits) implemented in adapter crates.

pub mod commands;
pub mod config;
pub mod cursor;
pub mod delivery;
pub mod domain;
pub mod errors;
pub mod filter;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod pipeline;
pub mod source;
pub mod summarize;

pub use errors::{Error, Result};
