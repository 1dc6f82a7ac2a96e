//! Word-chain chat library.
//!
//! This crate learns word-transition counts from chat messages, one model
//! per channel, and walks them to produce new phrases:
//! - A per-channel persistent frequency store
//! - Learning and bounded, frequency-weighted generation
//! - Spontaneous speech with a cooldown and a playful output filter
//! - Per-channel configuration
//!
//! Low-level components (tables, path helpers) are kept internal.

/// Transition storage: tokens, rows and the per-partition store.
pub mod model;

/// Learning from messages and walking chains.
pub mod chain;

/// Chat glue: message handling, spontaneous speech, output filter.
pub mod bot;

/// Per-channel configuration loaded from TOML.
pub mod config;

/// Error kinds shared by the whole crate.
pub mod error;

/// I/O utilities (corpus loading, table paths).
pub mod io;

pub use bot::{ChainBot, InboundMessage};
pub use config::Config;
pub use error::{ChainError, Result};
