//! Storage side of the chain system.
//!
//! - Tokens and persisted rows (`Token`, `Transition`)
//! - The per-partition persistent store (`FrequencyStore`)
//! - Internal tables and per-predecessor states

/// Word / boundary tokens and the persisted transition row.
pub mod transition;

/// Per-partition persistent table of transition counts.
///
/// Opens partitions lazily, caches their handles, persists them with
/// `postcard` and releases them all on close.
pub mod store;

/// In-memory table of one partition. Not exposed publicly.
mod table;

/// Successors of a single predecessor with weighted random sampling.
/// Not exposed publicly.
mod state;
