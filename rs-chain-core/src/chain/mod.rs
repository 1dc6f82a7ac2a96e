//! Learning and generation on top of the frequency store.

/// Turns messages into transitions and records them.
pub mod learner;

/// Bounded random walks over the recorded transitions.
pub mod walker;
