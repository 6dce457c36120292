//! Deterministic, pure planning logic.
//!
//! Core modules must be free of I/O side effects. They operate on the task
//! arena and the session [`context::Context`] and return deterministic outputs
//! suitable for tests.

pub mod context;
pub mod decompose;
pub mod effect;
pub mod invariants;
pub mod path;
pub mod selector;
pub mod sequence;
pub mod task;
pub mod types;
