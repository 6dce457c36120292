//! Filesystem-facing helpers. Nothing under [`crate::core`] touches disk.

pub mod config;
