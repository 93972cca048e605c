//! Shared helpers.

pub mod coding;
