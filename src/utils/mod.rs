//! Shared helpers for the binary and the sagas.

pub mod bootstrap;
pub mod retry;
