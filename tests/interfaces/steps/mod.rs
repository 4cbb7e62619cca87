//! Cucumber step definitions for interface tests.

pub mod correlation;
pub mod job_workers;
