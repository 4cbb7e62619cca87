//! Interchange bridge.
//!
//! Connects a local BPMN workflow engine to a shared ledger used by several
//! organisations. The bridge listens for interchange messages (IMs) created
//! on the ledger, answers the ones addressed to this participant with a
//! PIIS record carrying a fresh correlation id, and starts a local process
//! instance seeded with the IM's application data.

pub mod bus;
pub mod clients;
pub mod config;
pub mod ids;
pub mod sagas;
pub mod types;
pub mod utils;
pub mod workers;
