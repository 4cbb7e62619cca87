//! In-memory guard against replayed IM-created events.
//!
//! The ledger can deliver the same event more than once (reconnects,
//! replays). Without a guard every delivery produces a new PIIS and a new
//! process instance. The set lives only as long as the process.

use std::collections::HashSet;

use tokio::sync::Mutex;

/// Set of IM identifiers already answered by this process.
#[derive(Debug, Default)]
pub struct ReplayGuard {
    seen: Mutex<HashSet<String>>,
}

impl ReplayGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `im_id`; returns `false` if it had been recorded before.
    pub async fn first_seen(&self, im_id: &str) -> bool {
        self.seen.lock().await.insert(im_id.to_string())
    }

    pub async fn len(&self) -> usize {
        self.seen.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.seen.lock().await.is_empty()
    }
}
