//! Correlation identifier generation.

use uuid::Uuid;

/// Source of correlation identifiers.
///
/// One identifier names both the published subscription record and the
/// process instance it announces. Implementations must be safe to call
/// from concurrently running saga invocations and must never repeat.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random (v4) UUIDs rendered in simple (hyphen-free) form.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}
