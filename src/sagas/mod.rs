//! Sagas reacting to ledger events.

pub mod im_correlation;
pub mod replay;

pub use im_correlation::{
    is_addressed_to, Correlation, ImCorrelationSaga, SagaError, SkipReason,
};
pub use replay::ReplayGuard;
