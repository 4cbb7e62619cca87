//! IM correlation saga.
//!
//! Reacts to `IMCreatedEvent`s: fetches the interchange message, checks
//! that it is addressed to this participant, publishes a PIIS answering
//! it and starts a local process instance carrying the same identifier.
//!
//! ```text
//! received -> fetched -> validated -> record-built -> published -> instance-requested -> done
//!     |          |           |                            |
//!     +----------+-----------+--> done (no side effects)   +--> SagaError (listener stops)
//! ```
//!
//! Failure policy:
//! - fetch errors and addressing mismatches end the saga silently
//! - PIIS publish failures are retried with backoff (same identifier and
//!   record every attempt) and are fatal once retries are exhausted
//! - instance creation failures are logged; the PIIS is already on the ledger

use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use futures::future::BoxFuture;
use tracing::{debug, error, info, warn};

use super::replay::ReplayGuard;
use crate::bus::{EventHandler, HandlerError, LedgerEvent};
use crate::clients::{ClientError, LedgerTransactions, MessageRegistry, WorkflowEngine};
use crate::config::{ParticipantConfig, PublishConfig};
use crate::ids::{IdGenerator, UuidGenerator};
use crate::types::{CreateInstance, InterchangeMessage, Piis, ProcessVariables, PublishPiis};
use crate::utils::retry::publish_backoff;

/// Result type for saga operations.
pub type Result<T> = std::result::Result<T, SagaError>;

/// Errors that must stop the process.
#[derive(Debug, thiserror::Error)]
pub enum SagaError {
    #[error("Failed to publish PIIS {correlation_id} for IM {im_id}: {source}")]
    PublishFailed {
        im_id: String,
        correlation_id: String,
        #[source]
        source: ClientError,
    },
}

/// Why an event produced no side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The IM could not be fetched or decoded.
    FetchFailed,
    /// The IM is addressed to another process or participant.
    NotAddressed,
    /// The IM was already answered (replay guard enabled).
    Replayed,
}

/// Outcome of one saga invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    Skipped(SkipReason),
    /// PIIS published and process instance created.
    Instantiated {
        correlation_id: String,
        instance_key: String,
    },
    /// PIIS published but no process instance could be started.
    InstanceFailed { correlation_id: String },
}

impl Correlation {
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            Correlation::Skipped(_) => None,
            Correlation::Instantiated { correlation_id, .. }
            | Correlation::InstanceFailed { correlation_id } => Some(correlation_id),
        }
    }
}

/// Addressing gate: is `im` meant for this process and participant?
///
/// This is the only authorization check between the shared ledger and the
/// local engine, so it compares both identifiers exactly.
pub fn is_addressed_to(im: &InterchangeMessage, participant: &ParticipantConfig) -> bool {
    let to = im.recipient();
    to.process_id == participant.process_id && to.participant_id == participant.participant_id
}

/// Correlation & instantiation engine for IM-created events.
///
/// Cheap to clone; clones share clients, identifier source and replay guard.
#[derive(Clone)]
pub struct ImCorrelationSaga {
    participant: ParticipantConfig,
    registry: Arc<dyn MessageRegistry>,
    ledger: Arc<dyn LedgerTransactions>,
    engine: Arc<dyn WorkflowEngine>,
    ids: Arc<dyn IdGenerator>,
    publish: PublishConfig,
    replay_guard: Option<Arc<ReplayGuard>>,
}

impl ImCorrelationSaga {
    pub fn new(
        participant: ParticipantConfig,
        registry: Arc<dyn MessageRegistry>,
        ledger: Arc<dyn LedgerTransactions>,
        engine: Arc<dyn WorkflowEngine>,
    ) -> Self {
        Self {
            participant,
            registry,
            ledger,
            engine,
            ids: Arc::new(UuidGenerator),
            publish: PublishConfig::default(),
            replay_guard: None,
        }
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_publish_config(mut self, publish: PublishConfig) -> Self {
        self.publish = publish;
        self
    }

    /// Skip IMs that were already answered by this process.
    pub fn with_replay_guard(mut self, guard: Arc<ReplayGuard>) -> Self {
        self.replay_guard = Some(guard);
        self
    }

    /// Run the saga for one IM-created event.
    #[tracing::instrument(name = "saga.correlate", skip_all, fields(im_id = %im_id))]
    pub async fn correlate(&self, im_id: &str) -> Result<Correlation> {
        let im = match self.registry.get_im(im_id).await {
            Ok(im) => im,
            Err(e) => {
                debug!(error = %e, "IM fetch failed, ignoring event");
                return Ok(Correlation::Skipped(SkipReason::FetchFailed));
            }
        };

        if !is_addressed_to(&im, &self.participant) {
            debug!(
                to_process = %im.recipient().process_id,
                to_participant = %im.recipient().participant_id,
                "IM not addressed to this participant"
            );
            return Ok(Correlation::Skipped(SkipReason::NotAddressed));
        }

        if let Some(guard) = &self.replay_guard {
            if !guard.first_seen(im_id).await {
                info!("IM already answered, ignoring replay");
                return Ok(Correlation::Skipped(SkipReason::Replayed));
            }
        }

        let correlation_id = self.ids.next_id();
        let tx = PublishPiis {
            piis: Piis::new(
                correlation_id.clone(),
                &self.participant.process_id,
                &self.participant.participant_id,
                im.sender().clone(),
                &self.participant.subscriber_role,
            ),
        };

        self.publish_piis(im_id, &tx).await?;
        info!(correlation_id = %correlation_id, "Published PIIS");

        let variables = match ProcessVariables::builder(&correlation_id)
            .application_data(im.application_data())
        {
            Ok(builder) => builder
                .from_instance(
                    self.participant.subscriber_role.clone(),
                    im.sender().process_instance_id.clone(),
                )
                .build(),
            Err(e) => {
                warn!(
                    correlation_id = %correlation_id,
                    error = %e,
                    "Unusable application data, process instance not created"
                );
                return Ok(Correlation::InstanceFailed { correlation_id });
            }
        };

        let request = CreateInstance::latest(&self.participant.process_id, &variables);
        match self.engine.create_instance(&request).await {
            Ok(instance_key) => {
                info!(
                    correlation_id = %correlation_id,
                    instance_key = %instance_key,
                    "Process instance created"
                );
                Ok(Correlation::Instantiated {
                    correlation_id,
                    instance_key,
                })
            }
            Err(e) => {
                warn!(
                    correlation_id = %correlation_id,
                    error = %e,
                    "Failed to create process instance after publishing PIIS"
                );
                Ok(Correlation::InstanceFailed { correlation_id })
            }
        }
    }

    async fn publish_piis(&self, im_id: &str, tx: &PublishPiis) -> Result<()> {
        let correlation_id = tx.piis.id.as_str();

        (|| async { self.ledger.publish_piis(tx).await })
            .retry(publish_backoff(&self.publish))
            .when(ClientError::is_retryable)
            .notify(|err: &ClientError, dur: Duration| {
                warn!(
                    correlation_id = %correlation_id,
                    error = %err,
                    delay = ?dur,
                    "PIIS publish failed, retrying"
                );
            })
            .await
            .map_err(|source| {
                error!(
                    correlation_id = %correlation_id,
                    error = %source,
                    "PIIS publish failed"
                );
                SagaError::PublishFailed {
                    im_id: im_id.to_string(),
                    correlation_id: correlation_id.to_string(),
                    source,
                }
            })
    }
}

impl EventHandler for ImCorrelationSaga {
    fn handle(&self, event: LedgerEvent) -> BoxFuture<'static, std::result::Result<(), HandlerError>> {
        let saga = self.clone();
        Box::pin(async move {
            let LedgerEvent::ImCreated { im_id } = event else {
                return Ok(());
            };
            saga.correlate(&im_id)
                .await
                .map(|_| ())
                .map_err(|e| HandlerError::Fatal(e.to_string()))
        })
    }
}
