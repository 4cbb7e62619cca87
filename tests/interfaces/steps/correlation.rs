//! IM correlation step definitions.

use std::fmt;
use std::sync::Arc;

use cucumber::{given, then, when, World};
use futures::stream;
use serde_json::{json, Map, Value};

use interchange_bridge::bus::{EventListener, Frame, ListenerError, ListenerStats, StreamError};
use interchange_bridge::clients::mock::{
    MockFailure, MockLedger, MockMessageRegistry, MockWorkflowEngine,
};
use interchange_bridge::config::{ParticipantConfig, PublishConfig};
use interchange_bridge::sagas::{ImCorrelationSaga, ReplayGuard};
use interchange_bridge::types::{
    ApplicationData, CreateInstance, ImPayload, InterchangeMessage, ProcessAddress,
    WorkflowRelevantData,
};

/// Test context for correlation scenarios.
#[derive(World)]
#[world(init = Self::new)]
pub struct CorrelationWorld {
    participant: ParticipantConfig,
    registry: Arc<MockMessageRegistry>,
    ledger: Arc<MockLedger>,
    engine: Arc<MockWorkflowEngine>,
    replay_protection: bool,
    frames: Vec<Result<Frame, StreamError>>,
    outcome: Option<Result<ListenerStats, ListenerError>>,
}

impl fmt::Debug for CorrelationWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationWorld")
            .field("participant", &self.participant)
            .field("frames", &self.frames.len())
            .field("outcome", &self.outcome)
            .finish()
    }
}

impl CorrelationWorld {
    fn new() -> Self {
        Self {
            participant: ParticipantConfig::default(),
            registry: Arc::new(MockMessageRegistry::new()),
            ledger: Arc::new(MockLedger::new()),
            engine: Arc::new(MockWorkflowEngine::new()),
            replay_protection: false,
            frames: Vec::new(),
            outcome: None,
        }
    }

    fn saga(&self) -> ImCorrelationSaga {
        let saga = ImCorrelationSaga::new(
            self.participant.clone(),
            self.registry.clone(),
            self.ledger.clone(),
            self.engine.clone(),
        )
        .with_publish_config(PublishConfig {
            max_retries: 2,
            min_delay_ms: 1,
            max_delay_ms: 5,
        });
        if self.replay_protection {
            saga.with_replay_guard(Arc::new(ReplayGuard::new()))
        } else {
            saga
        }
    }

    async fn started(&self) -> CreateInstance {
        let created = self.engine.created().await;
        assert_eq!(created.len(), 1, "Expected exactly one started instance");
        created[0].clone()
    }
}

// --- Given steps ---

#[given(expr = "the local participant is process {string} participant {string} with role {string}")]
async fn given_local_participant(
    world: &mut CorrelationWorld,
    process_id: String,
    participant_id: String,
    role: String,
) {
    world.participant = ParticipantConfig {
        process_id,
        participant_id,
        subscriber_role: role,
    };
}

#[given(
    expr = "an IM {string} from process {string} instance {string} addressed to process {string} participant {string}"
)]
async fn given_im(
    world: &mut CorrelationWorld,
    id: String,
    from_process: String,
    from_instance: String,
    to_process: String,
    to_participant: String,
) {
    let im = InterchangeMessage {
        id,
        payload: ImPayload {
            workflow_relevant_data: WorkflowRelevantData {
                from: ProcessAddress {
                    process_id: from_process,
                    process_instance_id: from_instance,
                    participant_id: "2".to_string(),
                },
                to: ProcessAddress {
                    process_id: to_process,
                    process_instance_id: String::new(),
                    participant_id: to_participant,
                },
            },
            application_data: ApplicationData::default(),
        },
    };
    world.registry.insert(im).await;
}

#[given(expr = "the IM {string} carries application data {string}")]
async fn given_application_data(world: &mut CorrelationWorld, id: String, data: String) {
    let mut im = world
        .registry
        .get_stored(&id)
        .await
        .expect("IM must be declared first");
    im.payload.application_data.url = data;
    world.registry.insert(im).await;
}

#[given("the ledger is unavailable")]
async fn given_ledger_unavailable(world: &mut CorrelationWorld) {
    world.ledger.set_failure(Some(MockFailure::Unavailable)).await;
}

#[given("the workflow engine cannot create instances")]
async fn given_engine_failing(world: &mut CorrelationWorld) {
    world
        .engine
        .set_create_failure(Some(MockFailure::Unavailable))
        .await;
}

#[given("replay protection is enabled")]
async fn given_replay_protection(world: &mut CorrelationWorld) {
    world.replay_protection = true;
}

#[given(expr = "the ledger announces IM {string}")]
async fn given_announced(world: &mut CorrelationWorld, id: String) {
    let frame = json!({"$class": "org.sysu.wf.IMCreatedEvent", "id": id}).to_string();
    world.frames.push(Ok(Frame::Text(frame)));
}

// --- When steps ---

#[when("the listener consumes the event stream")]
async fn when_listener_runs(world: &mut CorrelationWorld) {
    let listener = EventListener::new(Arc::new(world.saga()), 4);
    let frames = std::mem::take(&mut world.frames);
    world.outcome = Some(listener.run(stream::iter(frames)).await);
}

// --- Then steps ---

#[then("the listener finishes cleanly")]
async fn then_finishes_cleanly(world: &mut CorrelationWorld) {
    let outcome = world.outcome.as_ref().expect("Listener has not run");
    assert!(outcome.is_ok(), "Expected clean finish, got {:?}", outcome);
}

#[then("the listener stops with a fatal error")]
async fn then_fatal(world: &mut CorrelationWorld) {
    let outcome = world.outcome.as_ref().expect("Listener has not run");
    assert!(
        matches!(outcome, Err(ListenerError::Fatal(_))),
        "Expected fatal error, got {:?}",
        outcome
    );
}

#[then(expr = "the number of published PIIS records is {int}")]
async fn then_published_count(world: &mut CorrelationWorld, count: usize) {
    assert_eq!(world.ledger.published_count().await, count);
}

#[then(expr = "the number of publish attempts is {int}")]
async fn then_attempt_count(world: &mut CorrelationWorld, count: usize) {
    assert_eq!(world.ledger.attempts().await.len(), count);
}

#[then(expr = "the number of started instances is {int}")]
async fn then_started_count(world: &mut CorrelationWorld, count: usize) {
    assert_eq!(world.engine.created_count().await, count);
}

#[then(expr = "the PIIS record answers instance {string} of process {string}")]
async fn then_piis_answers(world: &mut CorrelationWorld, instance: String, process: String) {
    let published = world.ledger.published().await;
    let piis = &published[0].piis;
    assert_eq!(piis.to.process_instance_id, instance);
    assert_eq!(piis.to.process_id, process);
    assert_eq!(piis.from.process_id, world.participant.process_id);
    assert_eq!(piis.from.participant_id, world.participant.participant_id);
}

#[then("the PIIS identifier is the started instance identifier")]
async fn then_identifier_shared(world: &mut CorrelationWorld) {
    let published = world.ledger.published().await;
    let piis = &published[0].piis;
    let started = world.started().await;
    assert_eq!(piis.from.process_instance_id, piis.id);
    assert_eq!(started.variables["processInstanceID"], json!(piis.id));
}

#[then(expr = "the started instance has {int} variables")]
async fn then_variable_count(world: &mut CorrelationWorld, count: usize) {
    assert_eq!(world.started().await.variables.len(), count);
}

#[then(expr = "the started instance remembers {string} for role {string}")]
async fn then_remembers_sender(world: &mut CorrelationWorld, instance: String, role: String) {
    let started = world.started().await;
    let mut expected = Map::new();
    expected.insert(role, Value::String(instance));
    assert_eq!(
        started.variables["fromProcessInstanceID"],
        Value::Object(expected)
    );
}

#[then(expr = "the started instance variable {string} is {int}")]
async fn then_variable_value(world: &mut CorrelationWorld, key: String, value: i64) {
    let started = world.started().await;
    assert_eq!(started.variables.get(&key), Some(&Value::from(value)));
}

#[then("every publish attempt carried the same identifier")]
async fn then_same_identifier(world: &mut CorrelationWorld) {
    let attempts = world.ledger.attempts().await;
    assert!(attempts.len() > 1, "Expected retries, got {}", attempts.len());
    assert!(attempts.iter().all(|tx| tx.piis.id == attempts[0].piis.id));
}

#[then("the published PIIS identifiers are distinct")]
async fn then_distinct_identifiers(world: &mut CorrelationWorld) {
    let mut ids: Vec<String> = world
        .ledger
        .published()
        .await
        .into_iter()
        .map(|tx| tx.piis.id)
        .collect();
    let total = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), total);
}
