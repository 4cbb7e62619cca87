//! Wire types exchanged with the ledger, the message registry and the
//! workflow engine.
//!
//! Field names follow the ledger's JSON conventions (`processID`,
//! `iesmID`, ...) so documents round-trip without a translation layer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Variable key carrying the new local process-instance identifier.
pub const PROCESS_INSTANCE_ID_KEY: &str = "processInstanceID";
/// Variable key carrying the counterparties' instance identifiers, by role.
pub const FROM_PROCESS_INSTANCE_ID_KEY: &str = "fromProcessInstanceID";

/// Addresses one process instance of one participant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessAddress {
    #[serde(rename = "processID")]
    pub process_id: String,
    #[serde(rename = "processInstanceID", default)]
    pub process_instance_id: String,
    #[serde(rename = "iesmID", alias = "participantID")]
    pub participant_id: String,
}

/// Sender and recipient of an interchange message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRelevantData {
    pub from: ProcessAddress,
    pub to: ProcessAddress,
}

/// Opaque application payload; `url` holds a JSON object encoded as a string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationData {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImPayload {
    pub workflow_relevant_data: WorkflowRelevantData,
    #[serde(default)]
    pub application_data: ApplicationData,
}

/// A counterparty's handshake offer, fetched read-only from the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterchangeMessage {
    pub id: String,
    pub payload: ImPayload,
}

impl InterchangeMessage {
    /// Intended recipient of the offer.
    pub fn recipient(&self) -> &ProcessAddress {
        &self.payload.workflow_relevant_data.to
    }

    /// The offering party's own process instance.
    pub fn sender(&self) -> &ProcessAddress {
        &self.payload.workflow_relevant_data.from
    }

    pub fn application_data(&self) -> &str {
        &self.payload.application_data.url
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberInformation {
    pub roles: Vec<String>,
    pub id: String,
}

/// Subscription record (PIIS) announcing the local instance that answers an IM.
///
/// `id` doubles as the local process-instance identifier, so
/// `from.process_instance_id == id` always holds for records built by
/// [`Piis::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Piis {
    pub id: String,
    pub from: ProcessAddress,
    pub to: ProcessAddress,
    pub subscriber_information: SubscriberInformation,
}

impl Piis {
    /// Build a record for the local participant answering `reply_to`.
    pub fn new(
        id: impl Into<String>,
        process_id: &str,
        participant_id: &str,
        reply_to: ProcessAddress,
        role: &str,
    ) -> Self {
        let id = id.into();
        Self {
            from: ProcessAddress {
                process_id: process_id.to_string(),
                process_instance_id: id.clone(),
                participant_id: participant_id.to_string(),
            },
            id,
            to: reply_to,
            subscriber_information: SubscriberInformation {
                roles: Vec::new(),
                id: role.to_string(),
            },
        }
    }
}

/// Body of the ledger's `PublishPIIS` transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishPiis {
    pub piis: Piis,
}

/// Variables handed to the workflow engine when starting an instance.
///
/// Application variables are flattened next to the two correlation keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessVariables {
    #[serde(flatten)]
    application: Map<String, Value>,
    #[serde(rename = "fromProcessInstanceID")]
    from_process_instance_ids: BTreeMap<String, String>,
    #[serde(rename = "processInstanceID")]
    process_instance_id: String,
}

impl ProcessVariables {
    pub fn builder(process_instance_id: impl Into<String>) -> ProcessVariablesBuilder {
        ProcessVariablesBuilder {
            application: Map::new(),
            from_process_instance_ids: BTreeMap::new(),
            process_instance_id: process_instance_id.into(),
        }
    }

    pub fn process_instance_id(&self) -> &str {
        &self.process_instance_id
    }

    pub fn from_process_instance_id(&self, role: &str) -> Option<&str> {
        self.from_process_instance_ids.get(role).map(String::as_str)
    }

    /// Flatten into the single JSON object sent to the engine.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = self.application.clone();
        let from: Map<String, Value> = self
            .from_process_instance_ids
            .iter()
            .map(|(role, id)| (role.clone(), Value::String(id.clone())))
            .collect();
        map.insert(FROM_PROCESS_INSTANCE_ID_KEY.to_string(), Value::Object(from));
        map.insert(
            PROCESS_INSTANCE_ID_KEY.to_string(),
            Value::String(self.process_instance_id.clone()),
        );
        map
    }
}

/// Errors raised while parsing application data.
#[derive(Debug, thiserror::Error)]
pub enum VariablesError {
    #[error("application data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("application data must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Builder that only knows how to inject the two correlation keys.
#[derive(Debug, Clone)]
pub struct ProcessVariablesBuilder {
    application: Map<String, Value>,
    from_process_instance_ids: BTreeMap<String, String>,
    process_instance_id: String,
}

impl ProcessVariablesBuilder {
    /// Seed from the IM's `applicationData.url`. Blank input means no variables.
    pub fn application_data(mut self, raw: &str) -> Result<Self, VariablesError> {
        if raw.trim().is_empty() {
            self.application = Map::new();
            return Ok(self);
        }
        self.application = match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => map,
            other => return Err(VariablesError::NotAnObject(json_kind(&other))),
        };
        Ok(self)
    }

    /// Record the counterparty instance that plays `role`.
    pub fn from_instance(mut self, role: impl Into<String>, instance_id: impl Into<String>) -> Self {
        self.from_process_instance_ids
            .insert(role.into(), instance_id.into());
        self
    }

    pub fn build(mut self) -> ProcessVariables {
        // injected keys always win over application-supplied ones
        self.application.remove(PROCESS_INSTANCE_ID_KEY);
        self.application.remove(FROM_PROCESS_INSTANCE_ID_KEY);
        ProcessVariables {
            application: self.application,
            from_process_instance_ids: self.from_process_instance_ids,
            process_instance_id: self.process_instance_id,
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Workflow engine request to start the latest version of a process.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstance {
    pub bpmn_process_id: String,
    pub version: i32,
    pub variables: Map<String, Value>,
}

impl CreateInstance {
    /// Engine convention for "latest deployed version".
    pub const LATEST_VERSION: i32 = -1;

    pub fn latest(bpmn_process_id: impl Into<String>, variables: &ProcessVariables) -> Self {
        Self {
            bpmn_process_id: bpmn_process_id.into(),
            version: Self::LATEST_VERSION,
            variables: variables.to_map(),
        }
    }
}

/// A job handed out by the workflow engine's task queue.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivatedJob {
    #[serde(deserialize_with = "key_as_string")]
    pub job_key: String,
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(default, deserialize_with = "key_as_string")]
    pub process_instance_key: String,
    #[serde(default)]
    pub retries: i32,
    #[serde(default)]
    pub variables: Map<String, Value>,
}

/// Engine keys are 64-bit and arrive either as strings or as numbers.
pub(crate) fn key_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number key, got {}",
            json_kind(&other)
        ))),
    }
}
