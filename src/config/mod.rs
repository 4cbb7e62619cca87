//! Application configuration.
//!
//! Loaded from YAML files and environment variables into a single
//! `Config`. Every section has defaults matching a single-host
//! deployment (ledger REST on :3001, ledger events on :3000, engine REST
//! on :8080).

use std::time::Duration;

use serde::Deserialize;

use crate::bus::listener::DEFAULT_MAX_IN_FLIGHT;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "INTERCHANGE_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "INTERCHANGE";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "INTERCHANGE_LOG";

/// Job types served by the bundled workers.
pub const DEFAULT_JOB_TYPES: [&str; 4] = [
    "placeOrder2",
    "receiveOrder2",
    "reportStartOfProduction",
    "deliverProduct",
];

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local process and participant identity.
    pub participant: ParticipantConfig,
    /// Ledger endpoints.
    pub ledger: LedgerConfig,
    /// Workflow engine endpoint and workers.
    pub workflow: WorkflowConfig,
    /// Outbound HTTP settings.
    pub http: HttpConfig,
    /// PIIS publish retry policy.
    pub publish: PublishConfig,
    /// Event dispatch limits.
    pub dispatch: DispatchConfig,
}

/// Identity of this participant on the shared ledger.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ParticipantConfig {
    /// BPMN process id of the local process; IMs must target it.
    pub process_id: String,
    /// Participant id (IESM id) on the ledger; IMs must target it.
    pub participant_id: String,
    /// Role label announced in PIIS records and used as the
    /// `fromProcessInstanceID` key.
    pub subscriber_role: String,
}

impl Default for ParticipantConfig {
    fn default() -> Self {
        Self {
            process_id: "manufacturer".to_string(),
            participant_id: "1".to_string(),
            subscriber_role: "bulk-buyer".to_string(),
        }
    }
}

/// Ledger endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Websocket URL of the event feed.
    pub events_url: String,
    /// Base URL of the REST API (registry reads and transactions).
    pub api_url: String,
    /// Deadline for one websocket dial, TCP connect plus upgrade handshake.
    pub connect_timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            events_url: "ws://127.0.0.1:3000".to_string(),
            api_url: "http://127.0.0.1:3001/api".to_string(),
            connect_timeout_ms: 10_000,
        }
    }
}

impl LedgerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Workflow engine connection and task-queue workers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Base URL of the engine's REST gateway.
    pub address: String,
    /// Worker name reported when activating jobs.
    pub worker_name: String,
    /// Job types to register workers for.
    pub job_types: Vec<String>,
    pub poll_interval_ms: u64,
    /// How long an activated job stays locked to this worker.
    pub job_timeout_ms: u64,
    /// Maximum jobs activated per poll.
    pub max_jobs: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8080".to_string(),
            worker_name: "interchange-bridge".to_string(),
            job_types: DEFAULT_JOB_TYPES.iter().map(|t| t.to_string()).collect(),
            poll_interval_ms: 1000,
            job_timeout_ms: 30_000,
            max_jobs: 32,
        }
    }
}

impl WorkflowConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }
}

/// Outbound HTTP settings shared by all clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request deadline.
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// PIIS publish retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Retries after the first attempt. 0 disables retrying.
    pub max_retries: usize,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_delay_ms: 100,
            max_delay_ms: 5000,
        }
    }
}

/// Event dispatch limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum saga invocations running at once.
    pub max_in_flight: usize,
    /// Skip IM-created events whose IM was already answered.
    pub dedupe_replays: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            dedupe_replays: false,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config: Config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("workflow.job_types"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the bridge cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("participant.process_id", &self.participant.process_id),
            ("participant.participant_id", &self.participant.participant_id),
            ("participant.subscriber_role", &self.participant.subscriber_role),
            ("ledger.events_url", &self.ledger.events_url),
            ("ledger.api_url", &self.ledger.api_url),
            ("workflow.address", &self.workflow.address),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} must not be empty", key)));
            }
        }
        if self.ledger.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "ledger.connect_timeout_ms must be at least 1".to_string(),
            ));
        }
        if self.dispatch.max_in_flight == 0 {
            return Err(ConfigError::Invalid(
                "dispatch.max_in_flight must be at least 1".to_string(),
            ));
        }
        if self.publish.min_delay_ms > self.publish.max_delay_ms {
            return Err(ConfigError::Invalid(
                "publish.min_delay_ms must not exceed publish.max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}
