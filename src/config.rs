//! Configuration document (§7), grounded in `orchestrator/config.py`.
//!
//! Where the original keeps `options: Dict[str, Any]` per agent/
//! dispatcher and dispatches on a `type` string at construction time,
//! this models each type as a tagged enum variant with its own typed
//! fields (REDESIGN FLAGS "Heterogeneous agent/dispatcher options"):
//! `serde`'s internally-tagged representation does the dispatch at
//! deserialization time instead of at object-construction time.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

fn default_pool_size() -> usize {
    4
}
fn default_timeout_s() -> f64 {
    2.0
}
fn default_metrics_port() -> u16 {
    9108
}
fn default_version() -> u32 {
    1
}
fn default_serializer() -> String {
    "json".to_string()
}
fn default_reconnect_interval_s() -> u64 {
    5
}
fn default_method() -> String {
    "POST".to_string()
}
fn default_timeout_webhook_s() -> f64 {
    5.0
}
fn default_interval_s() -> f64 {
    0.1
}
fn default_poll_interval_s() -> f64 {
    5.0
}
fn default_encoding() -> String {
    "bgr".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_timeout_s")]
    pub timeout_s: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicRouteConfig {
    pub filter: String,
    pub pipeline: String,
    #[serde(default = "default_serializer")]
    pub serializer: String,
    pub sensor_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectorKind {
    Mqtt {
        host: String,
        port: u16,
        username: Option<String>,
        password: Option<String>,
        #[serde(default = "default_reconnect_interval_s")]
        reconnect_interval_s: u64,
        #[serde(default)]
        topics: Vec<TopicRouteConfig>,
    },
    Camera {
        source: String,
        #[serde(default = "default_interval_s")]
        interval_s: f64,
        #[serde(default = "default_encoding")]
        encoding: String,
        sensor_id: Option<String>,
        pipeline: Option<String>,
    },
    Ble {
        name: Option<String>,
        service_uuid: String,
        characteristic_uuid: String,
        #[serde(default = "default_poll_interval_s")]
        poll_interval_s: f64,
        #[serde(default = "default_serializer")]
        encoding: String,
        sensor_id: Option<String>,
        pipeline: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectorConfig {
    pub id: String,
    #[serde(flatten)]
    pub kind: ConnectorKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub id: String,
    pub preprocess: String,
    pub model: Option<String>,
    pub postprocess: Option<String>,
    #[serde(default)]
    pub agents: Vec<String>,
    pub deadline_ms: Option<u64>,
    pub max_parallel: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatcherConfig {
    Log,
    Mqtt {
        host: String,
        port: u16,
        username: Option<String>,
        password: Option<String>,
        topic: Option<String>,
        #[serde(default)]
        qos: u8,
        #[serde(default)]
        retain: bool,
    },
    Webhook {
        url: Option<String>,
        #[serde(default = "default_method")]
        method: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default = "default_timeout_webhook_s")]
        timeout_s: f64,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentConfig {
    Threshold {
        #[serde(default = "default_metric")]
        metric: String,
        #[serde(default = "default_threshold")]
        threshold: f64,
        #[serde(default = "default_dispatcher_name")]
        dispatcher: String,
        target: Option<String>,
    },
    PersonInZone {
        zone: Option<String>,
        #[serde(default = "default_dispatcher_name")]
        dispatcher: String,
        target: Option<String>,
    },
    SnapshotArchive {
        #[serde(default = "default_dispatcher_name")]
        dispatcher: String,
        target: Option<String>,
    },
}

fn default_metric() -> String {
    "value".to_string()
}
fn default_threshold() -> f64 {
    0.5
}
fn default_dispatcher_name() -> String {
    "log".to_string()
}

/// The fully parsed and cross-referentially validated config document.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub connectors: Vec<ConnectorConfig>,
    #[serde(default)]
    pub pipelines: Vec<PipelineConfig>,
    #[serde(default)]
    pub actions: HashMap<String, DispatcherConfig>,
    #[serde(default)]
    pub agents: HashMap<String, AgentConfig>,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

impl OrchestratorConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: OrchestratorConfig = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Startup validation: duplicate ids, unknown agent refs. Plugin
    /// qualname resolvability is checked separately once a
    /// [`crate::plugins::PluginRegistry`] exists, since that table is
    /// populated by the binary, not by config parsing.
    fn validate(&self) -> Result<(), ConfigError> {
        let mut connector_ids = HashSet::new();
        for connector in &self.connectors {
            if !connector_ids.insert(connector.id.clone()) {
                return Err(ConfigError::DuplicateConnector(connector.id.clone()));
            }
        }

        let mut pipeline_ids = HashSet::new();
        for pipeline in &self.pipelines {
            if !pipeline_ids.insert(pipeline.id.clone()) {
                return Err(ConfigError::DuplicatePipeline(pipeline.id.clone()));
            }
            for agent in &pipeline.agents {
                if !self.agents.contains_key(agent) {
                    return Err(ConfigError::UnknownAgentRef {
                        pipeline: pipeline.id.clone(),
                        agent: agent.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const BASE: &str = r#"
gateway:
  host: 127.0.0.1
  port: 8008
pipelines:
  - id: env
    preprocess: env.vector_to_tensor
    agents: [alert]
agents:
  alert:
    type: threshold
    metric: value
    threshold: 0.5
"#;

    #[test]
    fn parses_minimal_document() {
        let file = write_config(BASE);
        let config = OrchestratorConfig::load(file.path()).unwrap();
        assert_eq!(config.gateway.port, 8008);
        assert_eq!(config.pipelines.len(), 1);
    }

    #[test]
    fn rejects_pipeline_referencing_unknown_agent() {
        let file = write_config(
            r#"
gateway:
  host: 127.0.0.1
  port: 8008
pipelines:
  - id: env
    preprocess: env.vector_to_tensor
    agents: [missing]
"#,
        );
        let err = OrchestratorConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownAgentRef { .. }));
    }

    #[test]
    fn rejects_duplicate_pipeline_ids() {
        let file = write_config(
            r#"
gateway:
  host: 127.0.0.1
  port: 8008
pipelines:
  - id: env
    preprocess: env.vector_to_tensor
  - id: env
    preprocess: env.vector_to_tensor
"#,
        );
        let err = OrchestratorConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicatePipeline(_)));
    }
}
