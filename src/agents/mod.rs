//! Decision stage: turns a pipeline's processed data into zero or more
//! [`Action`]s, grounded in `orchestrator/agents/base.py::Agent` and
//! `orchestrator/actions/base.py::Action`.

pub mod threshold;
pub mod vision;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};

use crate::gateway::InferenceResult;
use crate::message::EdgeMessage;
use crate::payload::{NamedArray, Payload};

/// (dispatcher name, optional target, payload map, metadata map) — the
/// four fields of the original's `Action` dataclass.
#[derive(Debug, Clone)]
pub struct Action {
    pub dispatcher: String,
    pub target: Option<String>,
    pub payload: Value,
    pub metadata: Value,
}

impl Action {
    pub fn new(dispatcher: impl Into<String>, payload: Value) -> Self {
        Self {
            dispatcher: dispatcher.into(),
            target: None,
            payload,
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// What an agent actually inspects: the pipeline's postprocessed
/// object when one is configured, the raw gateway response when a
/// model ran without postprocess, or the decoded payload when no model
/// was configured at all (§4.4 step 3/4). Agents work against a single
/// JSON-shaped view regardless of which of these produced it, mirroring
/// the original's duck-typed `dict`/`list` handling in `payload.get(...)`.
#[derive(Debug, Clone)]
pub enum AgentData {
    Processed(Value),
    Inference(InferenceResult),
    Decoded(Payload),
}

impl AgentData {
    /// Render as a JSON value so agents can pattern-match fields
    /// uniformly regardless of which pipeline stage produced the data.
    pub fn as_value(&self) -> Value {
        match self {
            AgentData::Processed(v) => v.clone(),
            AgentData::Inference(resp) => json!({
                "status": resp.status,
                "outputs": resp.outputs.iter().map(bytes_b64).collect::<Vec<_>>(),
            }),
            AgentData::Decoded(payload) => payload_to_value(payload),
        }
    }
}

fn payload_to_value(payload: &Payload) -> Value {
    match payload {
        Payload::Json(v) => v.clone(),
        Payload::Bytes(b) => json!({ "bytes": bytes_b64(b) }),
        Payload::NamedArrays(arrays) => {
            let map: serde_json::Map<String, Value> = arrays
                .iter()
                .map(|(name, arr): (&String, &NamedArray)| (name.clone(), named_array_to_value(arr)))
                .collect();
            Value::Object(map)
        }
    }
}

fn named_array_to_value(arr: &NamedArray) -> Value {
    json!({
        "dtype": format!("{:?}", arr.dtype),
        "shape": arr.shape,
        "bytes": bytes_b64(&arr.data),
    })
}

/// Decision logic invoked once per message per configured agent.
/// Implementations must tolerate concurrent invocation: the same agent
/// instance is shared across every pipeline that references it (§4.5).
/// `start`/`stop` are optional async lifecycle hooks, run once each at
/// orchestrator startup/shutdown (§4.3 "Shutdown").
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self) {}
    async fn stop(&self) {}

    async fn handle(&self, message: &EdgeMessage, data: &AgentData, latency_ms: f64) -> Vec<Action>;
}

/// Read-only once construction finishes; built once before workers
/// start (§5 "Shared resources").
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<String, std::sync::Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails fast on a name collision (§4.5 "name collisions at
    /// registration fail fast") rather than silently overwriting the
    /// previous registrant.
    pub fn register(&mut self, agent: std::sync::Arc<dyn Agent>) -> Result<(), crate::error::ConfigError> {
        let name = agent.name().to_string();
        if self.agents.insert(name.clone(), agent).is_some() {
            return Err(crate::error::ConfigError::DuplicateAgent(name));
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<std::sync::Arc<dyn Agent>> {
        self.agents.get(name).cloned()
    }

    /// Runs every registered agent's `start` hook, matching
    /// `app.py:45-46`'s startup loop.
    pub async fn start_all(&self) {
        for agent in self.agents.values() {
            agent.start().await;
        }
    }

    /// Runs every registered agent's `stop` hook, matching
    /// `app.py:68-69`'s shutdown loop.
    pub async fn stop_all(&self) {
        for agent in self.agents.values() {
            agent.stop().await;
        }
    }
}

/// Construct every configured agent, grounded in
/// `orchestrator/agents/__init__.py::build_agents`. Unknown agent
/// types are rejected earlier, at config parse time, since the type
/// tag is resolved by `serde` rather than by a runtime string lookup.
pub fn build_agents(
    configs: &HashMap<String, crate::config::AgentConfig>,
) -> Result<AgentRegistry, crate::error::ConfigError> {
    use crate::config::AgentConfig;

    let mut registry = AgentRegistry::new();
    for (name, cfg) in configs {
        let agent: Arc<dyn Agent> = match cfg {
            AgentConfig::Threshold {
                metric,
                threshold,
                dispatcher,
                target,
            } => Arc::new(threshold::ThresholdAgent::new(
                name.clone(),
                metric.clone(),
                *threshold,
                dispatcher.clone(),
                target.clone(),
            )),
            AgentConfig::PersonInZone { zone, dispatcher, target } => Arc::new(vision::PersonInZoneAgent::new(
                name.clone(),
                zone.clone(),
                dispatcher.clone(),
                target.clone(),
            )),
            AgentConfig::SnapshotArchive { dispatcher, target } => {
                Arc::new(vision::SnapshotArchiveAgent::new(name.clone(), dispatcher.clone(), target.clone()))
            }
        };
        registry.register(agent)?;
    }
    Ok(registry)
}

fn bytes_b64(bytes: &Bytes) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inference_data_renders_outputs_as_base64() {
        let data = AgentData::Inference(InferenceResult {
            status: 0,
            outputs: vec![Bytes::from_static(b"hi")],
        });
        let value = data.as_value();
        assert_eq!(value["status"], 0);
        assert_eq!(value["outputs"][0], bytes_b64(&Bytes::from_static(b"hi")));
    }
}
