//! Dispatcher registry that fans actions out to concrete transports,
//! grounded in `orchestrator/actions/dispatcher.py`.

pub mod log;
pub mod mqtt;
pub mod webhook;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::Action;

/// A side-effect sink. `dispatch` must never panic into the pipeline;
/// implementations log and swallow their own transport errors (§4.5).
/// `close` runs exactly once at shutdown.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    fn name(&self) -> &str;
    async fn dispatch(&self, action: &Action, agent: &str, pipeline: &str);
    async fn close(&self) {}
}

/// Built once before workers start, read-only thereafter (§5 "Shared
/// resources").
#[derive(Default)]
pub struct DispatcherRegistry {
    dispatchers: HashMap<String, Arc<dyn Dispatcher>>,
}

impl DispatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails fast on a name collision (§4.5 "name collisions at
    /// registration fail fast") rather than silently overwriting the
    /// previous registrant.
    pub fn register(&mut self, dispatcher: Arc<dyn Dispatcher>) -> Result<(), crate::error::ConfigError> {
        let name = dispatcher.name().to_string();
        if self.dispatchers.insert(name.clone(), dispatcher).is_some() {
            return Err(crate::error::ConfigError::DuplicateDispatcher(name));
        }
        Ok(())
    }

    /// Unknown dispatcher names are logged and silently dropped (§4.4
    /// step 4) rather than failing the message that produced them.
    pub async fn dispatch(&self, action: &Action, agent: &str, pipeline: &str) {
        match self.dispatchers.get(&action.dispatcher) {
            Some(dispatcher) => dispatcher.dispatch(action, agent, pipeline).await,
            None => tracing::warn!(dispatcher = %action.dispatcher, "no dispatcher registered for action"),
        }
    }

    pub async fn close(&self) {
        for dispatcher in self.dispatchers.values() {
            dispatcher.close().await;
        }
    }
}

/// Construct every configured dispatcher, grounded in
/// `orchestrator/actions/dispatcher.py::initialise`.
pub fn build_dispatchers(
    configs: &HashMap<String, crate::config::DispatcherConfig>,
) -> Result<DispatcherRegistry, crate::error::ConfigError> {
    use crate::config::DispatcherConfig;

    let mut registry = DispatcherRegistry::new();
    for (name, cfg) in configs {
        let dispatcher: Arc<dyn Dispatcher> = match cfg {
            DispatcherConfig::Log => Arc::new(log::LogDispatcher::new(name.clone())),
            DispatcherConfig::Mqtt {
                host,
                port,
                username,
                password,
                topic,
                qos,
                retain,
            } => Arc::new(mqtt::MqttDispatcher::new(
                name.clone(),
                host.clone(),
                *port,
                username.clone(),
                password.clone(),
                topic.clone(),
                *qos,
                *retain,
            )),
            DispatcherConfig::Webhook {
                url,
                method,
                headers,
                timeout_s,
            } => Arc::new(webhook::WebhookDispatcher::new(
                name.clone(),
                url.clone(),
                method,
                headers.clone().into_iter().collect(),
                std::time::Duration::from_secs_f64(*timeout_s),
            )),
        };
        registry.register(dispatcher)?;
    }
    Ok(registry)
}

/// Merge `{"agent": ..., "pipeline": ...}` in front of an action's
/// payload object, matching the `{"agent": agent, "pipeline": pipeline,
/// **payload}` shape every non-log dispatcher sends on the wire.
pub(crate) fn envelope(action: &Action, agent: &str, pipeline: &str) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    map.insert("agent".to_string(), agent.into());
    map.insert("pipeline".to_string(), pipeline.into());
    if let serde_json::Value::Object(fields) = &action.payload {
        for (k, v) in fields {
            map.insert(k.clone(), v.clone());
        }
    } else {
        map.insert("payload".to_string(), action.payload.clone());
    }
    serde_json::Value::Object(map)
}
