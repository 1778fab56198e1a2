//! Per-message execution chain: decode → preprocess → infer →
//! postprocess → agents → dispatch (§4.4), grounded in
//! `orchestrator/pipeline.py::Pipeline.run`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tracing::{error, warn};

use crate::actions::DispatcherRegistry;
use crate::agents::{Agent, AgentData};
use crate::agents::AgentRegistry;
use crate::config::PipelineConfig;
use crate::error::ConfigError;
use crate::gateway::GatewayPool;
use crate::message::EdgeMessage;
use crate::payload;
use crate::plugins::{PluginRegistry, PostprocessFn, PreprocessFn};

/// A pipeline's built, ready-to-run form — refs resolved, agents
/// looked up from the shared registry (§3 "Pipeline definition").
pub struct Pipeline {
    pub id: String,
    pub model: Option<String>,
    pub preprocess: PreprocessFn,
    pub postprocess: Option<PostprocessFn>,
    pub agents: Vec<Arc<dyn Agent>>,
    pub deadline_ms: Option<u64>,
    semaphore: Option<Semaphore>,
}

impl Pipeline {
    pub fn new(
        id: impl Into<String>,
        model: Option<String>,
        preprocess: PreprocessFn,
        postprocess: Option<PostprocessFn>,
        agents: Vec<Arc<dyn Agent>>,
        deadline_ms: Option<u64>,
        max_parallel: Option<usize>,
    ) -> Self {
        Self {
            id: id.into(),
            model,
            preprocess,
            postprocess,
            agents,
            deadline_ms,
            semaphore: max_parallel.map(Semaphore::new),
        }
    }

    /// True once `now - message.timestamp > deadline_ms` (§4.3 dequeue
    /// check). Pure so the scheduler can call it before doing any work.
    pub fn is_past_deadline(&self, message: &EdgeMessage) -> bool {
        match self.deadline_ms {
            Some(deadline) => message.age_ms() > deadline as f64,
            None => false,
        }
    }

    pub async fn run(&self, mut message: EdgeMessage, gateway: &GatewayPool, dispatchers: &DispatcherRegistry) {
        let start = Instant::now();
        let payload_obj = match payload::decode(&message) {
            Ok(p) => p,
            Err(err) => {
                error!(pipeline = %self.id, sensor = %message.sensor_id, error = %err, "payload decode failed");
                return;
            }
        };

        let tensors = match (self.preprocess)(&mut message, &payload_obj) {
            Ok(t) => t,
            Err(err) => {
                error!(pipeline = %self.id, sensor = %message.sensor_id, error = %err, "preprocess failed");
                return;
            }
        };

        let (data, latency_ms) = match (&self.model, tensors.is_empty()) {
            (Some(model), false) => {
                let _permit = match &self.semaphore {
                    Some(sem) => Some(sem.acquire().await.expect("semaphore never closed")),
                    None => None,
                };
                let result = match gateway.infer(model, tensors).await {
                    Ok(r) => r,
                    Err(err) => {
                        error!(pipeline = %self.id, sensor = %message.sensor_id, error = %err, "gateway call failed");
                        return;
                    }
                };
                let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
                if result.status != 0 {
                    error!(pipeline = %self.id, status = result.status, "inference returned nonzero status");
                    return;
                }
                let data = match &self.postprocess {
                    Some(postprocess) => match postprocess(&result, &message) {
                        Ok(value) => AgentData::Processed(value),
                        Err(err) => {
                            error!(pipeline = %self.id, error = %err, "postprocess failed");
                            return;
                        }
                    },
                    None => AgentData::Inference(result),
                };
                (data, latency_ms)
            }
            (Some(_), true) => {
                warn!(pipeline = %self.id, sensor = %message.sensor_id, "preprocess produced no tensors; dropping message");
                return;
            }
            (None, _) => (AgentData::Decoded(payload_obj), 0.0),
        };

        self.run_agents(&message, &data, latency_ms, dispatchers).await;
    }

    /// A panicking agent or dispatcher is contained to its own turn
    /// (§8 property 6 "Dispatcher isolation"): the remaining agents for
    /// this message, and the remaining actions of any agent, still run.
    async fn run_agents(
        &self,
        message: &EdgeMessage,
        data: &AgentData,
        latency_ms: f64,
        dispatchers: &DispatcherRegistry,
    ) {
        for agent in &self.agents {
            let handled = AssertUnwindSafe(agent.handle(message, data, latency_ms)).catch_unwind().await;
            let actions = match handled {
                Ok(actions) => actions,
                Err(_) => {
                    error!(pipeline = %self.id, agent = agent.name(), "agent panicked; skipping");
                    continue;
                }
            };
            for action in actions {
                let dispatched = AssertUnwindSafe(dispatchers.dispatch(&action, agent.name(), &self.id))
                    .catch_unwind()
                    .await;
                if dispatched.is_err() {
                    error!(pipeline = %self.id, agent = agent.name(), dispatcher = %action.dispatcher, "dispatcher panicked; skipping");
                }
            }
        }
    }
}

/// Resolve every configured pipeline's preprocess/postprocess qualnames
/// and agent ids against the shared registries, grounded in
/// `orchestrator/app.py::build_pipelines`. Agent refs are already
/// checked by [`crate::config::OrchestratorConfig::load`]; this is the
/// analogous check for plugin qualnames, which aren't resolvable until
/// the binary's [`PluginRegistry`] exists.
pub fn build_pipelines(
    configs: &[PipelineConfig],
    plugins: &PluginRegistry,
    agents: &AgentRegistry,
) -> Result<Vec<Pipeline>, ConfigError> {
    configs
        .iter()
        .map(|cfg| {
            let preprocess = plugins.resolve_preprocess(&cfg.preprocess).ok_or_else(|| ConfigError::UnresolvedCallable {
                pipeline: cfg.id.clone(),
                qualname: cfg.preprocess.clone(),
            })?;
            let postprocess = cfg
                .postprocess
                .as_ref()
                .map(|qualname| {
                    plugins.resolve_postprocess(qualname).ok_or_else(|| ConfigError::UnresolvedCallable {
                        pipeline: cfg.id.clone(),
                        qualname: qualname.clone(),
                    })
                })
                .transpose()?;
            let resolved_agents = cfg
                .agents
                .iter()
                .map(|name| {
                    agents.get(name).ok_or_else(|| ConfigError::UnknownAgentRef {
                        pipeline: cfg.id.clone(),
                        agent: name.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Pipeline::new(
                cfg.id.clone(),
                cfg.model.clone(),
                preprocess,
                postprocess,
                resolved_agents,
                cfg.deadline_ms,
                cfg.max_parallel,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::Action;
    use crate::actions::log::LogDispatcher;
    use crate::message::Encoding;
    use crate::plugins::env;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAgent {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Agent for CountingAgent {
        fn name(&self) -> &str {
            "counting"
        }

        async fn handle(&self, _message: &EdgeMessage, _data: &AgentData, _latency_ms: f64) -> Vec<Action> {
            self.count.fetch_add(1, Ordering::SeqCst);
            vec![Action::new("log", serde_json::json!({}))]
        }
    }

    #[tokio::test]
    async fn no_model_configured_passes_decoded_payload_to_agents() {
        let count = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(
            "env",
            None,
            env::vector_to_tensor,
            None,
            vec![Arc::new(CountingAgent { count: count.clone() })],
            None,
            None,
        );
        let mut dispatchers = DispatcherRegistry::new();
        dispatchers.register(Arc::new(LogDispatcher::new("log"))).unwrap();
        let message = EdgeMessage::new("s1", br#"{"a": 1.0}"#.to_vec(), Encoding::Json);
        pipeline.run(message, &GatewayPool::new("127.0.0.1", 0, 1), &dispatchers).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deadline_check_is_pure() {
        let pipeline = Pipeline::new("p", None, env::vector_to_tensor, None, Vec::new(), Some(1), None);
        let message = EdgeMessage::new("s1", Vec::new(), Encoding::Raw);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(pipeline.is_past_deadline(&message));
    }

    struct PanickingAgent;

    #[async_trait]
    impl Agent for PanickingAgent {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn handle(&self, _message: &EdgeMessage, _data: &AgentData, _latency_ms: f64) -> Vec<Action> {
            panic!("boom");
        }
    }

    struct PanickingDispatcher;

    #[async_trait]
    impl crate::actions::Dispatcher for PanickingDispatcher {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn dispatch(&self, _action: &Action, _agent: &str, _pipeline: &str) {
            panic!("boom");
        }
    }

    struct TwoActionAgent;

    #[async_trait]
    impl Agent for TwoActionAgent {
        fn name(&self) -> &str {
            "two-action"
        }

        async fn handle(&self, _message: &EdgeMessage, _data: &AgentData, _latency_ms: f64) -> Vec<Action> {
            vec![Action::new("panicking", serde_json::json!({})), Action::new("log", serde_json::json!({}))]
        }
    }

    #[tokio::test]
    async fn panicking_dispatcher_does_not_block_subsequent_actions() {
        let pipeline = Pipeline::new("env", None, env::vector_to_tensor, None, vec![Arc::new(TwoActionAgent)], None, None);
        let mut dispatchers = DispatcherRegistry::new();
        dispatchers.register(Arc::new(PanickingDispatcher)).unwrap();
        dispatchers.register(Arc::new(LogDispatcher::new("log"))).unwrap();
        let message = EdgeMessage::new("s1", br#"{"a": 1.0}"#.to_vec(), Encoding::Json);
        // Reaching completion without a propagated panic is the assertion.
        pipeline.run(message, &GatewayPool::new("127.0.0.1", 0, 1), &dispatchers).await;
    }

    #[tokio::test]
    async fn panicking_agent_does_not_block_subsequent_agents() {
        let count = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(
            "env",
            None,
            env::vector_to_tensor,
            None,
            vec![Arc::new(PanickingAgent), Arc::new(CountingAgent { count: count.clone() })],
            None,
            None,
        );
        let mut dispatchers = DispatcherRegistry::new();
        dispatchers.register(Arc::new(LogDispatcher::new("log"))).unwrap();
        let message = EdgeMessage::new("s1", br#"{"a": 1.0}"#.to_vec(), Encoding::Json);
        pipeline.run(message, &GatewayPool::new("127.0.0.1", 0, 1), &dispatchers).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
