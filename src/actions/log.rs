//! Dispatcher that just logs the action, grounded in
//! `orchestrator/actions/log.py::LogDispatcher`.

use async_trait::async_trait;
use tracing::info;

use super::Dispatcher;
use crate::agents::Action;

pub struct LogDispatcher {
    name: String,
}

impl LogDispatcher {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Dispatcher for LogDispatcher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn dispatch(&self, action: &Action, agent: &str, pipeline: &str) {
        info!(
            pipeline,
            agent,
            target = ?action.target,
            payload = %action.payload,
            metadata = %action.metadata,
            "action dispatched"
        );
    }
}
