//! Threshold agent for environmental sensing, grounded in
//! `orchestrator/agents/threshold.py::ThresholdAgent`.

use async_trait::async_trait;
use serde_json::json;

use super::{Action, Agent, AgentData};
use crate::message::EdgeMessage;

pub struct ThresholdAgent {
    name: String,
    metric: String,
    threshold: f64,
    dispatcher: String,
    target: Option<String>,
}

impl ThresholdAgent {
    pub fn new(
        name: impl Into<String>,
        metric: impl Into<String>,
        threshold: f64,
        dispatcher: impl Into<String>,
        target: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            metric: metric.into(),
            threshold,
            dispatcher: dispatcher.into(),
            target,
        }
    }
}

#[async_trait]
impl Agent for ThresholdAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, message: &EdgeMessage, data: &AgentData, _latency_ms: f64) -> Vec<Action> {
        let value = data.as_value();
        let Some(current) = value.get(&self.metric).and_then(|v| v.as_f64()) else {
            return Vec::new();
        };
        if current < self.threshold {
            return Vec::new();
        }
        let payload = json!({
            "metric": self.metric,
            "value": current,
            "threshold": self.threshold,
            "sensor": message.sensor_id,
        });
        let mut action = Action::new(self.dispatcher.clone(), payload);
        if let Some(target) = &self.target {
            action = action.with_target(target.clone());
        }
        vec![action]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Encoding;

    #[tokio::test]
    async fn fires_when_at_or_above_threshold() {
        let agent = ThresholdAgent::new("th", "value", 0.5, "log", None);
        let msg = EdgeMessage::new("s1", Vec::new(), Encoding::Raw);
        let data = AgentData::Processed(json!({"value": 0.5}));
        let actions = agent.handle(&msg, &data, 0.0).await;
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].dispatcher, "log");
    }

    #[tokio::test]
    async fn silent_below_threshold() {
        let agent = ThresholdAgent::new("th", "value", 0.5, "log", None);
        let msg = EdgeMessage::new("s1", Vec::new(), Encoding::Raw);
        let data = AgentData::Processed(json!({"value": 0.1}));
        let actions = agent.handle(&msg, &data, 0.0).await;
        assert!(actions.is_empty());
    }
}
