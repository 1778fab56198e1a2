//! Vision agents acting on already-decoded YOLO-style detections,
//! grounded in `orchestrator/agents/vision.py`. The detection numerics
//! themselves (letterboxing, NMS) are out of scope; these agents only
//! consume the `detections` list a postprocess stage already produced.

use async_trait::async_trait;
use serde_json::json;

use super::{Action, Agent, AgentData};
use crate::message::EdgeMessage;

/// Fires when any detection labeled `person` lands in the configured
/// zone (or any zone, if none is configured).
pub struct PersonInZoneAgent {
    name: String,
    zone: Option<String>,
    dispatcher: String,
    target: Option<String>,
}

impl PersonInZoneAgent {
    pub fn new(
        name: impl Into<String>,
        zone: Option<String>,
        dispatcher: impl Into<String>,
        target: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            zone,
            dispatcher: dispatcher.into(),
            target,
        }
    }
}

#[async_trait]
impl Agent for PersonInZoneAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, _message: &EdgeMessage, data: &AgentData, latency_ms: f64) -> Vec<Action> {
        let value = data.as_value();
        let detections = value
            .get("detections")
            .and_then(|d| d.as_array())
            .cloned()
            .unwrap_or_default();

        let hits: Vec<_> = detections
            .into_iter()
            .filter(|det| det.get("label").and_then(|l| l.as_str()) == Some("person"))
            .filter(|det| match &self.zone {
                None => true,
                Some(zone) => det.get("zone").and_then(|z| z.as_str()) == Some(zone.as_str()),
            })
            .collect();

        if hits.is_empty() {
            return Vec::new();
        }

        let payload = json!({ "detections": hits, "latency_ms": latency_ms });
        let mut action = Action::new(self.dispatcher.clone(), payload);
        if let Some(target) = &self.target {
            action = action.with_target(target.clone());
        }
        vec![action]
    }
}

/// Archives a snapshot image attached to the processed payload.
pub struct SnapshotArchiveAgent {
    name: String,
    dispatcher: String,
    target: Option<String>,
}

impl SnapshotArchiveAgent {
    pub fn new(name: impl Into<String>, dispatcher: impl Into<String>, target: Option<String>) -> Self {
        Self {
            name: name.into(),
            dispatcher: dispatcher.into(),
            target,
        }
    }
}

#[async_trait]
impl Agent for SnapshotArchiveAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, message: &EdgeMessage, data: &AgentData, latency_ms: f64) -> Vec<Action> {
        let value = data.as_value();
        let Some(image) = value.get("image").filter(|v| !v.is_null()) else {
            return Vec::new();
        };
        let payload = json!({
            "sensor": message.sensor_id,
            "latency_ms": latency_ms,
            "image": image,
        });
        let mut action = Action::new(self.dispatcher.clone(), payload);
        if let Some(target) = &self.target {
            action = action.with_target(target.clone());
        }
        vec![action]
    }
}
