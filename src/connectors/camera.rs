//! Camera connector contract, grounded in
//! `orchestrator/connectors/camera.py::CameraConnector`. The concrete
//! frame grabber (OpenCV in the original) is transport code out of
//! scope (§1); this connector polls a pluggable [`FrameSource`] on a
//! fixed interval and wraps each frame the same way the original does.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::{Connector, Ingress};
use crate::message::{Encoding, EdgeMessage};

/// Produces one frame's raw bytes per call, or `None` on a transient
/// read failure (mirrors `cap.read()`'s `(ok, frame)` pair).
pub trait FrameSource: Send + Sync {
    fn read_frame(&self) -> Option<Vec<u8>>;
}

pub struct CameraConnector {
    id: String,
    sensor_id: String,
    encoding: Encoding,
    interval: Duration,
    pipeline: Option<String>,
    source: Box<dyn FrameSource>,
}

impl CameraConnector {
    pub fn new(
        id: impl Into<String>,
        sensor_id: impl Into<String>,
        encoding: Encoding,
        interval: Duration,
        pipeline: Option<String>,
        source: Box<dyn FrameSource>,
    ) -> Self {
        Self {
            id: id.into(),
            sensor_id: sensor_id.into(),
            encoding,
            interval,
            pipeline,
            source,
        }
    }
}

#[async_trait]
impl Connector for CameraConnector {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, ingress: Ingress) {
        loop {
            match self.source.read_frame() {
                Some(frame) => {
                    let mut message = EdgeMessage::new(self.sensor_id.clone(), frame, self.encoding);
                    message.routing_hint = self.pipeline.clone();
                    ingress(message);
                }
                None => warn!(connector = %self.id, "camera connector failed to read frame"),
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
