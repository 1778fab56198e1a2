//! BLE connector contract, grounded in
//! `orchestrator/connectors/ble.py::BLEConnector`. The concrete GATT
//! stack (bleak in the original) is transport code out of scope (§1);
//! this connector polls a pluggable [`CharacteristicSource`] on a fixed
//! interval, reconnecting with a bounded sleep on error the same way
//! the original's outer `while True: try/except` loop does.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::{Connector, Ingress};
use crate::message::{Encoding, EdgeMessage};

/// One GATT characteristic read, or an error if the device dropped.
pub trait CharacteristicSource: Send + Sync {
    fn read_characteristic(&self) -> Result<Vec<u8>, String>;
}

pub struct BleConnector {
    id: String,
    sensor_id: String,
    encoding: Encoding,
    poll_interval: Duration,
    pipeline: Option<String>,
    source: Box<dyn CharacteristicSource>,
}

impl BleConnector {
    pub fn new(
        id: impl Into<String>,
        sensor_id: impl Into<String>,
        encoding: Encoding,
        poll_interval: Duration,
        pipeline: Option<String>,
        source: Box<dyn CharacteristicSource>,
    ) -> Self {
        Self {
            id: id.into(),
            sensor_id: sensor_id.into(),
            encoding,
            poll_interval,
            pipeline,
            source,
        }
    }
}

#[async_trait]
impl Connector for BleConnector {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, ingress: Ingress) {
        loop {
            match self.source.read_characteristic() {
                Ok(data) => {
                    let mut message = EdgeMessage::new(self.sensor_id.clone(), data, self.encoding);
                    message.routing_hint = self.pipeline.clone();
                    ingress(message);
                }
                Err(err) => {
                    warn!(connector = %self.id, error = %err, "ble connector error; reconnecting");
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
