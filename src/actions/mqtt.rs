//! MQTT action dispatcher for actuator commands, grounded in
//! `orchestrator/actions/mqtt.py::MQTTDispatcher`.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{envelope, Dispatcher};
use crate::agents::Action;

pub struct MqttDispatcher {
    name: String,
    host: String,
    port: u16,
    username: Option<String>,
    password: Option<String>,
    topic: Option<String>,
    qos: QoS,
    retain: bool,
    client: Mutex<Option<AsyncClient>>,
}

impl MqttDispatcher {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        username: Option<String>,
        password: Option<String>,
        topic: Option<String>,
        qos: u8,
        retain: bool,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            username,
            password,
            topic,
            qos: match qos {
                1 => QoS::AtLeastOnce,
                2 => QoS::ExactlyOnce,
                _ => QoS::AtMostOnce,
            },
            retain,
            client: Mutex::new(None),
        }
    }

    async fn ensure(&self) -> AsyncClient {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref() {
            return client.clone();
        }
        let mut opts = MqttOptions::new(format!("edge-infer-dispatcher-{}", self.name), &self.host, self.port);
        opts.set_keep_alive(Duration::from_secs(30));
        if let (Some(user), Some(pass)) = (&self.username, &self.password) {
            opts.set_credentials(user, pass);
        }
        let (client, mut eventloop) = AsyncClient::new(opts, 32);
        let dispatcher_name = self.name.clone();
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(_) => {}
                    Err(err) => {
                        warn!(dispatcher = %dispatcher_name, error = %err, "mqtt dispatcher event loop error");
                        break;
                    }
                }
            }
        });
        info!(dispatcher = %self.name, host = %self.host, port = self.port, "connected mqtt dispatcher");
        *guard = Some(client.clone());
        client
    }
}

#[async_trait]
impl Dispatcher for MqttDispatcher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn dispatch(&self, action: &Action, agent: &str, pipeline: &str) {
        let topic = action.target.clone().or_else(|| self.topic.clone());
        let Some(topic) = topic else {
            warn!(dispatcher = %self.name, "mqtt dispatcher missing topic");
            return;
        };
        let client = self.ensure().await;
        let body = envelope(action, agent, pipeline);
        let data = match serde_json::to_vec(&body) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(dispatcher = %self.name, error = %err, "failed to serialize mqtt payload");
                return;
            }
        };
        if let Err(err) = client.publish(&topic, self.qos, self.retain, data).await {
            warn!(dispatcher = %self.name, topic = %topic, error = %err, "mqtt publish failed");
        }
    }

    async fn close(&self) {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.take() {
            let _ = client.disconnect().await;
        }
    }
}
