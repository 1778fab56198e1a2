//! MQTT connector for Wi-Fi/ESP edge nodes, grounded in
//! `orchestrator/connectors/mqtt.py::MQTTConnector`.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tracing::{info, warn};

use super::{topic_matches, Connector, Ingress, TopicRoute};
use crate::message::{Encoding, EdgeMessage};

pub struct MqttConnector {
    id: String,
    host: String,
    port: u16,
    username: Option<String>,
    password: Option<String>,
    routes: Vec<TopicRoute>,
    reconnect_interval: Duration,
}

impl MqttConnector {
    pub fn new(
        id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        username: Option<String>,
        password: Option<String>,
        routes: Vec<TopicRoute>,
        reconnect_interval: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
            username,
            password,
            routes,
            reconnect_interval,
        }
    }

    fn match_route(&self, topic: &str) -> Option<&TopicRoute> {
        self.routes.iter().find(|route| topic_matches(&route.filter, topic))
    }
}

#[async_trait]
impl Connector for MqttConnector {
    fn id(&self) -> &str {
        &self.id
    }

    /// Reconnects with a bounded sleep on transport error, matching the
    /// original's outer `while True: try/except MqttError` loop.
    async fn run(&self, ingress: Ingress) {
        loop {
            let mut opts = MqttOptions::new(format!("edge-infer-connector-{}", self.id), &self.host, self.port);
            opts.set_keep_alive(Duration::from_secs(30));
            if let (Some(user), Some(pass)) = (&self.username, &self.password) {
                opts.set_credentials(user, pass);
            }
            let (client, mut eventloop) = AsyncClient::new(opts, 64);

            for route in &self.routes {
                if let Err(err) = client.subscribe(&route.filter, QoS::AtMostOnce).await {
                    warn!(connector = %self.id, topic = %route.filter, error = %err, "mqtt subscribe failed");
                }
            }
            info!(connector = %self.id, routes = self.routes.len(), "mqtt connector subscribed");

            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let Some(route) = self.match_route(&publish.topic) else {
                            continue;
                        };
                        let sensor_id = route.sensor_id.clone().unwrap_or_else(|| publish.topic.clone());
                        let mut message = EdgeMessage::new(sensor_id, publish.payload.to_vec(), Encoding::parse(&route.encoding));
                        message.metadata.topic = Some(publish.topic.clone());
                        message.routing_hint = Some(route.pipeline.clone());
                        ingress(message);
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(connector = %self.id, error = %err, "mqtt connector lost connection; retrying");
                        break;
                    }
                }
            }
            tokio::time::sleep(self.reconnect_interval).await;
        }
    }
}
