//! HTTP webhook dispatcher for enterprise integrations, grounded in
//! `orchestrator/actions/webhook.py::WebhookDispatcher`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use tracing::{error, warn};

use super::{envelope, Dispatcher};
use crate::agents::Action;

pub struct WebhookDispatcher {
    name: String,
    url: Option<String>,
    method: Method,
    headers: Vec<(String, String)>,
    client: Client,
}

impl WebhookDispatcher {
    pub fn new(
        name: impl Into<String>,
        url: Option<String>,
        method: &str,
        headers: Vec<(String, String)>,
        timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with a finite timeout");
        Self {
            name: name.into(),
            url,
            method: method.parse().unwrap_or(Method::POST),
            headers,
            client,
        }
    }
}

#[async_trait]
impl Dispatcher for WebhookDispatcher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn dispatch(&self, action: &Action, agent: &str, pipeline: &str) {
        let url = action.target.clone().or_else(|| self.url.clone());
        let Some(url) = url else {
            warn!(dispatcher = %self.name, "webhook dispatcher missing url");
            return;
        };

        let body = envelope(action, agent, pipeline);
        let mut request = self
            .client
            .request(self.method.clone(), &url)
            .header("X-Agent", agent)
            .header("X-Pipeline", pipeline)
            .json(&body);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        match request.send().await {
            Ok(response) if response.status().is_client_error() || response.status().is_server_error() => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                error!(
                    dispatcher = %self.name,
                    %status,
                    body = %body.chars().take(200).collect::<String>(),
                    "webhook dispatch failed"
                );
            }
            Ok(_) => {}
            Err(err) => {
                error!(dispatcher = %self.name, error = %err, "webhook request failed");
            }
        }
    }
}
