//! The scheduling core (§4.3): a bounded ingress queue fed by
//! connectors, drained by a worker pool that enforces per-pipeline
//! deadlines and records drop/latency metrics. Grounded in
//! `orchestrator/app.py::EdgeOrchestrator`.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::actions::DispatcherRegistry;
use crate::agents::AgentRegistry;
use crate::connectors::{Connector, Ingress};
use crate::error::DropReason;
use crate::gateway::GatewayPool;
use crate::message::EdgeMessage;
use crate::metrics;
use crate::pipeline::Pipeline;

/// `None` is the shutdown sentinel: one is pushed per worker so each
/// worker's `recv` loop terminates on its own turn rather than racing a
/// shared flag (§4.3 "Shutdown").
type QueueItem = Option<(String, EdgeMessage)>;

pub struct Scheduler {
    pipelines: HashMap<String, Arc<Pipeline>>,
    gateway: Arc<GatewayPool>,
    dispatchers: Arc<DispatcherRegistry>,
    agents: Arc<AgentRegistry>,
    tx: mpsc::Sender<QueueItem>,
    rx: Arc<Mutex<mpsc::Receiver<QueueItem>>>,
    worker_count: usize,
    connector_handles: Vec<JoinHandle<()>>,
    worker_handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(
        pipelines: Vec<Pipeline>,
        gateway: GatewayPool,
        dispatchers: DispatcherRegistry,
        agents: AgentRegistry,
    ) -> Self {
        let worker_count = 2.max(pipelines.len());
        let (tx, rx) = mpsc::channel(crate::defaults::INGRESS_QUEUE_CAPACITY);
        let pipelines = pipelines
            .into_iter()
            .map(|p| (p.id.clone(), Arc::new(p)))
            .collect();
        Self {
            pipelines,
            gateway: Arc::new(gateway),
            dispatchers: Arc::new(dispatchers),
            agents: Arc::new(agents),
            tx,
            rx: Arc::new(Mutex::new(rx)),
            worker_count,
            connector_handles: Vec::new(),
            worker_handles: Vec::new(),
        }
    }

    /// Runs every registered agent's `start` hook (§4.3 startup order:
    /// agents are started before workers begin draining the queue).
    pub async fn start_agents(&self) {
        self.agents.start_all().await;
    }

    /// The non-blocking `enqueue(message)` every connector is handed a
    /// reference to (§4.3 "Ingress path"). Never suspends; a full queue
    /// is a drop, not a wait.
    pub fn ingress(&self) -> Ingress {
        let tx = self.tx.clone();
        let pipelines: std::collections::HashSet<String> = self.pipelines.keys().cloned().collect();
        Arc::new(move |message: EdgeMessage| {
            let Some(pipeline_id) = message.routing_hint.clone() else {
                warn!(sensor = %message.sensor_id, "message missing pipeline mapping");
                metrics::dropped("unknown", DropReason::Unmapped);
                return;
            };
            if !pipelines.contains(&pipeline_id) {
                warn!(pipeline = %pipeline_id, "pipeline not registered");
                metrics::dropped(&pipeline_id, DropReason::Unregistered);
                return;
            }
            match tx.try_send(Some((pipeline_id.clone(), message))) {
                Ok(()) => {
                    metrics::ingress(&pipeline_id);
                    metrics::queue_depth(tx.max_capacity() - tx.capacity());
                }
                Err(_) => {
                    metrics::dropped(&pipeline_id, DropReason::QueueFull);
                    error!(pipeline = %pipeline_id, "pipeline queue full; dropping message");
                }
            }
        })
    }

    /// Number of messages currently parked in the ingress queue.
    /// Exposed for tests exercising backpressure; production code only
    /// needs the gauge `metrics::queue_depth` already reports per push.
    pub fn queue_len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn start_connectors(&mut self, connectors: Vec<Box<dyn Connector>>) {
        let ingress = self.ingress();
        for connector in connectors {
            let ingress = ingress.clone();
            let id = connector.id().to_string();
            let handle = tokio::spawn(async move {
                connector.run(ingress).await;
            });
            info!(connector = %id, "connector started");
            self.connector_handles.push(handle);
        }
    }

    pub fn start_workers(&mut self) {
        for idx in 0..self.worker_count {
            let rx = self.rx.clone();
            let pipelines = self.pipelines.clone();
            let gateway = self.gateway.clone();
            let dispatchers = self.dispatchers.clone();
            let handle = tokio::spawn(async move {
                worker_loop(idx, rx, pipelines, gateway, dispatchers).await;
            });
            self.worker_handles.push(handle);
        }
        info!(workers = self.worker_count, pipelines = self.pipelines.len(), "orchestrator started");
    }

    /// Pushes one sentinel per worker, stops connectors, joins workers,
    /// stops agents, then closes the gateway pool and dispatchers — in
    /// that exact order (§4.3 "Shutdown").
    pub async fn shutdown(mut self) {
        for handle in self.connector_handles.drain(..) {
            handle.abort();
        }
        for _ in 0..self.worker_count {
            let _ = self.tx.send(None).await;
        }
        for handle in self.worker_handles.drain(..) {
            let _ = handle.await;
        }
        self.agents.stop_all().await;
        self.gateway.close().await;
        self.dispatchers.close().await;
        info!("orchestrator shut down");
    }
}

async fn worker_loop(
    idx: usize,
    rx: Arc<Mutex<mpsc::Receiver<QueueItem>>>,
    pipelines: HashMap<String, Arc<Pipeline>>,
    gateway: Arc<GatewayPool>,
    dispatchers: Arc<DispatcherRegistry>,
) {
    loop {
        let item = rx.lock().await.recv().await;
        let Some(Some((pipeline_id, message))) = item else {
            break;
        };

        let Some(pipeline) = pipelines.get(&pipeline_id) else {
            continue;
        };

        if pipeline.is_past_deadline(&message) {
            metrics::dropped(&pipeline_id, DropReason::Deadline);
            warn!(pipeline = %pipeline_id, worker = idx, age_ms = message.age_ms(), "dropping message past deadline");
            continue;
        }

        let timestamp = message.timestamp;
        let result = AssertUnwindSafe(pipeline.run(message, &gateway, &dispatchers))
            .catch_unwind()
            .await;
        match result {
            Ok(()) => metrics::latency_ms(&pipeline_id, timestamp.elapsed().as_secs_f64() * 1000.0),
            Err(_) => {
                metrics::dropped(&pipeline_id, DropReason::Exception);
                error!(pipeline = %pipeline_id, worker = idx, "pipeline processing panicked");
            }
        }
    }
}
