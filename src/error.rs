//! Typed error taxonomy for the orchestrator runtime.
//!
//! Each variant here corresponds to a row of the error handling design:
//! config errors are fatal at startup, transport/gateway errors abort a
//! single message, agent/dispatcher errors are contained and logged.
//! `anyhow::Result` is still used at the process boundary (`main`, CLI),
//! the same layering the teacher uses between `ipc::tcp_socket::IpcError`
//! and the outer `anyhow` call sites.

use thiserror::Error;

/// Failure while loading or validating the configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("pipeline '{pipeline}' references unknown agent '{agent}'")]
    UnknownAgentRef { pipeline: String, agent: String },
    #[error("duplicate pipeline id '{0}'")]
    DuplicatePipeline(String),
    #[error("duplicate connector id '{0}'")]
    DuplicateConnector(String),
    #[error("duplicate dispatcher name '{0}'")]
    DuplicateDispatcher(String),
    #[error("duplicate agent name '{0}'")]
    DuplicateAgent(String),
    #[error("unknown connector type '{0}'")]
    UnknownConnectorType(String),
    #[error("unknown agent type '{0}'")]
    UnknownAgentType(String),
    #[error("unknown dispatcher type '{0}'")]
    UnknownDispatcherType(String),
    #[error("pipeline '{pipeline}' references unresolvable callable '{qualname}'")]
    UnresolvedCallable { pipeline: String, qualname: String },
}

/// Errors surfaced by the wire codec (§4.1).
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum WireError {
    #[error("frame too short: need {need} bytes, have {have}")]
    FrameTooShort { need: usize, have: usize },
    #[error("bad magic bytes")]
    BadMagic,
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u16),
    #[error("unsupported tensor dtype tag {0}")]
    UnsupportedDtype(u8),
    #[error("tensor descriptor length field out of bounds")]
    DescriptorOutOfBounds,
    #[error("output blob length field out of bounds")]
    OutputOutOfBounds,
    #[error("model identifier is not valid UTF-8")]
    InvalidModelId,
    #[error("tensor byte length {actual} does not match dims product {expected}")]
    TensorByteLengthMismatch { expected: usize, actual: usize },
}

/// Errors surfaced by a gateway pool slot (§4.2, §7 `GatewayIOError`).
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("gateway wire protocol error: {0}")]
    Wire(#[from] WireError),
}

/// Reasons a message never reaches pipeline execution, paired 1:1 with
/// the `pipeline_dropped_total{reason}` metric label set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Unmapped,
    Unregistered,
    QueueFull,
    Deadline,
    Exception,
}

impl DropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DropReason::Unmapped => "unmapped",
            DropReason::Unregistered => "unregistered",
            DropReason::QueueFull => "queue_full",
            DropReason::Deadline => "deadline",
            DropReason::Exception => "exception",
        }
    }
}

/// Failure during a single pipeline run (decode/preprocess/infer/postprocess).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("preprocess failed: {0}")]
    Preprocess(String),
    #[error("postprocess failed: {0}")]
    Postprocess(String),
    #[error("gateway call failed: {0}")]
    Gateway(#[from] GatewayError),
    #[error("inference returned nonzero status {0}")]
    InferenceStatus(u32),
    #[error("model configured but preprocess produced no tensors")]
    EmptyTensors,
}
