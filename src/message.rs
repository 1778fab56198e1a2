//! Canonical in-flight message envelope (§3 "Message envelope").
//!
//! An [`EdgeMessage`] is immutable after creation except for its
//! `metadata` bag, which preprocess writes and postprocess reads; since a
//! message is owned by exactly one worker at a time (§5 "Shared
//! resources"), no synchronization is required around that mutation.

use std::collections::HashMap;
use std::time::Instant;

use serde_json::Value;

/// Closed set of payload encodings a connector may tag a message with.
///
/// Modeled as an enum with an exhaustive match per REDESIGN FLAGS
/// ("Payload decoding dispatch"): adding a format is a compile-time
/// concern, not a string lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Json,
    Jpeg,
    Base64,
    Npz,
    Bgr,
    Raw,
}

impl Encoding {
    /// Parse a connector-supplied tag, matching the original's
    /// case-insensitive `message.encoding.lower()` dispatch in
    /// `serialization.py`. Unknown tags fall back to `Raw`, mirroring the
    /// Python `decode_payload`'s final `return message.payload`.
    pub fn parse(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "json" => Encoding::Json,
            "jpg" | "jpeg" | "image/jpeg" => Encoding::Jpeg,
            "base64" => Encoding::Base64,
            "npz" => Encoding::Npz,
            "bgr" => Encoding::Bgr,
            _ => Encoding::Raw,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Json => "json",
            Encoding::Jpeg => "jpeg",
            Encoding::Base64 => "base64",
            Encoding::Npz => "npz",
            Encoding::Bgr => "bgr",
            Encoding::Raw => "raw",
        }
    }
}

/// Letterbox parameters a vision preprocess stage leaves for postprocess,
/// per the original `plugins/vision.py::_letterbox` / `yolo_nms` pairing.
#[derive(Debug, Clone, Copy, Default)]
pub struct LetterboxParams {
    pub gain: f32,
    pub pad_w: i32,
    pub pad_h: i32,
}

/// Typed metadata bag (REDESIGN FLAGS "Metadata bag on the message").
///
/// Preprocess and postprocess agree on these field names at compile
/// time instead of through a loose map; `extra` remains open for
/// plugin-specific overflow, matching the spirit of the original's
/// freeform `dict` without losing type safety on the fields every
/// built-in plugin actually needs.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub image_height: Option<u32>,
    pub image_width: Option<u32>,
    pub letterbox: Option<LetterboxParams>,
    pub topic: Option<String>,
    pub extra: HashMap<String, Value>,
}

/// Pipeline id attached to a message by the connector that produced it
/// (§3 invariant: "a message reaches a worker only if its routing hint
/// names a registered pipeline").
pub type RoutingHint = Option<String>;

/// Canonical wrapper around an upstream sensor payload, equivalent to
/// the original `orchestrator/messages.py::EdgeMessage`.
#[derive(Debug, Clone)]
pub struct EdgeMessage {
    pub sensor_id: String,
    pub payload: Vec<u8>,
    pub encoding: Encoding,
    pub timestamp: Instant,
    pub metadata: Metadata,
    pub routing_hint: RoutingHint,
}

impl EdgeMessage {
    pub fn new(sensor_id: impl Into<String>, payload: Vec<u8>, encoding: Encoding) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            payload,
            encoding,
            timestamp: Instant::now(),
            metadata: Metadata::default(),
            routing_hint: None,
        }
    }

    /// Copy this message under a new routing hint, matching
    /// `EdgeMessage.with_pipeline` in the original: messages are copied,
    /// never shared, when re-routed.
    pub fn with_pipeline(&self, pipeline_id: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.routing_hint = Some(pipeline_id.into());
        copy
    }

    /// Age of the message in whole milliseconds, used both for the
    /// pre-execution deadline check (§4.3) and the `pipeline_latency_ms`
    /// metric (§4.6), which is distinct from agent-facing inference
    /// latency (§4.4).
    pub fn age_ms(&self) -> f64 {
        self.timestamp.elapsed().as_secs_f64() * 1000.0
    }
}
