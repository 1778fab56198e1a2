//! Plugin-by-name preprocess/postprocess resolution (REDESIGN FLAGS
//! "Plugin-by-name preprocess/postprocess"): the original resolves
//! callables by dotted string at import time
//! (`orchestrator/utils.py::resolve_callable`). Here that becomes a
//! registration table populated at program init — pipelines look up a
//! plugin by name and unknown names fail at startup, not per-message.

pub mod env;

use std::collections::HashMap;

use crate::error::PipelineError;
use crate::gateway::InferenceResult;
use crate::message::EdgeMessage;
use crate::payload::Payload;
use crate::wire::TensorDescriptor;

/// Turns a message's decoded payload into tensors, annotating
/// `message.metadata` along the way (§4.4 step 2).
pub type PreprocessFn = fn(&mut EdgeMessage, &Payload) -> Result<Vec<TensorDescriptor>, PipelineError>;

/// Turns a gateway response into the structured object handed to agents
/// (§4.4 step 3).
pub type PostprocessFn =
    fn(&InferenceResult, &EdgeMessage) -> Result<serde_json::Value, PipelineError>;

/// Accepts either `module.function` or `module:function`, resolved
/// against a default plugin namespace when the module prefix is
/// absent, matching `resolve_callable`'s two accepted forms (§6).
fn normalize_qualname(qualname: &str) -> String {
    if let Some((module, func)) = qualname.split_once(':') {
        format!("{module}.{func}")
    } else if qualname.contains('.') {
        qualname.to_string()
    } else {
        format!("plugins.{qualname}")
    }
}

#[derive(Default)]
pub struct PluginRegistry {
    preprocess: HashMap<String, PreprocessFn>,
    postprocess: HashMap<String, PostprocessFn>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the one fully-worked built-in plugin
    /// pair (`env`), matching `orchestrator/plugins/env.py`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_preprocess("env.vector_to_tensor", env::vector_to_tensor);
        registry.register_postprocess("env.identity_vector", env::identity_vector);
        registry.register_postprocess("env.softmax_topk", env::softmax_topk);
        registry
    }

    pub fn register_preprocess(&mut self, qualname: &str, f: PreprocessFn) {
        self.preprocess.insert(normalize_qualname(qualname), f);
    }

    pub fn register_postprocess(&mut self, qualname: &str, f: PostprocessFn) {
        self.postprocess.insert(normalize_qualname(qualname), f);
    }

    pub fn resolve_preprocess(&self, qualname: &str) -> Option<PreprocessFn> {
        self.preprocess.get(&normalize_qualname(qualname)).copied()
    }

    pub fn resolve_postprocess(&self, qualname: &str) -> Option<PostprocessFn> {
        self.postprocess.get(&normalize_qualname(qualname)).copied()
    }
}
