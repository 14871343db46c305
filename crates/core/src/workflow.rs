//! Workflow templates and request-to-workflow translation.
//!
//! A template is a ComfyUI API-format workflow (an object of node id ->
//! `{class_type, inputs}`). [`TemplateBindings::discover`] locates the six
//! inputs a request controls by following the sampler's links:
//!
//! ```text
//! KSampler.seed / .steps / .cfg
//! KSampler.positive -> CLIPTextEncode.text
//! KSampler.negative -> CLIPTextEncode.text
//! CheckpointLoaderSimple.ckpt_name
//! ```
//!
//! [`WorkflowBuilder`] clones the template and overwrites exactly those
//! six inputs; every other node and input is left as the template has it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use rand::Rng;
use serde_json::Value;

use crate::error::CoreError;
use crate::generation::GenerationRequest;

/// Generation kind served by the built-in template.
pub const TEXT_TO_IMAGE: &str = "text-to-image";

/// Built-in text-to-image workflow.
const TXT2IMG_BASIC: &str = include_str!("../templates/txt2img_basic.json");

const KSAMPLER_CLASS: &str = "KSampler";
const CLIP_TEXT_ENCODE_CLASS: &str = "CLIPTextEncode";
const LOAD_CHECKPOINT_CLASS: &str = "CheckpointLoaderSimple";

// ---------------------------------------------------------------------------
// Seed source
// ---------------------------------------------------------------------------

/// Source of random seeds for requests that ask for one.
pub trait SeedSource: Send + Sync {
    /// Draw a seed uniformly from the full `u32` range.
    fn next_seed(&self) -> u32;
}

/// Production seed source backed by the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngSeeds;

impl SeedSource for ThreadRngSeeds {
    fn next_seed(&self) -> u32 {
        rand::rng().random()
    }
}

/// Seed source that always returns the same value.
#[derive(Debug, Clone, Copy)]
pub struct FixedSeed(pub u32);

impl SeedSource for FixedSeed {
    fn next_seed(&self) -> u32 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// Location of one input field inside a workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRef {
    pub node: String,
    pub input: String,
}

impl InputRef {
    fn new(node: &str, input: &str) -> Self {
        Self {
            node: node.to_string(),
            input: input.to_string(),
        }
    }
}

/// The inputs of a template that a request overwrites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateBindings {
    pub checkpoint: InputRef,
    pub positive: InputRef,
    pub negative: InputRef,
    pub seed: InputRef,
    pub steps: InputRef,
    pub cfg: InputRef,
}

impl TemplateBindings {
    /// Find the bound inputs of a workflow.
    ///
    /// Uses the first `KSampler` (by node id) and follows its `positive`
    /// and `negative` links to the prompt encoders. The checkpoint is the
    /// sampler's `model` source when it is a checkpoint loader, otherwise
    /// the first `CheckpointLoaderSimple`.
    pub fn discover(kind: &str, workflow: &Value) -> Result<Self, CoreError> {
        let nodes = workflow.as_object().ok_or_else(|| {
            CoreError::TemplateNotFound(format!("template '{kind}' is not a JSON object"))
        })?;

        let mut ids: Vec<&String> = nodes.keys().collect();
        ids.sort_by(|a, b| compare_node_ids(a, b));

        let class_of = |id: &str| {
            nodes
                .get(id)
                .and_then(|n| n.get("class_type"))
                .and_then(Value::as_str)
        };

        let sampler = ids
            .iter()
            .find(|id| class_of(id.as_str()) == Some(KSAMPLER_CLASS))
            .ok_or_else(|| {
                CoreError::TemplateNotFound(format!("template '{kind}' has no {KSAMPLER_CLASS} node"))
            })?;
        let sampler_inputs = &nodes[sampler.as_str()]["inputs"];

        let linked = |input: &str| -> Result<String, CoreError> {
            let target = link_target(&sampler_inputs[input]).ok_or_else(|| {
                CoreError::TemplateNotFound(format!(
                    "template '{kind}': {KSAMPLER_CLASS}.{input} is not linked to a node"
                ))
            })?;
            if class_of(target) != Some(CLIP_TEXT_ENCODE_CLASS) {
                return Err(CoreError::TemplateNotFound(format!(
                    "template '{kind}': {KSAMPLER_CLASS}.{input} does not lead to {CLIP_TEXT_ENCODE_CLASS}"
                )));
            }
            Ok(target.to_string())
        };
        let positive = linked("positive")?;
        let negative = linked("negative")?;

        let checkpoint = link_target(&sampler_inputs["model"])
            .filter(|&id| class_of(id) == Some(LOAD_CHECKPOINT_CLASS))
            .map(str::to_string)
            .or_else(|| {
                ids.iter()
                    .find(|id| class_of(id.as_str()) == Some(LOAD_CHECKPOINT_CLASS))
                    .map(|id| id.to_string())
            })
            .ok_or_else(|| {
                CoreError::TemplateNotFound(format!(
                    "template '{kind}' has no {LOAD_CHECKPOINT_CLASS} node"
                ))
            })?;

        Ok(Self {
            checkpoint: InputRef::new(&checkpoint, "ckpt_name"),
            positive: InputRef::new(&positive, "text"),
            negative: InputRef::new(&negative, "text"),
            seed: InputRef::new(sampler.as_str(), "seed"),
            steps: InputRef::new(sampler.as_str(), "steps"),
            cfg: InputRef::new(sampler.as_str(), "cfg"),
        })
    }
}

/// A named workflow template with its discovered bindings.
#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
    pub kind: String,
    pub workflow: Value,
    pub bindings: TemplateBindings,
}

impl WorkflowTemplate {
    /// Parse a template document and discover its bindings.
    pub fn parse(kind: impl Into<String>, json: &str) -> Result<Self, CoreError> {
        let kind = kind.into();
        let workflow: Value = serde_json::from_str(json).map_err(|e| {
            CoreError::TemplateNotFound(format!("template '{kind}' is not valid JSON: {e}"))
        })?;
        let bindings = TemplateBindings::discover(&kind, &workflow)?;
        Ok(Self {
            kind,
            workflow,
            bindings,
        })
    }
}

/// Templates indexed by generation kind.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Arc<WorkflowTemplate>>,
}

impl TemplateRegistry {
    /// Registry containing only the compiled-in templates.
    pub fn builtin() -> Result<Self, CoreError> {
        let mut registry = Self::default();
        registry.insert(WorkflowTemplate::parse(TEXT_TO_IMAGE, TXT2IMG_BASIC)?);
        Ok(registry)
    }

    /// Built-in templates plus every `<kind>.json` in `dir`.
    ///
    /// A file whose stem matches a built-in kind replaces it.
    pub fn with_dir(dir: &Path) -> Result<Self, CoreError> {
        let mut registry = Self::builtin()?;
        let entries = std::fs::read_dir(dir).map_err(|e| {
            CoreError::TemplateNotFound(format!("cannot read workflow dir {}: {e}", dir.display()))
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(kind) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let json = std::fs::read_to_string(&path).map_err(|e| {
                CoreError::TemplateNotFound(format!("cannot read {}: {e}", path.display()))
            })?;
            registry.insert(WorkflowTemplate::parse(kind, &json)?);
        }
        Ok(registry)
    }

    pub fn insert(&mut self, template: WorkflowTemplate) {
        self.templates
            .insert(template.kind.clone(), Arc::new(template));
    }

    pub fn get(&self, kind: &str) -> Result<Arc<WorkflowTemplate>, CoreError> {
        self.templates
            .get(kind)
            .cloned()
            .ok_or_else(|| CoreError::TemplateNotFound(kind.to_string()))
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Backend-ready job description.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDescription {
    pub kind: String,
    /// The filled-in workflow document.
    pub workflow: Value,
    /// Seed written into the workflow.
    pub seed: u32,
}

/// Translates generation requests into workflows.
#[derive(Clone)]
pub struct WorkflowBuilder {
    templates: Arc<TemplateRegistry>,
    seeds: Arc<dyn SeedSource>,
}

impl WorkflowBuilder {
    pub fn new(templates: Arc<TemplateRegistry>, seeds: Arc<dyn SeedSource>) -> Self {
        Self { templates, seeds }
    }

    /// Return a copy of `request` whose seed is never the random sentinel.
    ///
    /// Callers that may rebuild the same request (e.g. on a retried
    /// submission) resolve once and build from the result.
    pub fn resolve_seed(&self, request: &GenerationRequest) -> GenerationRequest {
        let mut resolved = request.clone();
        if resolved.wants_random_seed() {
            resolved.seed = i64::from(self.seeds.next_seed());
        }
        resolved
    }

    /// Build a text-to-image job description.
    pub fn build(&self, request: &GenerationRequest) -> Result<JobDescription, CoreError> {
        self.build_for(TEXT_TO_IMAGE, request)
    }

    /// Build a job description from the template registered for `kind`.
    pub fn build_for(
        &self,
        kind: &str,
        request: &GenerationRequest,
    ) -> Result<JobDescription, CoreError> {
        if request.prompt.trim().is_empty() {
            return Err(CoreError::InvalidRequest("prompt: must not be empty".into()));
        }
        if request.model.trim().is_empty() {
            return Err(CoreError::InvalidRequest("model: must not be empty".into()));
        }

        let template = self.templates.get(kind)?;
        let seed = if request.wants_random_seed() {
            self.seeds.next_seed()
        } else {
            u32::try_from(request.seed).map_err(|_| {
                CoreError::InvalidRequest(format!("seed: {} is out of range", request.seed))
            })?
        };

        let b = &template.bindings;
        let mut workflow = template.workflow.clone();
        set_input(&mut workflow, kind, &b.checkpoint, Value::from(request.model.as_str()))?;
        set_input(&mut workflow, kind, &b.positive, Value::from(request.prompt.as_str()))?;
        set_input(
            &mut workflow,
            kind,
            &b.negative,
            Value::from(request.negative_prompt_or_default()),
        )?;
        set_input(&mut workflow, kind, &b.seed, Value::from(seed))?;
        set_input(&mut workflow, kind, &b.steps, Value::from(request.steps))?;
        set_input(&mut workflow, kind, &b.cfg, Value::from(request.cfg))?;

        Ok(JobDescription {
            kind: kind.to_string(),
            workflow,
            seed,
        })
    }
}

// ---- helpers ----

fn set_input(
    workflow: &mut Value,
    kind: &str,
    at: &InputRef,
    value: Value,
) -> Result<(), CoreError> {
    let inputs = workflow
        .get_mut(&at.node)
        .and_then(|n| n.get_mut("inputs"))
        .and_then(Value::as_object_mut)
        .ok_or_else(|| {
            CoreError::TemplateNotFound(format!("template '{kind}' has no inputs on node {}", at.node))
        })?;
    inputs.insert(at.input.clone(), value);
    Ok(())
}

/// `["5", 0]` -> `Some("5")`.
fn link_target(value: &Value) -> Option<&str> {
    value.as_array()?.first()?.as_str()
}

/// Numeric ids sort numerically, anything else lexically after them.
pub fn compare_node_ids(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
