//! Model catalog derived from the backend capability document.
//!
//! ComfyUI lists selectable files as the first element of a node input's
//! declaration, e.g.
//! `CheckpointLoaderSimple.input.required.ckpt_name = [["a.safetensors", ...]]`.

use serde::Serialize;
use serde_json::Value;

use crate::backend::CapabilityDocument;

const LOAD_CHECKPOINT_CLASS: &str = "CheckpointLoaderSimple";
const LOAD_LORA_CLASS: &str = "LoraLoader";

/// Prefix used for user-supplied models on the backend host.
const USER_MODELS_PREFIX: &str = "user_models/";

const SAFETENSORS_EXT: &str = ".safetensors";

/// Catalog grouping for a model file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelCategory {
    Base,
    Lora,
    Merged,
}

/// One selectable model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    /// Exact filename to pass back as the request `model`.
    pub filename: String,
    pub display_name: String,
    pub category: ModelCategory,
}

/// Models grouped by category, each group sorted by display name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModelList {
    pub base: Vec<ModelInfo>,
    pub lora: Vec<ModelInfo>,
    pub merged: Vec<ModelInfo>,
    pub total_count: usize,
}

/// Classify a checkpoint by the directory or name it carries.
///
/// Anything that is not clearly merged or a LoRA counts as a base model.
pub fn categorize(filename: &str) -> ModelCategory {
    let lower = filename.to_lowercase();
    if lower.contains("base") {
        ModelCategory::Base
    } else if lower.contains("merged") {
        ModelCategory::Merged
    } else if lower.contains("lora") {
        ModelCategory::Lora
    } else {
        ModelCategory::Base
    }
}

/// Strip the user-models prefix and the `.safetensors` extension.
pub fn display_name(filename: &str) -> String {
    let name = filename.strip_prefix(USER_MODELS_PREFIX).unwrap_or(filename);
    name.strip_suffix(SAFETENSORS_EXT).unwrap_or(name).to_string()
}

/// Build the model catalog from a capability document.
///
/// Missing node classes or unexpected shapes simply yield empty groups.
pub fn catalog(capabilities: &CapabilityDocument) -> ModelList {
    let mut list = ModelList::default();

    for filename in choice_list(capabilities, LOAD_CHECKPOINT_CLASS, "ckpt_name") {
        let info = ModelInfo {
            display_name: display_name(filename),
            category: categorize(filename),
            filename: filename.to_string(),
        };
        match info.category {
            ModelCategory::Base => list.base.push(info),
            ModelCategory::Merged => list.merged.push(info),
            ModelCategory::Lora => list.lora.push(info),
        }
    }

    for filename in choice_list(capabilities, LOAD_LORA_CLASS, "lora_name") {
        list.lora.push(ModelInfo {
            display_name: display_name(filename),
            category: ModelCategory::Lora,
            filename: filename.to_string(),
        });
    }

    for group in [&mut list.base, &mut list.lora, &mut list.merged] {
        group.sort_by(|a, b| a.display_name.cmp(&b.display_name));
    }
    list.total_count = list.base.len() + list.lora.len() + list.merged.len();
    list
}

/// `doc[class].input.required[input][0]` as a list of strings.
fn choice_list<'a>(doc: &'a Value, class: &str, input: &str) -> Vec<&'a str> {
    doc.get(class)
        .and_then(|c| c.get("input"))
        .and_then(|i| i.get("required"))
        .and_then(|r| r.get(input))
        .and_then(|decl| decl.get(0))
        .and_then(Value::as_array)
        .map(|choices| choices.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}
