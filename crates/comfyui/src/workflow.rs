//! Workflow templates, slot bindings, and job compilation.
//!
//! A ComfyUI workflow is a JSON object keyed by string node ids, each
//! node carrying an `inputs` mapping. [`SlotBindings`] names the
//! handful of slots this service writes to, so node ids live in
//! configuration instead of being scattered through the code as magic
//! strings. [`compile`] clones the shared template, binds the caller's
//! parameters plus a fresh random seed, and hands back a
//! [`BoundWorkflow`] ready for submission.

use std::collections::HashMap;
use std::path::Path;

use rand::Rng as _;
use serde_json::Value;

use backdrop_core::types::{ImageInput, JobParameters};

/// One writable input slot: a node id plus the input name inside that
/// node's `inputs` mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// String key of the node in the workflow document.
    pub node_id: String,
    /// Input name within the node's `inputs` object.
    pub input: String,
}

impl Slot {
    pub fn new(node_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            input: input.into(),
        }
    }
}

/// Shape of the payload the output node produces in `/history`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactShape {
    /// A `(filename, subfolder, type)` record requiring a `/view` fetch.
    Reference,
    /// A base64 string embedded directly in the history payload.
    Inline,
}

impl std::str::FromStr for ArtifactShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reference" => Ok(Self::Reference),
            "inline" => Ok(Self::Inline),
            other => Err(format!(
                "Unknown artifact shape '{other}'. Must be 'reference' or 'inline'"
            )),
        }
    }
}

/// The slots the compiler writes to and the node the poller reads from.
///
/// Defaults match the deployed background-replacement workflow. Every
/// field is overridable through server configuration, since workflow
/// revisions renumber nodes.
#[derive(Debug, Clone)]
pub struct SlotBindings {
    /// Style prompt text slot.
    pub style_text: Slot,
    /// Main subject prompt text slot.
    pub main_text: Slot,
    /// Classification token slot on the segmentation node.
    pub classification_token: Slot,
    /// URL slot used when the input image is fetched by the backend.
    pub image_url: Slot,
    /// Image-name slot used when the input image was uploaded first.
    pub image_name: Slot,
    /// Sampler seed slot.
    pub seed: Slot,
    /// Optional output-filename prefix slot.
    pub filename_prefix: Option<Slot>,
    /// Node whose history payload carries the final artifact.
    pub output_node: String,
    /// Payload shape of the output node.
    pub artifact_shape: ArtifactShape,
}

impl Default for SlotBindings {
    fn default() -> Self {
        Self {
            style_text: Slot::new("555", "text"),
            main_text: Slot::new("563", "text"),
            classification_token: Slot::new("204", "prompt"),
            image_url: Slot::new("621", "url"),
            image_name: Slot::new("156", "image"),
            seed: Slot::new("607", "seed"),
            filename_prefix: None,
            output_node: "619".to_string(),
            artifact_shape: ArtifactShape::Reference,
        }
    }
}

impl SlotBindings {
    /// All slots the compiler may write to.
    fn writable_slots(&self) -> Vec<&Slot> {
        let mut slots = vec![
            &self.style_text,
            &self.main_text,
            &self.classification_token,
            &self.image_url,
            &self.image_name,
            &self.seed,
        ];
        if let Some(prefix) = &self.filename_prefix {
            slots.push(prefix);
        }
        slots
    }
}

/// Errors from template loading, validation, and compilation.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// A bound node id does not exist in the template.
    #[error("Workflow template is missing node {node_id}")]
    MissingNode { node_id: String },

    /// A bound node exists but has no `inputs` object to write into.
    #[error("Workflow template node {node_id} has no inputs object")]
    MalformedNode { node_id: String },

    /// The template root is not a JSON object.
    #[error("Workflow template root must be a JSON object")]
    NotAnObject,

    /// The template file could not be read.
    #[error("Failed to read workflow template: {0}")]
    Io(#[from] std::io::Error),

    /// The template file is not valid JSON.
    #[error("Failed to parse workflow template: {0}")]
    Parse(#[from] serde_json::Error),
}

/// An immutable workflow template document.
///
/// Loaded once at startup and shared read-only across requests.
/// [`compile`] always works on its own clone, so concurrent requests
/// never observe each other's bound values.
#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
    nodes: HashMap<String, Value>,
}

impl WorkflowTemplate {
    /// Wrap an already-parsed workflow document.
    pub fn from_value(doc: Value) -> Result<Self, TemplateError> {
        match doc {
            Value::Object(map) => Ok(Self {
                nodes: map.into_iter().collect(),
            }),
            _ => Err(TemplateError::NotAnObject),
        }
    }

    /// Load and parse a workflow template from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let raw = std::fs::read_to_string(path)?;
        let doc: Value = serde_json::from_str(&raw)?;
        Self::from_value(doc)
    }

    /// Check that every bound slot and the output node exist.
    ///
    /// Run once at startup so a template/bindings mismatch stops the
    /// process before it can serve a single request.
    pub fn validate(&self, bindings: &SlotBindings) -> Result<(), TemplateError> {
        for slot in bindings.writable_slots() {
            let node = self
                .nodes
                .get(&slot.node_id)
                .ok_or_else(|| TemplateError::MissingNode {
                    node_id: slot.node_id.clone(),
                })?;
            if !node.get("inputs").is_some_and(Value::is_object) {
                return Err(TemplateError::MalformedNode {
                    node_id: slot.node_id.clone(),
                });
            }
        }
        if !self.nodes.contains_key(&bindings.output_node) {
            return Err(TemplateError::MissingNode {
                node_id: bindings.output_node.clone(),
            });
        }
        Ok(())
    }

    /// Reassemble the document as a JSON value for submission.
    fn to_value(&self) -> Value {
        Value::Object(self.nodes.clone().into_iter().collect())
    }
}

/// A workflow with all parameters and a fresh seed bound into it.
///
/// The submitter treats this as read-only.
#[derive(Debug, Clone)]
pub struct BoundWorkflow {
    doc: Value,
    seed: u32,
}

impl BoundWorkflow {
    /// The fully bound workflow document.
    pub fn document(&self) -> &Value {
        &self.doc
    }

    /// The seed that was bound into the sampler slot.
    pub fn seed(&self) -> u32 {
        self.seed
    }
}

/// Bind job parameters and a fresh random seed into a template copy.
///
/// The seed is drawn from the full u32 range on every call via the
/// thread-local RNG, so concurrent requests never share seed state and
/// identical parameter sets still miss the backend's workflow cache.
///
/// Fails with [`TemplateError::MissingNode`] if a bound node id is
/// absent -- that is a deployment defect, not a runtime condition, and
/// is never retried.
pub fn compile(
    template: &WorkflowTemplate,
    bindings: &SlotBindings,
    params: &JobParameters,
) -> Result<BoundWorkflow, TemplateError> {
    let mut doc = template.to_value();

    write_slot(
        &mut doc,
        &bindings.style_text,
        Value::from(params.style_text.as_str()),
    )?;
    write_slot(
        &mut doc,
        &bindings.main_text,
        Value::from(params.main_text.as_str()),
    )?;
    write_slot(
        &mut doc,
        &bindings.classification_token,
        Value::from(params.classification_token.as_str()),
    )?;

    match &params.image {
        ImageInput::Url(url) => {
            write_slot(&mut doc, &bindings.image_url, Value::from(url.as_str()))?;
        }
        ImageInput::Uploaded(name) => {
            write_slot(&mut doc, &bindings.image_name, Value::from(name.as_str()))?;
        }
    }

    let seed: u32 = rand::rng().random();
    write_slot(&mut doc, &bindings.seed, Value::from(seed))?;

    if let Some(prefix_slot) = &bindings.filename_prefix {
        write_slot(
            &mut doc,
            prefix_slot,
            Value::from(format!("backdrop_{seed:08x}")),
        )?;
    }

    Ok(BoundWorkflow { doc, seed })
}

/// Write one value into `doc[node_id]["inputs"][input]`.
fn write_slot(doc: &mut Value, slot: &Slot, value: Value) -> Result<(), TemplateError> {
    let node = doc
        .get_mut(&slot.node_id)
        .ok_or_else(|| TemplateError::MissingNode {
            node_id: slot.node_id.clone(),
        })?;
    let inputs = node
        .get_mut("inputs")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| TemplateError::MalformedNode {
            node_id: slot.node_id.clone(),
        })?;
    inputs.insert(slot.input.clone(), value);
    Ok(())
}
