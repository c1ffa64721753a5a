//! Flow model: steps, field specs, run context and registration.
//!
//! A flow is an ordered sequence of [`Step`]s registered with the remote
//! system under a flow id. The remote system invokes steps back over the
//! webhook server; each invocation gets a fresh [`FlowRun`] context that
//! reports status and log messages to the remote system.

pub mod registry;
mod run;
mod step;

pub use registry::FlowRegistry;
pub use run::{ApiReporter, FlowRun, RunReporter};
pub use step::{ActionError, Step, StepError, StepOutput};

use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Boxed future used at the action and reporter seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Flow run status reported back to the remote system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Running,
    Done,
    Failed,
}

impl Status {
    /// Wire name used in status-report resource paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Running => "RUNNING",
            Status::Done => "DONE",
            Status::Failed => "FAILED",
        }
    }
}

/// Datatype of a step input/output field, serialized the way the remote
/// flow editor expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    String,
    Text,
    Boolean,
    Date,
    File,
}

/// Declared input or output field of a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Machine name the value is keyed under in the invocation payload.
    pub name: String,
    /// Display name shown in the remote flow editor.
    pub label: String,
    #[serde(rename = "type")]
    pub datatype: FieldType,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, label: impl Into<String>, datatype: FieldType) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            datatype,
        }
    }
}

/// A single-line text input field.
pub fn text_input(name: &str, label: &str) -> FieldSpec {
    FieldSpec::new(name, label, FieldType::String)
}

/// A multi-line text input field.
pub fn rich_text_input(name: &str, label: &str) -> FieldSpec {
    FieldSpec::new(name, label, FieldType::Text)
}

/// A checkbox input field.
pub fn checkbox_input(name: &str, label: &str) -> FieldSpec {
    FieldSpec::new(name, label, FieldType::Boolean)
}

/// A date input field.
pub fn date_input(name: &str, label: &str) -> FieldSpec {
    FieldSpec::new(name, label, FieldType::Date)
}

/// A file output produced by the step action.
pub fn file_output() -> FieldSpec {
    FieldSpec::new("file", "File", FieldType::File)
}
