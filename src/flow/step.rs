//! Flow steps: declared fields plus a user-supplied action.

use crate::client::SlimsError;
use crate::flow::{BoxFuture, FieldSpec, FlowRun, Status};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

/// Output map a step action may hand back; returned to the remote system
/// as the webhook response body.
pub type StepOutput = serde_json::Map<String, Value>;

/// Error type step actions may fail with.
pub type ActionError = Box<dyn std::error::Error + Send + Sync>;

type StepAction =
    Arc<dyn Fn(FlowRun) -> BoxFuture<'static, Result<Option<StepOutput>, ActionError>> + Send + Sync>;

/// Errors raised at the step-execution boundary.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// The user action failed; the original error travels as the cause.
    #[error("step {step:?} failed: {source}")]
    ExecutionFailed {
        step: String,
        #[source]
        source: ActionError,
    },
    /// The action succeeded but the status report did not reach the
    /// remote system.
    #[error("could not report step status: {0}")]
    Report(#[from] SlimsError),
}

/// A named unit of work within a flow: declared input/output field specs
/// and an action invoked with the per-run context.
#[derive(Clone)]
pub struct Step {
    name: String,
    input: Vec<FieldSpec>,
    output: Vec<FieldSpec>,
    action: StepAction,
}

impl Step {
    /// Create a step from an async action. The action receives the run
    /// context and may return an output map for the webhook response.
    pub fn new<F, Fut>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn(FlowRun) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<StepOutput>, ActionError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            input: Vec::new(),
            output: Vec::new(),
            action: Arc::new(move |run| {
                Box::pin(action(run))
                    as BoxFuture<'static, Result<Option<StepOutput>, ActionError>>
            }),
        }
    }

    /// Declare the step's input fields.
    pub fn with_input(mut self, input: Vec<FieldSpec>) -> Self {
        self.input = input;
        self
    }

    /// Declare the step's output fields.
    pub fn with_output(mut self, output: Vec<FieldSpec>) -> Self {
        self.output = output;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Serialize this step into the flow-definition dict sent during
    /// registration. `route` is the step's webhook path `{flowId}/{index}`.
    pub(crate) fn definition(&self, route: &str) -> Value {
        json!({
            "name": self.name,
            "input": self.input,
            "output": self.output,
            "route": route,
        })
    }

    /// Run the action and report the outcome through the run context:
    /// DONE when it completes, FAILED (followed by an error) when it
    /// doesn't. The action's output map passes through to the caller.
    pub async fn execute(&self, flow_run: &FlowRun) -> Result<Option<StepOutput>, StepError> {
        match (self.action)(flow_run.clone()).await {
            Ok(output) => {
                flow_run.update_status(Status::Done).await?;
                Ok(output)
            }
            Err(cause) => {
                if let Err(report) = flow_run.update_status(Status::Failed).await {
                    warn!(step = %self.name, error = %report, "could not report FAILED status");
                }
                Err(StepError::ExecutionFailed {
                    step: self.name.clone(),
                    source: cause,
                })
            }
        }
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("input", &self.input)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}
