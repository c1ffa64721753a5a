//! Per-invocation flow run context.

use crate::client::{Result, SlimsApi};
use crate::flow::{BoxFuture, Status};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

/// Channel carrying status updates and log messages back to the remote
/// system. Production runs use [`ApiReporter`]; tests substitute a
/// recording implementation.
pub trait RunReporter: Send + Sync {
    fn update_status(&self, status: Status) -> BoxFuture<'_, Result<()>>;
    fn log(&self, message: &str) -> BoxFuture<'_, Result<()>>;
}

/// Reporter posting to the remote system's `external/` resources.
pub struct ApiReporter {
    api: SlimsApi,
    run_guid: Option<String>,
    step_index: usize,
}

impl ApiReporter {
    pub fn new(api: SlimsApi, run_guid: Option<String>, step_index: usize) -> Self {
        Self {
            api,
            run_guid,
            step_index,
        }
    }
}

impl RunReporter for ApiReporter {
    fn update_status(&self, status: Status) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let Some(guid) = &self.run_guid else {
                warn!("flow run carries no run guid, skipping status update");
                return Ok(());
            };
            let path = format!("external/{}/{}/{}", guid, self.step_index, status.as_str());
            self.api.post(&path, &json!({})).await?;
            Ok(())
        })
    }

    fn log(&self, message: &str) -> BoxFuture<'_, Result<()>> {
        let message = message.to_string();
        Box::pin(async move {
            let Some(guid) = &self.run_guid else {
                warn!("flow run carries no run guid, skipping log message");
                return Ok(());
            };
            let body = json!({"flowRunGuid": guid, "message": message});
            self.api.post("external/log", &body).await?;
            Ok(())
        })
    }
}

/// Transient context for one step invocation. Created fresh for every
/// webhook call and discarded after the response is sent.
#[derive(Clone)]
pub struct FlowRun {
    step_index: usize,
    payload: Value,
    reporter: Arc<dyn RunReporter>,
}

impl FlowRun {
    pub fn new(reporter: Arc<dyn RunReporter>, step_index: usize, payload: Value) -> Self {
        Self {
            step_index,
            payload,
            reporter,
        }
    }

    /// Build a production run from the raw webhook payload.
    pub fn from_payload(api: SlimsApi, step_index: usize, payload: Value) -> Self {
        let run_guid = payload
            .pointer("/flowInformation/flowRunGuid")
            .or_else(|| payload.get("flowRunGuid"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let reporter = Arc::new(ApiReporter::new(api, run_guid, step_index));
        Self::new(reporter, step_index, payload)
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    /// The flow id from the invocation payload, for logging.
    pub fn flow_id(&self) -> Option<i64> {
        self.payload
            .pointer("/flowInformation/flowId")
            .and_then(Value::as_i64)
    }

    /// A named value from the invocation payload (declared step inputs
    /// arrive as top-level payload fields).
    pub fn value(&self, field: &str) -> Option<&Value> {
        self.payload.get(field)
    }

    /// The raw invocation payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Report a status transition to the remote system.
    pub async fn update_status(&self, status: Status) -> Result<()> {
        self.reporter.update_status(status).await
    }

    /// Send a log line to the remote system's flow run log.
    pub async fn log(&self, message: &str) -> Result<()> {
        self.reporter.log(message).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Reporter that records every call instead of talking to a server.
    #[derive(Default)]
    pub struct RecordingReporter {
        pub statuses: Mutex<Vec<Status>>,
        pub logs: Mutex<Vec<String>>,
    }

    impl RunReporter for RecordingReporter {
        fn update_status(&self, status: Status) -> BoxFuture<'_, Result<()>> {
            self.statuses.lock().push(status);
            Box::pin(async { Ok(()) })
        }

        fn log(&self, message: &str) -> BoxFuture<'_, Result<()>> {
            self.logs.lock().push(message.to_string());
            Box::pin(async { Ok(()) })
        }
    }
}
