//! Flow storage and remote (re-)registration.
//!
//! The registry owns an instance's flow definitions and the mapping from
//! step route (`{flowId}/{index}`) to [`Step`]. Registration with the
//! remote system is best-effort: failures are logged and retried by a
//! periodic background task, which re-announces every known definition so
//! a restarted remote system picks the flows back up.

use crate::client::SlimsApi;
use crate::flow::Step;
use parking_lot::{Mutex, RwLock};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Interval between re-registration attempts.
const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

struct RefreshTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Per-instance store of flow definitions and executable steps.
pub struct FlowRegistry {
    api: SlimsApi,
    instance_name: String,
    callback_url: String,
    operations: RwLock<HashMap<String, Arc<Step>>>,
    definitions: RwLock<Vec<Value>>,
    refresh: Mutex<Option<RefreshTask>>,
}

impl FlowRegistry {
    pub fn new(api: SlimsApi, instance_name: String, callback_url: String) -> Self {
        Self {
            api,
            instance_name,
            callback_url,
            operations: RwLock::new(HashMap::new()),
            definitions: RwLock::new(Vec::new()),
            refresh: Mutex::new(None),
        }
    }

    /// Define a flow and announce it to the remote system.
    ///
    /// Each step is addressable afterwards at `{flow_id}/{index}` in
    /// declaration order. Registration failures are logged, not raised;
    /// the flow stays locally defined and the periodic task retries. The
    /// first call lazily starts that task.
    pub async fn add_flow(
        self: &Arc<Self>,
        flow_id: &str,
        name: &str,
        usage: &str,
        steps: Vec<Step>,
    ) {
        let mut step_definitions = Vec::with_capacity(steps.len());
        {
            let mut operations = self.operations.write();
            for (index, step) in steps.into_iter().enumerate() {
                let route = format!("{flow_id}/{index}");
                step_definitions.push(step.definition(&route));
                operations.insert(route, Arc::new(step));
            }
        }

        // pythonApiFlow is part of the remote registration contract.
        let flow = json!({
            "id": flow_id,
            "name": name,
            "usage": usage,
            "steps": step_definitions,
            "pythonApiFlow": true,
        });
        self.definitions.write().push(flow.clone());

        self.register_flows(std::slice::from_ref(&flow), false).await;
        self.ensure_refresh_task();
    }

    /// Look up the step registered at `{operation}/{index}`.
    pub fn step(&self, operation: &str, index: usize) -> Option<Arc<Step>> {
        self.operations.read().get(&format!("{operation}/{index}")).cloned()
    }

    /// Routes of all registered steps, in no particular order.
    pub fn step_routes(&self) -> Vec<String> {
        self.operations.read().keys().cloned().collect()
    }

    /// All locally known flow definitions.
    pub fn definitions(&self) -> Vec<Value> {
        self.definitions.read().clone()
    }

    /// POST flow definitions and this process's callback address to the
    /// remote registration resource. Never fatal; every failure mode is
    /// logged and left to the periodic retry.
    async fn register_flows(&self, flows: &[Value], reregister: bool) {
        let flow_ids: Vec<&str> = flows
            .iter()
            .filter_map(|flow| flow.get("id").and_then(Value::as_str))
            .collect();
        let verb = if reregister { "re-register" } else { "register" };

        let body = json!({
            "instance": {"url": self.callback_url, "name": self.instance_name},
            "flows": flows,
        });

        match self.api.post("external/", &body).await {
            Ok(response) if response.status() == StatusCode::OK => {
                info!(flows = ?flow_ids, "successfully {verb}ed flows");
            }
            Ok(response) => {
                let status = response.status();
                let reason = response
                    .json::<Value>()
                    .await
                    .ok()
                    .and_then(|body| {
                        body.get("errorMessage")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                    });
                match reason {
                    Some(reason) => warn!(
                        flows = ?flow_ids,
                        %status,
                        %reason,
                        "could not {verb} flows"
                    ),
                    None => warn!(flows = ?flow_ids, %status, "could not {verb} flows"),
                }
            }
            Err(error) => {
                warn!(
                    flows = ?flow_ids,
                    %error,
                    "could not {verb} flows, trying again in 60 seconds"
                );
            }
        }
    }

    /// Start the periodic re-registration task if it isn't running yet.
    fn ensure_refresh_task(self: &Arc<Self>) {
        let mut refresh = self.refresh.lock();
        if refresh.is_some() {
            return;
        }
        let token = CancellationToken::new();
        let task_token = token.clone();
        let registry = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
            // The first tick fires immediately; registration already ran.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        let flows = registry.definitions();
                        registry.register_flows(&flows, true).await;
                    }
                }
            }
        });
        *refresh = Some(RefreshTask { token, handle });
    }

    /// Whether the re-registration task is currently running.
    pub fn refresh_running(&self) -> bool {
        self.refresh.lock().is_some()
    }

    /// Cancel the re-registration task and wait for it to finish.
    pub async fn shutdown(&self) {
        let task = self.refresh.lock().take();
        if let Some(task) = task {
            task.token.cancel();
            let _ = task.handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SlimsConfig;
    use crate::flow::{file_output, text_input};

    /// Registry whose registration calls hit a closed port and fail fast;
    /// registration failures are non-fatal by design.
    fn offline_registry() -> Arc<FlowRegistry> {
        let config = SlimsConfig::new("test", "http://127.0.0.1:1")
            .with_credentials("admin", "admin");
        let api = SlimsApi::new(&config).unwrap();
        Arc::new(FlowRegistry::new(
            api,
            "test".to_string(),
            "http://localhost:5000".to_string(),
        ))
    }

    fn noop_step(name: &str) -> Step {
        Step::new(name, |_run| async { Ok(None) })
            .with_input(vec![text_input("text", "Text")])
            .with_output(vec![file_output()])
    }

    #[tokio::test]
    async fn steps_are_routed_by_flow_id_and_index() {
        let registry = offline_registry();
        registry
            .add_flow(
                "myflow",
                "My Flow",
                "Content",
                vec![noop_step("first step"), noop_step("second step")],
            )
            .await;

        assert_eq!(registry.step("myflow", 0).unwrap().name(), "first step");
        assert_eq!(registry.step("myflow", 1).unwrap().name(), "second step");
        assert!(registry.step("myflow", 2).is_none());
        assert!(registry.step("otherflow", 0).is_none());

        let mut routes = registry.step_routes();
        routes.sort();
        assert_eq!(routes, vec!["myflow/0", "myflow/1"]);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn definitions_carry_steps_in_declaration_order() {
        let registry = offline_registry();
        registry
            .add_flow(
                "myflow",
                "My Flow",
                "Content",
                vec![noop_step("first step"), noop_step("second step")],
            )
            .await;

        let definitions = registry.definitions();
        assert_eq!(definitions.len(), 1);
        let flow = &definitions[0];
        assert_eq!(flow["id"], "myflow");
        assert_eq!(flow["usage"], "Content");
        assert_eq!(flow["pythonApiFlow"], true);
        let steps = flow["steps"].as_array().unwrap();
        assert_eq!(steps[0]["route"], "myflow/0");
        assert_eq!(steps[0]["name"], "first step");
        assert_eq!(steps[1]["route"], "myflow/1");

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_the_refresh_task() {
        let registry = offline_registry();
        registry
            .add_flow("myflow", "My Flow", "Content", vec![noop_step("only step")])
            .await;

        assert!(registry.refresh_running());
        registry.shutdown().await;
        assert!(!registry.refresh_running());

        // A second shutdown is a no-op.
        registry.shutdown().await;
    }
}
