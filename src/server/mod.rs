//! Webhook gateway server.
//!
//! Exposes the endpoint the remote system calls to execute flow steps:
//! `POST /{instance}/{operation}/{step}`. Multiple independently
//! configured instances coexist in one process, routed by the first path
//! segment. Step failures still answer 200 — the remote system observes
//! failures through the FAILED status report, not the HTTP status.

use crate::instance::Slims;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Registry of configured instances, keyed by name. Populated once at
/// startup and read-only while the server runs.
#[derive(Default)]
pub struct GatewayState {
    instances: HashMap<String, Arc<Slims>>,
}

impl GatewayState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance under its configured name.
    pub fn register(&mut self, slims: Arc<Slims>) {
        self.instances.insert(slims.name().to_string(), slims);
    }

    pub fn instance(&self, name: &str) -> Option<&Arc<Slims>> {
        self.instances.get(name)
    }
}

/// Build the webhook router.
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/{name}/{operation}/{step}", post(start_step))
        .with_state(state)
}

/// Execute one flow step on behalf of the remote system.
async fn start_step(
    State(state): State<Arc<GatewayState>>,
    Path((name, operation, step)): Path<(String, String, usize)>,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let Some(slims) = state.instance(&name) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"errorMessage": format!("unknown instance {name:?}")})),
        );
    };

    let flow_id = payload.pointer("/flowInformation/flowId").cloned();
    info!(instance = %name, flow = ?flow_id, %operation, step, "executing flow step");

    let Some(matched) = slims.step(&operation, step) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"errorMessage": format!("no step registered at {operation}/{step}")})),
        );
    };

    let flow_run = slims.flow_run(step, payload);
    match matched.execute(&flow_run).await {
        Ok(Some(output)) => (StatusCode::OK, Json(Value::Object(output))),
        Ok(None) => (StatusCode::OK, Json(json!({}))),
        Err(err) => {
            // Failure already reported through the run status; the
            // webhook answer stays 200 per the remote invocation contract.
            error!(instance = %name, %operation, step, error = %err, "step execution failed");
            (StatusCode::OK, Json(json!({})))
        }
    }
}

/// Bind and run the gateway until the process exits. `host` may be a
/// hostname; resolution failures surface as the bind error.
pub async fn serve(state: GatewayState, host: &str, port: u16) -> Result<(), GatewayError> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!(address = %listener.local_addr()?, "starting flow webhook gateway");
    axum::serve(listener, router(Arc::new(state))).await?;
    Ok(())
}
