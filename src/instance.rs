//! One configured remote LIMS instance.

use crate::client::{criteria::Criteria, Result, SlimsApi};
use crate::config::{ConfigError, SlimsConfig};
use crate::entities::{Record, SlimsEntity};
use crate::flow::{FlowRegistry, FlowRun, Step};
use crate::SlimsError;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Body of an advanced-search call.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FetchBody<'a> {
    sort_by: &'a [&'a str],
    start_row: Option<i64>,
    end_row: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    criteria: Option<&'a Criteria>,
}

/// A configured remote instance: entity operations plus the flow registry
/// announced under this instance's name.
pub struct Slims {
    name: String,
    api: SlimsApi,
    registry: Arc<FlowRegistry>,
}

impl Slims {
    pub fn new(config: SlimsConfig) -> Result<Self, ConfigError> {
        let api = SlimsApi::new(&config)?;
        let registry = Arc::new(FlowRegistry::new(
            api.clone(),
            config.name.clone(),
            config.callback_url(),
        ));
        Ok(Self {
            name: config.name,
            api,
            registry,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying REST client, for calls this library doesn't wrap.
    pub fn api(&self) -> &SlimsApi {
        &self.api
    }

    /// Search a table with an optional criteria tree, sort field list and
    /// row range.
    pub async fn fetch(
        &self,
        table: &str,
        criteria: Option<&Criteria>,
        sort: &[&str],
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<SlimsEntity>> {
        let body = serde_json::to_value(FetchBody {
            sort_by: sort,
            start_row: start,
            end_row: end,
            criteria,
        })
        .map_err(|e| SlimsError::Malformed(format!("unserializable fetch body: {e}")))?;
        self.api
            .get_entities(&format!("{table}/advanced"), Some(&body))
            .await
    }

    /// Fetch a single entity by primary key; `None` when the remote
    /// system reports no match.
    pub async fn fetch_by_pk(&self, table: &str, pk: i64) -> Result<Option<SlimsEntity>> {
        let mut entities = self.api.get_entities(&format!("{table}/{pk}"), None).await?;
        if entities.is_empty() {
            Ok(None)
        } else {
            Ok(Some(entities.remove(0)))
        }
    }

    /// Create a record; returns the snapshot the server answers with.
    pub async fn add(&self, table: &str, values: &Value) -> Result<Record> {
        let response = self.api.put(table, values).await?;
        let mut entities = self.api.entities_from_response(response).await?;
        if entities.is_empty() {
            return Err(SlimsError::Malformed(
                "add response contained no entities".to_string(),
            ));
        }
        Ok(entities.remove(0).into_record())
    }

    /// Define a flow and announce it to the remote system; see
    /// [`FlowRegistry::add_flow`].
    pub async fn add_flow(&self, flow_id: &str, name: &str, usage: &str, steps: Vec<Step>) {
        self.registry.add_flow(flow_id, name, usage, steps).await;
    }

    /// The step registered at `{operation}/{index}`, if any.
    pub fn step(&self, operation: &str, index: usize) -> Option<Arc<Step>> {
        self.registry.step(operation, index)
    }

    /// Build a fresh run context from a webhook invocation payload.
    pub fn flow_run(&self, index: usize, payload: Value) -> FlowRun {
        FlowRun::from_payload(self.api.clone(), index, payload)
    }

    /// Stop the periodic re-registration task.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::criteria::equals;
    use serde_json::json;

    #[test]
    fn fetch_body_keeps_null_range_and_drops_absent_criteria() {
        let body = serde_json::to_value(FetchBody {
            sort_by: &["cntn_id"],
            start_row: None,
            end_row: Some(50),
            criteria: None,
        })
        .unwrap();
        assert_eq!(
            body,
            json!({"sortBy": ["cntn_id"], "startRow": null, "endRow": 50})
        );
    }

    #[test]
    fn fetch_body_nests_criteria() {
        let criteria = equals("cntn_id", "sample-1");
        let body = serde_json::to_value(FetchBody {
            sort_by: &[],
            start_row: None,
            end_row: None,
            criteria: Some(&criteria),
        })
        .unwrap();
        assert_eq!(
            body["criteria"],
            json!({"fieldName": "cntn_id", "operator": "equals", "value": "sample-1"})
        );
    }
}
