//! Authenticated REST client for the remote LIMS.
//!
//! `SlimsApi` wraps reqwest with the remote system's conventions: every
//! request goes to `{base}/rest/`, carries Basic auth, and optionally an
//! attribution header naming the end user an action is performed for.
//! Entity-fetch calls parse the response's `entities` array into [`Record`]
//! or [`Attachment`] objects; raw calls hand the response back untouched.

pub mod criteria;

use crate::config::{ConfigError, SlimsConfig};
use crate::entities::SlimsEntity;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::path::PathBuf;
use url::Url;

/// Header attributing an action to an end user distinct from the service
/// account.
pub const REQUESTED_FOR_HEADER: &str = "X-SLIMS-REQUESTED-FOR";

/// Errors raised by client and entity operations.
#[derive(Debug, thiserror::Error)]
pub enum SlimsError {
    /// The remote system answered an entity call with a non-200 status.
    #[error("API call failed (HTTP {status}): {body}")]
    Api { status: StatusCode, body: String },
    /// Transport-level failure from the HTTP layer.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid resource URL: {0}")]
    Url(#[from] url::ParseError),
    /// A response did not have the shape the remote contract documents.
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("column {0:?} not found")]
    ColumnNotFound(String),
    #[error("link {0:?} not found in the list of links")]
    LinkNotFound(String),
    #[error("no step registered at {0:?}")]
    StepNotFound(String),
    #[error("no repo_location configured")]
    NoRepoLocation,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = SlimsError> = std::result::Result<T, E>;

/// Authenticated HTTP wrapper for the remote REST API.
///
/// Cheap to clone; every [`Record`](crate::Record) holds one so it can issue
/// follow-up calls.
#[derive(Debug, Clone)]
pub struct SlimsApi {
    base: Url,
    username: String,
    password: String,
    repo_location: Option<PathBuf>,
    requested_for: Option<String>,
    http: reqwest::Client,
}

impl SlimsApi {
    /// Build a client from an instance config.
    pub fn new(config: &SlimsConfig) -> Result<Self, ConfigError> {
        let (username, password) = config.basic_auth()?;
        let base = Url::parse(&format!("{}/rest/", config.url.trim_end_matches('/')))
            .map_err(|source| ConfigError::InvalidUrl {
                url: config.url.clone(),
                source,
            })?;
        Ok(Self {
            base,
            username,
            password,
            repo_location: config.repo_location.clone(),
            requested_for: None,
            http: reqwest::Client::new(),
        })
    }

    /// Return a client that attributes its requests to `user` via the
    /// requested-for header.
    pub fn as_user(&self, user: impl Into<String>) -> Self {
        Self {
            requested_for: Some(user.into()),
            ..self.clone()
        }
    }

    /// Local mount point of the attachment repository, if configured.
    pub fn repo_location(&self) -> Option<&PathBuf> {
        self.repo_location.as_ref()
    }

    /// Resolve a relative resource path against the rest base. Absolute
    /// URLs (entity link hrefs) pass through untouched.
    fn resolve(&self, path: &str) -> Result<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            Ok(Url::parse(path)?)
        } else {
            Ok(self.base.join(path.trim_start_matches('/'))?)
        }
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let mut builder = self
            .http
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password));
        if let Some(user) = &self.requested_for {
            builder = builder.header(REQUESTED_FOR_HEADER, user);
        }
        builder
    }

    /// GET an entity resource and parse the `entities` array of the
    /// response. Non-200 responses raise [`SlimsError::Api`] with the
    /// response body as detail.
    pub async fn get_entities(&self, path: &str, body: Option<&Value>) -> Result<Vec<SlimsEntity>> {
        let mut builder = self.request(Method::GET, self.resolve(path)?);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = builder.send().await?;
        self.entities_from_response(response).await
    }

    /// Parse an entity response: 200 with an `entities` array, anything
    /// else is an API error carrying the body.
    pub(crate) async fn entities_from_response(
        &self,
        response: Response,
    ) -> Result<Vec<SlimsEntity>> {
        let status = response.status();
        if status != StatusCode::OK {
            return Err(SlimsError::Api {
                status,
                body: response.text().await.unwrap_or_default(),
            });
        }
        let payload: Value = response.json().await?;
        self.entities_from_json(&payload)
    }

    /// Parse entities out of an already-decoded response payload.
    pub(crate) fn entities_from_json(&self, payload: &Value) -> Result<Vec<SlimsEntity>> {
        let entities = payload
            .get("entities")
            .and_then(Value::as_array)
            .ok_or_else(|| SlimsError::Malformed("missing entities array".to_string()))?;
        entities
            .iter()
            .map(|entity| SlimsEntity::from_json(entity, self.clone()))
            .collect()
    }

    /// Raw GET; the caller inspects the status.
    pub async fn get(&self, path: &str) -> Result<Response> {
        Ok(self.request(Method::GET, self.resolve(path)?).send().await?)
    }

    /// Raw POST with a JSON body; the caller inspects the status.
    pub async fn post(&self, path: &str, body: &Value) -> Result<Response> {
        Ok(self
            .request(Method::POST, self.resolve(path)?)
            .json(body)
            .send()
            .await?)
    }

    /// Raw PUT with a JSON body; the caller inspects the status.
    pub async fn put(&self, path: &str, body: &Value) -> Result<Response> {
        Ok(self
            .request(Method::PUT, self.resolve(path)?)
            .json(body)
            .send()
            .await?)
    }

    /// Raw DELETE; the caller inspects the status.
    pub async fn delete(&self, path: &str) -> Result<Response> {
        Ok(self
            .request(Method::DELETE, self.resolve(path)?)
            .send()
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_api() -> SlimsApi {
        let config = SlimsConfig::new("test", "http://lims.example.com")
            .with_credentials("admin", "admin");
        SlimsApi::new(&config).unwrap()
    }

    #[test]
    fn resolves_relative_paths_against_rest_base() {
        let api = test_api();
        let url = api.resolve("Content/advanced").unwrap();
        assert_eq!(url.as_str(), "http://lims.example.com/rest/Content/advanced");
    }

    #[test]
    fn passes_absolute_urls_through() {
        let api = test_api();
        let href = "http://lims.example.com/rest/Content/12";
        assert_eq!(api.resolve(href).unwrap().as_str(), href);
    }

    #[test]
    fn trailing_slash_on_base_url_is_tolerated() {
        let config = SlimsConfig::new("test", "http://lims.example.com/")
            .with_credentials("admin", "admin");
        let api = SlimsApi::new(&config).unwrap();
        assert_eq!(
            api.resolve("external/").unwrap().as_str(),
            "http://lims.example.com/rest/external/"
        );
    }

    #[test]
    fn attachment_table_selects_attachment_variant() {
        let api = test_api();
        let payload = json!({
            "entities": [
                {"tableName": "Attachment", "pk": 7, "columns": []},
                {"tableName": "Content", "pk": 12, "columns": []}
            ]
        });
        let entities = api.entities_from_json(&payload).unwrap();
        assert!(entities[0].is_attachment());
        assert!(!entities[1].is_attachment());
    }

    #[test]
    fn missing_entities_array_is_malformed() {
        let api = test_api();
        let err = api.entities_from_json(&json!({"status": "ok"})).unwrap_err();
        assert!(matches!(err, SlimsError::Malformed(_)));
    }

    #[test]
    fn as_user_sets_attribution() {
        let api = test_api().as_user("jdoe");
        assert_eq!(api.requested_for.as_deref(), Some("jdoe"));
        assert_eq!(test_api().requested_for, None);
    }
}
