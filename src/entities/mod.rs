//! Client-side entity model.
//!
//! A [`Record`] is an immutable snapshot of one remote row: table name,
//! primary key, columns and navigable links. Mutations never change a
//! record in place; they issue a call and hand back a fresh snapshot.
//! [`Attachment`] specializes records from the `Attachment` table with
//! binary download and repository-path resolution.

use crate::client::{Result, SlimsApi, SlimsError};
use base64::Engine;
use futures_util::StreamExt;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// One column of a remote record: name, value and whatever other metadata
/// the remote system attaches (datatype, title, editability, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub datatype: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct Link {
    rel: String,
    href: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntityJson {
    table_name: String,
    pk: i64,
    #[serde(default)]
    columns: Vec<Column>,
    #[serde(default)]
    links: Vec<Link>,
}

/// A fetched entity: either a plain record or an attachment, selected by
/// the entity's table name.
#[derive(Debug, Clone)]
pub enum SlimsEntity {
    Record(Record),
    Attachment(Attachment),
}

impl SlimsEntity {
    pub(crate) fn from_json(entity: &Value, api: SlimsApi) -> Result<Self> {
        let entity: EntityJson = serde_json::from_value(entity.clone())
            .map_err(|e| SlimsError::Malformed(format!("bad entity object: {e}")))?;
        let record = Record { entity, api };
        if record.table_name() == "Attachment" {
            Ok(SlimsEntity::Attachment(Attachment { record }))
        } else {
            Ok(SlimsEntity::Record(record))
        }
    }

    /// The underlying record, whichever variant this is.
    pub fn record(&self) -> &Record {
        match self {
            SlimsEntity::Record(record) => record,
            SlimsEntity::Attachment(attachment) => &attachment.record,
        }
    }

    pub fn into_record(self) -> Record {
        match self {
            SlimsEntity::Record(record) => record,
            SlimsEntity::Attachment(attachment) => attachment.record,
        }
    }

    pub fn as_attachment(&self) -> Option<&Attachment> {
        match self {
            SlimsEntity::Attachment(attachment) => Some(attachment),
            SlimsEntity::Record(_) => None,
        }
    }

    pub fn is_attachment(&self) -> bool {
        matches!(self, SlimsEntity::Attachment(_))
    }
}

/// An immutable snapshot of one remote entity.
#[derive(Debug, Clone)]
pub struct Record {
    entity: EntityJson,
    api: SlimsApi,
}

impl Record {
    pub fn table_name(&self) -> &str {
        &self.entity.table_name
    }

    pub fn pk(&self) -> i64 {
        self.entity.pk
    }

    /// All columns, in the order the server sent them.
    pub fn columns(&self) -> &[Column] {
        &self.entity.columns
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Result<&Column> {
        self.entity
            .columns
            .iter()
            .find(|column| column.name == name)
            .ok_or_else(|| SlimsError::ColumnNotFound(name.to_string()))
    }

    /// Update this record on the server, returning the fresh snapshot the
    /// server answers with.
    pub async fn update(&self, values: &Value) -> Result<Record> {
        let path = format!("{}/{}", self.table_name(), self.pk());
        let response = self.api.post(&path, values).await?;
        let mut entities = self.api.entities_from_response(response).await?;
        if entities.is_empty() {
            return Err(SlimsError::Malformed(
                "update response contained no entities".to_string(),
            ));
        }
        Ok(entities.remove(0).into_record())
    }

    /// Delete this record on the server.
    pub async fn remove(&self) -> Result<()> {
        let path = format!("{}/{}", self.table_name(), self.pk());
        let response = self.api.delete(&path).await?;
        if response.status() != StatusCode::OK {
            return Err(SlimsError::Api {
                status: response.status(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    /// Fetch the attachments linked to this record.
    pub async fn attachments(&self) -> Result<Vec<SlimsEntity>> {
        let path = format!("attachment/{}/{}", self.table_name(), self.pk());
        self.api.get_entities(&path, None).await
    }

    /// Upload an attachment for this record and return its primary key,
    /// parsed from the `Location` header of the response.
    pub async fn add_attachment(&self, name: &str, contents: &[u8]) -> Result<i64> {
        let body = json!({
            "attm_name": name,
            "atln_recordPk": self.pk(),
            "atln_recordTable": self.table_name(),
            "contents": base64::engine::general_purpose::STANDARD.encode(contents),
        });
        let response = self.api.post("repo", &body).await?;
        if response.status() != StatusCode::OK {
            return Err(SlimsError::Api {
                status: response.status(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| SlimsError::Malformed("missing Location header".to_string()))?;
        pk_from_location(location)
    }

    /// Resolve a singular named link to its entity, or `None` when the
    /// target list is empty. Unknown link names are an error.
    pub async fn follow(&self, link_name: &str) -> Result<Option<SlimsEntity>> {
        let mut entities = self.linked_entities(link_name).await?;
        if entities.is_empty() {
            Ok(None)
        } else {
            Ok(Some(entities.remove(0)))
        }
    }

    /// Resolve a collection link (rel names prefixed with `-`) to all its
    /// entities.
    pub async fn follow_all(&self, link_name: &str) -> Result<Vec<SlimsEntity>> {
        self.linked_entities(link_name).await
    }

    async fn linked_entities(&self, link_name: &str) -> Result<Vec<SlimsEntity>> {
        let href = self
            .entity
            .links
            .iter()
            .find(|link| link.rel == link_name)
            .map(|link| link.href.clone())
            .ok_or_else(|| SlimsError::LinkNotFound(link_name.to_string()))?;
        self.api.get_entities(&href, None).await
    }
}

/// Parse a primary key from a `Location` header's trailing path segment,
/// e.g. `http://lims/rest/repo/1234` -> `1234`.
fn pk_from_location(location: &str) -> Result<i64> {
    location
        .rsplit('/')
        .next()
        .and_then(|segment| segment.parse::<i64>().ok())
        .ok_or_else(|| SlimsError::Malformed(format!("unparseable Location header {location:?}")))
}

/// A record from the `Attachment` table, pointing at a binary blob in the
/// remote repository.
#[derive(Debug, Clone)]
pub struct Attachment {
    record: Record,
}

impl Attachment {
    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn pk(&self) -> i64 {
        self.record.pk()
    }

    /// Resolve the attachment's path inside the locally mounted
    /// repository. Requires `repo_location` to be configured.
    pub fn local_path(&self) -> Result<PathBuf> {
        let root = self
            .record
            .api
            .repo_location()
            .ok_or(SlimsError::NoRepoLocation)?;
        let relative = self
            .record
            .column("attm_path")?
            .value
            .as_str()
            .ok_or_else(|| SlimsError::Malformed("attm_path is not a string".to_string()))?
            .to_string();
        Ok(root.join(relative))
    }

    /// Download the attachment body to a local file. The file handle is
    /// scoped to this call and closed on every exit path.
    pub async fn download_to(&self, destination: impl AsRef<Path>) -> Result<()> {
        let response = self.record.api.get(&format!("repo/{}", self.pk())).await?;
        if response.status() != StatusCode::OK {
            return Err(SlimsError::Api {
                status: response.status(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let mut file = tokio::fs::File::create(destination.as_ref()).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk.map_err(SlimsError::Transport)?).await?;
        }
        file.flush().await?;
        Ok(())
    }
}
