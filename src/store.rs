use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::config::AirtableConfig;

pub type Fields = Map<String, Value>;

/// A store row. Serialized flat, `{"id": ..., ...fields}`; a field named
/// `id` replaces the record id in that output.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub fields: Fields,
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let shadowed = self.fields.contains_key("id");
        let len = self.fields.len() + usize::from(!shadowed);
        let mut map = serializer.serialize_map(Some(len))?;
        if !shadowed {
            map.serialize_entry("id", &self.id)?;
        }
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Request(#[from] reqwest::Error),
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("invalid store URL: {0}")]
    InvalidUrl(String),
    #[error("store returned no record")]
    EmptyResponse,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list(&self, table: &str) -> Result<Vec<Record>, StoreError>;
    async fn create(&self, table: &str, fields: Fields) -> Result<Record, StoreError>;
    async fn update(&self, table: &str, id: &str, fields: Fields) -> Result<Record, StoreError>;
    async fn delete(&self, table: &str, id: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Deserialize)]
struct WireRecord {
    id: String,
    #[serde(default)]
    fields: Fields,
}

impl From<WireRecord> for Record {
    fn from(wire: WireRecord) -> Self {
        Record {
            id: wire.id,
            fields: wire.fields,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecordPage {
    records: Vec<WireRecord>,
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecordBatch {
    records: Vec<WireRecord>,
}

/// Client for the Airtable REST API (v0).
pub struct AirtableClient {
    client: Client,
    api_url: Url,
    api_key: String,
    base_id: String,
}

impl AirtableClient {
    pub fn new(config: &AirtableConfig) -> Result<Self, StoreError> {
        let api_url = Url::parse(&config.api_url)
            .map_err(|e| StoreError::InvalidUrl(format!("{}: {}", config.api_url, e)))?;
        if api_url.cannot_be_a_base() {
            return Err(StoreError::InvalidUrl(config.api_url.clone()));
        }

        Ok(Self {
            client: Client::new(),
            api_url,
            api_key: config.api_key.clone(),
            base_id: config.base_id.clone(),
        })
    }

    /// `{api_url}/{base_id}/{table}[/{id}]` with each segment percent-encoded.
    pub fn table_url(&self, table: &str, id: Option<&str>) -> Result<Url, StoreError> {
        let mut url = self.api_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StoreError::InvalidUrl(self.api_url.to_string()))?;
            segments.pop_if_empty().push(&self.base_id).push(table);
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    async fn check(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        Err(StoreError::Api {
            status: status.as_u16(),
            message: api_error_message(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
        })
    }
}

/// Airtable reports errors as `{"error": {"type", "message"}}` or
/// `{"error": "NOT_FOUND"}`.
pub fn api_error_message(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::String(kind) => Some(kind.clone()),
        Value::Object(error) => error
            .get("message")
            .or_else(|| error.get("type"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

#[async_trait]
impl RecordStore for AirtableClient {
    async fn list(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        let url = self.table_url(table, None)?;
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut request = self.client.get(url.clone()).bearer_auth(&self.api_key);
            if let Some(offset) = &offset {
                request = request.query(&[("offset", offset)]);
            }

            let page: RecordPage = Self::check(request.send().await?).await?.json().await?;
            records.extend(page.records.into_iter().map(Record::from));

            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        debug!("Fetched {} records from table '{}'", records.len(), table);
        Ok(records)
    }

    async fn create(&self, table: &str, fields: Fields) -> Result<Record, StoreError> {
        let url = self.table_url(table, None)?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "records": [{ "fields": fields }] }))
            .send()
            .await?;

        let batch: RecordBatch = Self::check(response).await?.json().await?;
        batch
            .records
            .into_iter()
            .next()
            .map(Record::from)
            .ok_or(StoreError::EmptyResponse)
    }

    async fn update(&self, table: &str, id: &str, fields: Fields) -> Result<Record, StoreError> {
        let url = self.table_url(table, Some(id))?;
        let response = self
            .client
            .patch(url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "fields": fields }))
            .send()
            .await?;

        let record: WireRecord = Self::check(response).await?.json().await?;
        Ok(record.into())
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), StoreError> {
        let url = self.table_url(table, Some(id))?;
        let response = self
            .client
            .delete(url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}
