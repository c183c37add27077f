//! Incoming content

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Namespace for content-addressed vector record ids
const CONTENT_NAMESPACE: Uuid = Uuid::from_u128(0x6a1f_3c2e_9b47_4d0a_8e55_71c3_d2f0_a914);

/// Raw text plus optional metadata. Never persisted as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    /// Raw text
    pub text: String,

    /// Explicit record id (overrides the content-addressed id)
    #[serde(default)]
    pub id: Option<Uuid>,

    /// Identifier of the upstream source document
    #[serde(default)]
    pub source_id: Option<String>,

    /// When the content was produced
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    /// Free-form metadata copied into the vector payload
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Content {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// True when there is nothing worth indexing
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Vector record id for this content.
    ///
    /// Stable across re-ingestion of the same text: the explicit id if given, otherwise a
    /// UUIDv5 over the source id and the text hash. Different texts never share an id.
    pub fn record_id(&self) -> Uuid {
        if let Some(id) = self.id {
            return id;
        }
        let hash = self.content_hash();
        let key = match &self.source_id {
            Some(source_id) => format!("source:{}:{}", source_id, hash),
            None => format!("text:{}", hash),
        };
        Uuid::new_v5(&CONTENT_NAMESPACE, key.as_bytes())
    }

    /// Hex SHA-256 of the text
    pub fn content_hash(&self) -> String {
        hex::encode(Sha256::digest(self.text.as_bytes()))
    }

    /// Payload stored next to the vector
    pub fn to_payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("content".to_string(), Value::String(self.text.clone()));
        payload.insert("content_hash".to_string(), Value::String(self.content_hash()));
        if let Some(source_id) = &self.source_id {
            payload.insert("source_id".to_string(), Value::String(source_id.clone()));
        }
        if let Some(timestamp) = &self.timestamp {
            payload.insert("timestamp".to_string(), Value::String(timestamp.to_rfc3339()));
        }
        if !self.metadata.is_empty() {
            payload.insert("metadata".to_string(), Value::Object(self.metadata.clone()));
        }
        payload
    }
}
