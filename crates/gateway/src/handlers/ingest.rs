//! Ingestion handler

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;
use validator::Validate;

use super::validation_error;
use crate::AppState;
use strata_common::{errors::Result, models::Content};
use strata_router::IngestResult;

/// Ingest request
#[derive(Debug, Deserialize, Validate)]
pub struct IngestRequest {
    #[validate(length(min = 1))]
    pub text: String,

    /// Explicit vector record id; derived from the source id and text hash when absent
    pub id: Option<Uuid>,

    #[validate(length(min = 1, max = 512))]
    pub source_id: Option<String>,

    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl IngestRequest {
    fn into_content(self) -> Content {
        Content {
            text: self.text,
            id: self.id,
            source_id: self.source_id,
            timestamp: self.timestamp,
            metadata: self.metadata,
        }
    }
}

/// Classify content and write it to the stores its plan names.
///
/// Store failures do not fail the request; the per-store status is in the body.
pub async fn ingest(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestResult>> {
    request.validate().map_err(validation_error)?;

    let result = state.router.ingest(request.into_content()).await?;
    if result.is_partial() {
        tracing::warn!(
            record_id = ?result.vector_record_id,
            vector = ?result.vector,
            graph = ?result.graph,
            "Partial ingest"
        );
    }
    Ok(Json(result))
}
