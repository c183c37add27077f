//! Query handler

use axum::{extract::State, Json};
use serde::Deserialize;
use validator::Validate;

use super::validation_error;
use crate::AppState;
use strata_common::errors::Result;
use strata_router::QueryResult;

/// Query request
#[derive(Debug, Deserialize, Validate)]
pub struct QueryRequest {
    #[validate(length(min = 1, max = 4096))]
    pub question: String,
}

/// Answer a question from the vector and/or graph store
pub async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResult>> {
    request.validate().map_err(validation_error)?;
    let result = state.router.query(&request.question).await?;
    Ok(Json(result))
}
