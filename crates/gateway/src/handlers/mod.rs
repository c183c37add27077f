//! API handlers module

pub mod health;
pub mod ingest;
pub mod query;

use strata_common::errors::AppError;
use validator::ValidationErrors;

/// Map request validation failures to a 400
pub(crate) fn validation_error(errors: ValidationErrors) -> AppError {
    let field = errors.field_errors().keys().next().map(|f| f.to_string());
    AppError::Validation {
        message: errors.to_string(),
        field,
    }
}
