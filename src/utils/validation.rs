//! Input validation helpers

use crate::error::{BenchError, BenchResult};

/// Validate a session id before it is joined to a filesystem path.
///
/// Ids are uuid-shaped strings; anything else (path separators, dots) is
/// rejected so a crafted id can never escape the sessions directory.
pub fn validate_session_id(id: &str) -> BenchResult<()> {
    if id.is_empty() || id.len() > 64 {
        return Err(BenchError::InvalidInput(format!(
            "session id '{id}' has invalid length"
        )));
    }
    if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(BenchError::InvalidInput(format!(
            "session id '{id}' contains invalid characters"
        )));
    }
    Ok(())
}

/// Validate a workspace-relative file path supplied with an execution
/// request. Absolute paths and parent-directory components are rejected so
/// auxiliary files can only land inside the working directory.
pub fn validate_relative_path(path: &str) -> BenchResult<()> {
    use std::path::Component;

    let parsed = std::path::Path::new(path);
    if parsed.components().count() == 0 {
        return Err(BenchError::InvalidInput(
            "file path must be non-empty".to_string(),
        ));
    }
    for component in parsed.components() {
        match component {
            Component::Normal(_) => {}
            _ => {
                return Err(BenchError::InvalidInput(format!(
                    "file path '{path}' must be relative and stay inside the workspace"
                )));
            }
        }
    }
    Ok(())
}

/// Validate the model identifier list supplied to a run
pub fn validate_models(models: &[String]) -> BenchResult<()> {
    if models.is_empty() {
        return Err(BenchError::Validation(
            "at least one model identifier is required".to_string(),
        ));
    }
    for model in models {
        if model.trim().is_empty() {
            return Err(BenchError::Validation(
                "model identifiers must be non-empty".to_string(),
            ));
        }
    }
    Ok(())
}
