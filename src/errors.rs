//! Error taxonomy for the HTTP boundary.
//!
//! Application plumbing uses `anyhow` internally; everything that crosses the
//! HTTP surface is mapped onto [`PanelError`] so status codes and response
//! bodies stay uniform across built-in and generated handlers.

use serde_json::{json, Value};
use std::fmt;

pub type PanelResult<T> = Result<T, PanelError>;

/// Failure categories surfaced by the admin panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelError {
    /// Bad request input. Carries every violation found, not just the first.
    Validation(Vec<String>),
    /// A document or page lookup missed.
    NotFound(String),
    /// A create collided with an existing key (e.g. duplicate page slug).
    Conflict(String),
    /// The generation pipeline failed; message includes captured subprocess
    /// output when a CLI step was involved.
    Generation(String),
    /// Schema push / client regeneration failed after the response was
    /// already sent. Logged, never surfaced.
    Sync(String),
    /// Document-store protocol failure.
    Store(String),
    /// Filesystem failure outside the generation pipeline.
    Io(String),
}

impl PanelError {
    pub fn validation(message: impl Into<String>) -> Self {
        PanelError::Validation(vec![message.into()])
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        PanelError::NotFound(what.into())
    }

    pub fn generation(err: impl fmt::Display) -> Self {
        PanelError::Generation(err.to_string())
    }

    pub fn store(err: impl fmt::Display) -> Self {
        PanelError::Store(err.to_string())
    }

    /// HTTP status this error maps to. `Sync` never reaches a client, but
    /// keeps a 500 mapping so accidental surfacing is still well-formed.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            PanelError::Validation(_) | PanelError::Conflict(_) => 400,
            PanelError::NotFound(_) => 404,
            PanelError::Generation(_)
            | PanelError::Sync(_)
            | PanelError::Store(_)
            | PanelError::Io(_) => 500,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            PanelError::Validation(_) => "ValidationError",
            PanelError::NotFound(_) => "NotFoundError",
            PanelError::Conflict(_) => "ConflictError",
            PanelError::Generation(_) => "GenerationError",
            PanelError::Sync(_) => "SyncError",
            PanelError::Store(_) => "StoreError",
            PanelError::Io(_) => "IoError",
        }
    }

    #[must_use]
    pub fn message(&self) -> String {
        match self {
            PanelError::Validation(violations) => violations.join(", "),
            PanelError::NotFound(what) => format!("{what} not found"),
            PanelError::Conflict(msg)
            | PanelError::Generation(msg)
            | PanelError::Sync(msg)
            | PanelError::Store(msg)
            | PanelError::Io(msg) => msg.clone(),
        }
    }

    /// JSON body written for this error.
    #[must_use]
    pub fn to_body(&self) -> Value {
        json!({
            "success": false,
            "message": self.message(),
            "error": self.kind(),
        })
    }
}

impl fmt::Display for PanelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

impl std::error::Error for PanelError {}

impl From<std::io::Error> for PanelError {
    fn from(err: std::io::Error) -> Self {
        PanelError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PanelError {
    fn from(err: serde_json::Error) -> Self {
        PanelError::Store(format!("malformed store document: {err}"))
    }
}

impl From<askama::Error> for PanelError {
    fn from(err: askama::Error) -> Self {
        PanelError::Generation(format!("template render failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_enumerates_all_violations() {
        let err = PanelError::Validation(vec![
            "Resource name is required".to_string(),
            "At least one field is required".to_string(),
        ]);
        assert_eq!(err.status(), 400);
        assert_eq!(
            err.message(),
            "Resource name is required, At least one field is required"
        );
        assert_eq!(err.to_body()["error"], "ValidationError");
        assert_eq!(err.to_body()["success"], false);
    }

    #[test]
    fn not_found_formats_model_name() {
        let err = PanelError::not_found("Cases");
        assert_eq!(err.status(), 404);
        assert_eq!(err.message(), "Cases not found");
    }
}
