//! Boundary error type with a structured JSON body.

use serde::Serialize;

use crate::db::DatabaseError;
use crate::pipeline::chat::ChatError;
use crate::pipeline::llm::LlmError;

/// Structured error body: `{"error": {"code": ..., "message": ...}}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Language model error: {0}")]
    Model(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "BAD_REQUEST",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::Model(_) => "MODEL_ERROR",
            ServiceError::Internal(_) => "INTERNAL",
        }
    }

    /// HTTP-equivalent status for transports that need one.
    pub fn status(&self) -> u16 {
        match self {
            ServiceError::Validation(_) => 400,
            ServiceError::NotFound(_) => 404,
            ServiceError::Model(_) => 502,
            ServiceError::Internal(_) => 500,
        }
    }

    /// Caller-visible body. Internal details are logged, never returned.
    pub fn to_body(&self) -> ErrorBody {
        let message = match self {
            ServiceError::Validation(detail)
            | ServiceError::NotFound(detail)
            | ServiceError::Model(detail) => detail.clone(),
            ServiceError::Internal(detail) => {
                tracing::error!(detail, "Service internal error");
                "An internal error occurred".to_string()
            }
        };
        ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message,
            },
        }
    }
}

impl From<DatabaseError> for ServiceError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, id } => {
                ServiceError::NotFound(format!("{entity_type} {id}"))
            }
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<ChatError> for ServiceError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Validation(msg) => ServiceError::Validation(msg),
            ChatError::PatientNotFound(id) => ServiceError::NotFound(format!("Patient {id}")),
            ChatError::Model(e) => ServiceError::Model(e.to_string()),
            ChatError::Database(e) => ServiceError::from(e),
        }
    }
}

impl From<LlmError> for ServiceError {
    fn from(err: LlmError) -> Self {
        ServiceError::Model(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ServiceError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServiceError::Internal(format!("Task join error: {err}"))
    }
}
