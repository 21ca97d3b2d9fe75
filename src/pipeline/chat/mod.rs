pub mod context;
pub mod orchestrator;
pub mod prompt;
pub mod urgency;

pub use context::*;
pub use orchestrator::*;
pub use prompt::*;
pub use urgency::*;

use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::pipeline::llm::LlmError;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Patient not found: {0}")]
    PatientNotFound(Uuid),

    #[error("Language model failed: {0}")]
    Model(#[from] LlmError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}
