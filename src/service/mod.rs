//! Caller-facing services. Every error leaving this layer is a `ServiceError`.

pub mod chat;
pub mod error;
pub mod patients;
pub mod records;

pub use chat::ChatService;
pub use error::{ErrorBody, ErrorDetail, ServiceError};
pub use patients::{PatientOption, PatientService, ScanResult};
pub use records::RecordService;
