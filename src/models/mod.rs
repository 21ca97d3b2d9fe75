pub mod chat_message;
pub mod enums;
pub mod filters;
pub mod medical_record;
pub mod patient;

pub use chat_message::*;
pub use filters::*;
pub use medical_record::*;
pub use patient::*;
