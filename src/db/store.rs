//! Store seams consumed by the chat pipeline, and their SQLite implementation.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use uuid::Uuid;

use super::repository;
use super::sqlite::{open_database, open_memory_database};
use super::DatabaseError;
use crate::models::*;

pub trait PatientStore: Send + Sync {
    fn find_by_tag(&self, tag: &str) -> Result<Option<Patient>, DatabaseError>;
    fn find_by_id(&self, id: &Uuid) -> Result<Option<Patient>, DatabaseError>;
    /// Create a patient with the given tag and name, all other fields defaulted.
    fn create(&self, tag: &str, name: &str) -> Result<Patient, DatabaseError>;
}

pub trait RecordStore: Send + Sync {
    /// Full history for a patient, newest first.
    fn list_for_patient(&self, patient_id: &Uuid) -> Result<Vec<MedicalRecord>, DatabaseError>;
}

pub trait TranscriptStore: Send + Sync {
    fn insert(&self, message: &ChatMessage) -> Result<ChatMessage, DatabaseError>;
    fn list(&self, patient_id: Option<&Uuid>) -> Result<Vec<ChatMessage>, DatabaseError>;
}

/// One SQLite connection shared behind a mutex. Each call holds the lock for
/// a single statement.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(open_database(path)?))
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(open_memory_database()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Run a repository operation against the shared connection.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&*conn)
    }
}

impl PatientStore for SqliteStore {
    fn find_by_tag(&self, tag: &str) -> Result<Option<Patient>, DatabaseError> {
        self.with_conn(|conn| repository::get_patient_by_tag(conn, tag))
    }

    fn find_by_id(&self, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
        self.with_conn(|conn| repository::get_patient(conn, id))
    }

    fn create(&self, tag: &str, name: &str) -> Result<Patient, DatabaseError> {
        let patient = Patient::from_new(NewPatient::with_tag(tag, name));
        self.with_conn(|conn| repository::insert_patient(conn, &patient))?;
        Ok(patient)
    }
}

impl RecordStore for SqliteStore {
    fn list_for_patient(&self, patient_id: &Uuid) -> Result<Vec<MedicalRecord>, DatabaseError> {
        self.with_conn(|conn| {
            repository::get_records_for_patient(conn, patient_id, &RecordFilter::default())
        })
    }
}

impl TranscriptStore for SqliteStore {
    fn insert(&self, message: &ChatMessage) -> Result<ChatMessage, DatabaseError> {
        self.with_conn(|conn| repository::insert_chat_message(conn, message))?;
        Ok(message.clone())
    }

    fn list(&self, patient_id: Option<&Uuid>) -> Result<Vec<ChatMessage>, DatabaseError> {
        self.with_conn(|conn| repository::get_chat_messages(conn, patient_id))
    }
}
