//! Medical record submission, editing and listing.

use std::sync::Arc;

use chrono::Local;
use uuid::Uuid;

use super::ServiceError;
use crate::db::{self, PatientStore, SqliteStore};
use crate::models::*;

pub struct RecordService {
    store: Arc<SqliteStore>,
}

impl RecordService {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }

    pub fn create(
        &self,
        patient_id: &Uuid,
        new: NewMedicalRecord,
    ) -> Result<MedicalRecord, ServiceError> {
        require_text("condition", &new.condition)?;
        require_text("description", &new.description)?;
        if self.store.find_by_id(patient_id)?.is_none() {
            return Err(ServiceError::NotFound(format!("Patient {patient_id}")));
        }

        let record = MedicalRecord::from_new(*patient_id, new);
        self.store
            .with_conn(|conn| db::insert_medical_record(conn, &record))?;
        tracing::info!(
            record_id = %record.id,
            patient_id = %patient_id,
            severity = record.severity.as_str(),
            "Medical record created"
        );
        Ok(record)
    }

    pub fn get(&self, record_id: &Uuid) -> Result<MedicalRecord, ServiceError> {
        self.store
            .with_conn(|conn| db::get_medical_record(conn, record_id))?
            .ok_or_else(|| ServiceError::NotFound(format!("MedicalRecord {record_id}")))
    }

    /// Apply an in-place edit and refresh `updated_at`.
    pub fn update(
        &self,
        record_id: &Uuid,
        update: RecordUpdate,
    ) -> Result<MedicalRecord, ServiceError> {
        if update.is_empty() {
            return Err(ServiceError::Validation("no fields to update".into()));
        }
        if let Some(condition) = &update.condition {
            require_text("condition", condition)?;
        }
        if let Some(description) = &update.description {
            require_text("description", description)?;
        }

        let mut record = self.get(record_id)?;
        record.apply(update, Local::now().naive_local());
        self.store
            .with_conn(|conn| db::update_medical_record(conn, &record))?;
        tracing::info!(record_id = %record.id, "Medical record updated");
        Ok(record)
    }

    /// A patient's records, newest first, narrowed by `filter`.
    pub fn list(
        &self,
        patient_id: &Uuid,
        filter: &RecordFilter,
    ) -> Result<Vec<MedicalRecord>, ServiceError> {
        if self.store.find_by_id(patient_id)?.is_none() {
            return Err(ServiceError::NotFound(format!("Patient {patient_id}")));
        }
        Ok(self
            .store
            .with_conn(|conn| db::get_records_for_patient(conn, patient_id, filter))?)
    }
}

fn require_text(field: &str, value: &str) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        return Err(ServiceError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}
