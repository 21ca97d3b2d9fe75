//! Patient registry: tag scans, registration, lookups.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use super::ServiceError;
use crate::db::{self, DatabaseError, PatientStore, SqliteStore};
use crate::models::*;

/// Outcome of a tag scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub patient: Patient,
    /// True when this scan provisioned the patient.
    pub created: bool,
}

/// An action offered once a patient has been resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatientOption {
    pub id: &'static str,
    pub label: &'static str,
}

const PATIENT_OPTIONS: &[PatientOption] = &[
    PatientOption {
        id: "view_records",
        label: "View Medical Records",
    },
    PatientOption {
        id: "ai_consultation",
        label: "AI Consultation",
    },
];

pub struct PatientService {
    store: Arc<SqliteStore>,
}

impl PatientService {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }

    /// Resolve a tag, provisioning a placeholder patient on first sight.
    pub fn scan_tag(&self, tag: &str) -> Result<ScanResult, ServiceError> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(ServiceError::Validation("nfc tag must not be empty".into()));
        }

        if let Some(patient) = self.store.find_by_tag(tag)? {
            return Ok(ScanResult {
                patient,
                created: false,
            });
        }

        match self.store.create(tag, PLACEHOLDER_PATIENT_NAME) {
            Ok(patient) => {
                tracing::info!(patient_id = %patient.id, "Provisioned patient from first tag scan");
                Ok(ScanResult {
                    patient,
                    created: true,
                })
            }
            // Another scan of the same tag won the insert.
            Err(DatabaseError::ConstraintViolation(_)) => {
                let patient = self.store.find_by_tag(tag)?.ok_or_else(|| {
                    ServiceError::Internal(format!("tag {tag} vanished after conflict"))
                })?;
                Ok(ScanResult {
                    patient,
                    created: false,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn register(&self, new: NewPatient) -> Result<Patient, ServiceError> {
        let mut new = new;
        new.nfc_tag = new.nfc_tag.trim().to_string();
        new.name = new.name.trim().to_string();
        if new.nfc_tag.is_empty() {
            return Err(ServiceError::Validation("nfc tag must not be empty".into()));
        }
        if new.name.is_empty() {
            return Err(ServiceError::Validation("name must not be empty".into()));
        }

        let patient = Patient::from_new(new);
        self.store
            .with_conn(|conn| db::insert_patient(conn, &patient))
            .map_err(|e| match e {
                DatabaseError::ConstraintViolation(_) => ServiceError::Validation(format!(
                    "tag '{}' already registered",
                    patient.nfc_tag
                )),
                other => other.into(),
            })?;

        tracing::info!(patient_id = %patient.id, "Registered patient");
        Ok(patient)
    }

    pub fn get(&self, patient_id: &Uuid) -> Result<Patient, ServiceError> {
        self.store
            .find_by_id(patient_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("Patient {patient_id}")))
    }

    pub fn options(&self, patient_id: &Uuid) -> Result<Vec<PatientOption>, ServiceError> {
        self.get(patient_id)?;
        Ok(PATIENT_OPTIONS.to_vec())
    }

    /// Remove a patient together with their records and transcript entries.
    pub fn delete(&self, patient_id: &Uuid) -> Result<(), ServiceError> {
        self.store
            .with_conn(|conn| db::delete_patient(conn, patient_id))?;
        tracing::info!(patient_id = %patient_id, "Deleted patient");
        Ok(())
    }
}
