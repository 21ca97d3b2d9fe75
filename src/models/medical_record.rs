use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::enums::Severity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalRecord {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub condition: String,
    pub description: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    /// Reference to an attached document (path or storage key).
    pub document_ref: Option<String>,
    pub severity: Severity,
    pub doctor_notes: String,
    pub treatment_plan: String,
    pub follow_up_date: Option<NaiveDate>,
}

/// Submission payload for a new record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewMedicalRecord {
    pub condition: String,
    pub description: String,
    pub severity: Severity,
    pub doctor_notes: String,
    pub treatment_plan: String,
    pub follow_up_date: Option<NaiveDate>,
    pub document_ref: Option<String>,
}

/// In-place edit. `None` leaves the field untouched. For the optional fields
/// `Some(None)` clears the stored value (`null` in JSON).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordUpdate {
    pub condition: Option<String>,
    pub description: Option<String>,
    pub severity: Option<Severity>,
    pub doctor_notes: Option<String>,
    pub treatment_plan: Option<String>,
    #[serde(default, deserialize_with = "present_or_null", skip_serializing_if = "Option::is_none")]
    pub follow_up_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "present_or_null", skip_serializing_if = "Option::is_none")]
    pub document_ref: Option<Option<String>>,
}

/// A field that is present maps to `Some`, even when its value is `null`.
fn present_or_null<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl RecordUpdate {
    pub fn is_empty(&self) -> bool {
        self.condition.is_none()
            && self.description.is_none()
            && self.severity.is_none()
            && self.doctor_notes.is_none()
            && self.treatment_plan.is_none()
            && self.follow_up_date.is_none()
            && self.document_ref.is_none()
    }
}

impl MedicalRecord {
    pub fn from_new(patient_id: Uuid, new: NewMedicalRecord) -> Self {
        let now = Local::now().naive_local();
        Self {
            id: Uuid::new_v4(),
            patient_id,
            condition: new.condition,
            description: new.description,
            created_at: now,
            updated_at: now,
            document_ref: new.document_ref,
            severity: new.severity,
            doctor_notes: new.doctor_notes,
            treatment_plan: new.treatment_plan,
            follow_up_date: new.follow_up_date,
        }
    }

    /// Apply an update and stamp `updated_at`.
    pub fn apply(&mut self, update: RecordUpdate, now: NaiveDateTime) {
        if let Some(condition) = update.condition {
            self.condition = condition;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(severity) = update.severity {
            self.severity = severity;
        }
        if let Some(notes) = update.doctor_notes {
            self.doctor_notes = notes;
        }
        if let Some(plan) = update.treatment_plan {
            self.treatment_plan = plan;
        }
        if let Some(date) = update.follow_up_date {
            self.follow_up_date = date;
        }
        if let Some(doc) = update.document_ref {
            self.document_ref = doc;
        }
        self.updated_at = now;
    }
}
