use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{BloodType, Gender};

/// Name given to patients auto-provisioned by a first tag scan.
pub const PLACEHOLDER_PATIENT_NAME: &str = "Unknown Patient";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    /// Unique, immutable identifier encoded on the patient's NFC token.
    pub nfc_tag: String,
    pub name: String,
    pub created_at: NaiveDateTime,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Gender,
    pub blood_type: BloodType,
    pub emergency_contact: Option<String>,
    pub allergies: String,
}

/// Registration payload for a patient.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPatient {
    pub nfc_tag: String,
    pub name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Gender,
    pub blood_type: BloodType,
    pub emergency_contact: Option<String>,
    pub allergies: String,
}

impl NewPatient {
    /// Minimal payload: tag + name, every other field at its default.
    pub fn with_tag(nfc_tag: &str, name: &str) -> Self {
        Self {
            nfc_tag: nfc_tag.to_string(),
            name: name.to_string(),
            ..Self::default()
        }
    }
}

impl Patient {
    pub fn from_new(new: NewPatient) -> Self {
        Self {
            id: Uuid::new_v4(),
            nfc_tag: new.nfc_tag,
            name: new.name,
            created_at: Local::now().naive_local(),
            date_of_birth: new.date_of_birth,
            gender: new.gender,
            blood_type: new.blood_type,
            emergency_contact: new.emergency_contact,
            allergies: new.allergies,
        }
    }

    /// Age in completed years on `today`. `None` without a birth date or when
    /// the birth date lies after `today`.
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        let dob = self.date_of_birth?;
        let mut years = today.year() - dob.year();
        if (today.month(), today.day()) < (dob.month(), dob.day()) {
            years -= 1;
        }
        u32::try_from(years).ok()
    }
}
