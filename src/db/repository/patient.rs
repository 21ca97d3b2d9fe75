use std::str::FromStr;

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use uuid::Uuid;

use super::{format_datetime, parse_date, parse_datetime, parse_uuid, DATE_FORMAT};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

const PATIENT_COLUMNS: &str = "id, nfc_tag, name, created_at, date_of_birth, gender, blood_type,
     emergency_contact, allergies";

/// Insert a patient. A reused tag surfaces as `ConstraintViolation`.
pub fn insert_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, nfc_tag, name, created_at, date_of_birth, gender, blood_type,
         emergency_contact, allergies)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            patient.id.to_string(),
            patient.nfc_tag,
            patient.name,
            format_datetime(&patient.created_at),
            patient
                .date_of_birth
                .map(|d| d.format(DATE_FORMAT).to_string()),
            patient.gender.as_str(),
            patient.blood_type.as_str(),
            patient.emergency_contact,
            patient.allergies,
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref err, _)
            if err.code == ErrorCode::ConstraintViolation =>
        {
            DatabaseError::ConstraintViolation(format!(
                "tag '{}' already registered",
                patient.nfc_tag
            ))
        }
        other => other.into(),
    })?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    let sql = format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id.to_string()], read_patient_row)
        .optional()?;
    row.map(patient_from_row).transpose()
}

pub fn get_patient_by_tag(conn: &Connection, tag: &str) -> Result<Option<Patient>, DatabaseError> {
    let sql = format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE nfc_tag = ?1");
    let row = conn
        .query_row(&sql, params![tag], read_patient_row)
        .optional()?;
    row.map(patient_from_row).transpose()
}

/// Delete a patient; records and transcript entries go with it (cascade).
pub fn delete_patient(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let deleted = conn.execute("DELETE FROM patients WHERE id = ?1", params![id.to_string()])?;
    if deleted == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Patient".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

struct PatientRow {
    id: String,
    nfc_tag: String,
    name: String,
    created_at: String,
    date_of_birth: Option<String>,
    gender: String,
    blood_type: String,
    emergency_contact: Option<String>,
    allergies: String,
}

fn read_patient_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PatientRow> {
    Ok(PatientRow {
        id: row.get(0)?,
        nfc_tag: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
        date_of_birth: row.get(4)?,
        gender: row.get(5)?,
        blood_type: row.get(6)?,
        emergency_contact: row.get(7)?,
        allergies: row.get(8)?,
    })
}

fn patient_from_row(row: PatientRow) -> Result<Patient, DatabaseError> {
    Ok(Patient {
        id: parse_uuid(&row.id)?,
        nfc_tag: row.nfc_tag,
        name: row.name,
        created_at: parse_datetime(&row.created_at)?,
        date_of_birth: row.date_of_birth.as_deref().map(parse_date).transpose()?,
        gender: Gender::from_str(&row.gender)?,
        blood_type: BloodType::from_str(&row.blood_type)?,
        emergency_contact: row.emergency_contact,
        allergies: row.allergies,
    })
}
