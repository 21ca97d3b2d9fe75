use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_datetime, parse_date, parse_datetime, parse_uuid, DATE_FORMAT};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

const RECORD_COLUMNS: &str = "id, patient_id, condition, description, created_at, updated_at,
     document_ref, severity, doctor_notes, treatment_plan, follow_up_date";

pub fn insert_medical_record(
    conn: &Connection,
    record: &MedicalRecord,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO medical_records (id, patient_id, condition, description, created_at,
         updated_at, document_ref, severity, doctor_notes, treatment_plan, follow_up_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            record.id.to_string(),
            record.patient_id.to_string(),
            record.condition,
            record.description,
            format_datetime(&record.created_at),
            format_datetime(&record.updated_at),
            record.document_ref,
            record.severity.as_str(),
            record.doctor_notes,
            record.treatment_plan,
            record
                .follow_up_date
                .map(|d| d.format(DATE_FORMAT).to_string()),
        ],
    )?;
    Ok(())
}

pub fn get_medical_record(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<MedicalRecord>, DatabaseError> {
    let sql = format!("SELECT {RECORD_COLUMNS} FROM medical_records WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id.to_string()], read_record_row)
        .optional()?;
    row.map(record_from_row).transpose()
}

/// Overwrite the mutable fields of an existing record.
pub fn update_medical_record(
    conn: &Connection,
    record: &MedicalRecord,
) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE medical_records SET condition = ?2, description = ?3, updated_at = ?4,
         document_ref = ?5, severity = ?6, doctor_notes = ?7, treatment_plan = ?8,
         follow_up_date = ?9
         WHERE id = ?1",
        params![
            record.id.to_string(),
            record.condition,
            record.description,
            format_datetime(&record.updated_at),
            record.document_ref,
            record.severity.as_str(),
            record.doctor_notes,
            record.treatment_plan,
            record
                .follow_up_date
                .map(|d| d.format(DATE_FORMAT).to_string()),
        ],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "MedicalRecord".into(),
            id: record.id.to_string(),
        });
    }
    Ok(())
}

/// Records for one patient, newest first. Ties on `created_at` fall back to
/// insertion order.
pub fn get_records_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
    filter: &RecordFilter,
) -> Result<Vec<MedicalRecord>, DatabaseError> {
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM medical_records
         WHERE patient_id = ?1
           AND (?2 IS NULL OR instr(lower(condition), lower(?2)) > 0)
           AND (?3 IS NULL OR severity = ?3)
         ORDER BY created_at DESC, rowid DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![
            patient_id.to_string(),
            filter.condition.as_deref().filter(|c| !c.trim().is_empty()),
            filter.severity.map(|s| s.as_str()),
        ],
        read_record_row,
    )?;

    let mut records = Vec::new();
    for row in rows {
        records.push(record_from_row(row?)?);
    }
    Ok(records)
}

struct RecordRow {
    id: String,
    patient_id: String,
    condition: String,
    description: String,
    created_at: String,
    updated_at: String,
    document_ref: Option<String>,
    severity: String,
    doctor_notes: String,
    treatment_plan: String,
    follow_up_date: Option<String>,
}

fn read_record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok(RecordRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        condition: row.get(2)?,
        description: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        document_ref: row.get(6)?,
        severity: row.get(7)?,
        doctor_notes: row.get(8)?,
        treatment_plan: row.get(9)?,
        follow_up_date: row.get(10)?,
    })
}

fn record_from_row(row: RecordRow) -> Result<MedicalRecord, DatabaseError> {
    Ok(MedicalRecord {
        id: parse_uuid(&row.id)?,
        patient_id: parse_uuid(&row.patient_id)?,
        condition: row.condition,
        description: row.description,
        created_at: parse_datetime(&row.created_at)?,
        updated_at: parse_datetime(&row.updated_at)?,
        document_ref: row.document_ref,
        severity: Severity::from_str(&row.severity)?,
        doctor_notes: row.doctor_notes,
        treatment_plan: row.treatment_plan,
        follow_up_date: row.follow_up_date.as_deref().map(parse_date).transpose()?,
    })
}
