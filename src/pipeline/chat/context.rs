use chrono::NaiveDate;

use crate::models::*;

/// Render a patient and their record history into a context block.
///
/// `records` must already be ordered newest first. The demographic section is
/// always emitted. With `max_chars` set, history entries are appended in order
/// until the next one would push the block past that many characters, so the
/// oldest entries go first. `None` renders the full history.
pub fn render_context(
    patient: &Patient,
    records: &[MedicalRecord],
    today: NaiveDate,
    max_chars: Option<usize>,
) -> String {
    let mut text = format_demographics(patient, today);

    if records.is_empty() {
        return text;
    }

    let header = "\n\nMedical History:";
    let mut entries = Vec::with_capacity(records.len());
    let mut used = text.chars().count() + header.chars().count();
    for record in records {
        let entry = format_record(record);
        let cost = 1 + entry.chars().count();
        if max_chars.is_some_and(|limit| used + cost > limit) {
            break;
        }
        used += cost;
        entries.push(entry);
    }

    if entries.len() < records.len() {
        tracing::warn!(
            patient_id = %patient.id,
            included = entries.len(),
            omitted = records.len() - entries.len(),
            max_chars = ?max_chars,
            "Context budget reached, older records omitted"
        );
    }

    if !entries.is_empty() {
        text.push_str(header);
        for entry in entries {
            text.push('\n');
            text.push_str(&entry);
        }
    }

    text
}

fn format_demographics(patient: &Patient, today: NaiveDate) -> String {
    let age = patient
        .age_on(today)
        .map(|a| a.to_string())
        .unwrap_or_default();
    [
        "Patient Information:".to_string(),
        format!("Age: {age}"),
        format!("Gender: {}", patient.gender.label()),
        format!("Blood Type: {}", patient.blood_type.label()),
        format!("Allergies: {}", patient.allergies),
    ]
    .join("\n")
}

fn format_record(record: &MedicalRecord) -> String {
    format!(
        "- Condition: {}\n  Description: {}\n  Date: {}\n  Severity: {}\n  Treatment: {}",
        record.condition,
        record.description,
        record.updated_at.format("%Y-%m-%d %H:%M"),
        record.severity.label(),
        record.treatment_plan,
    )
}
