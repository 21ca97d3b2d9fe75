use super::enums::Severity;

/// Narrowing applied when listing a patient's medical records.
#[derive(Debug, Default, Clone)]
pub struct RecordFilter {
    /// Case-insensitive substring match on the condition label.
    pub condition: Option<String>,
    pub severity: Option<Severity>,
}
