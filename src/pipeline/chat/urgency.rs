use std::sync::LazyLock;

use regex::RegexSet;

/// Substrings whose presence in a model response flags it for follow-up.
pub const URGENCY_MARKERS: &[&str] = &["emergency", "immediate attention", "critical", "urgent"];

static URGENCY_SET: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new(
        URGENCY_MARKERS
            .iter()
            .map(|m| format!("(?i){}", regex::escape(m))),
    )
    .expect("invalid urgency marker pattern")
});

/// Case-insensitive substring match against the urgency markers.
///
/// Plain keyword matching: "not an emergency" is flagged too.
pub fn is_urgent(response: &str) -> bool {
    URGENCY_SET.is_match(response)
}

/// The markers found in `response`, in declaration order.
pub fn matched_markers(response: &str) -> Vec<&'static str> {
    URGENCY_SET
        .matches(response)
        .into_iter()
        .map(|i| URGENCY_MARKERS[i])
        .collect()
}
