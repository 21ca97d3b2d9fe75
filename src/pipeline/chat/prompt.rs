/// Merge a context block and the clinician's query into one prompt.
///
/// Without context the prompt is the query verbatim. The query is always the
/// final text of the prompt.
pub fn build_prompt(context: &str, query: &str) -> String {
    if context.is_empty() {
        return query.to_string();
    }
    format!("{context}\n\nCurrent query: {query}")
}
