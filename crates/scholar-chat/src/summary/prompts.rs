use crate::llm::ChatMessage;
use crate::query::QueryFilters;
use crate::types::Record;

/// System role describing the per-record summary protocol.
pub fn summary_system_role(delimiter: &str) -> String {
    format!(
        r#"You write short summaries of academic works for a researcher.
You will receive a list of titles, one per line, optionally followed by a line describing the search that found them.

For EACH title, in the order given, write a summary of two or three sentences describing what the work is likely about and why it may matter for the search.
Separate consecutive summaries with the exact line {delim}
Rules:
  - Produce exactly one summary per title, no more and no fewer.
  - Never write {delim} inside a summary.
  - Do not repeat the title, number the summaries or add any introduction or closing remarks."#,
        delim = delimiter
    )
}

/// Titles one per line, then the search context when there is one.
pub fn batch_text(records: &[Record], filters: Option<&QueryFilters>) -> String {
    let mut lines: Vec<String> = records.iter().map(|r| r.title.trim().to_string()).collect();
    if let Some(context) = filters.and_then(QueryFilters::describe) {
        lines.push(format!("Search context: {}", context));
    }
    lines.join("\n")
}

pub fn summary_messages(
    records: &[Record],
    filters: Option<&QueryFilters>,
    delimiter: &str,
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(summary_system_role(delimiter)),
        ChatMessage::user(batch_text(records, filters)),
    ]
}
