//! Structured-query interpretation
//!
//! Free text goes in; either a catalog request URL with the filters that
//! shaped it, or an explanation of why no search could be formed, comes out.

use serde::{Deserialize, Serialize};

pub mod interpreter;
pub mod prompts;

pub use interpreter::{interpret_query, parse_structured_response};

/// Used when the model rejects a query without saying why.
pub const DEFAULT_INVALID_SEARCH_EXPLANATION: &str = "I can only help you find academic papers. \
Try asking for works on a topic, optionally limited by publication year, citation count or open access.";

/// Numeric bounds, either side optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericRange {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl NumericRange {
    fn describe(&self) -> Option<String> {
        match (self.min, self.max) {
            (Some(min), Some(max)) if min == max => Some(min.to_string()),
            (Some(min), Some(max)) => Some(format!("between {} and {}", min, max)),
            (Some(min), None) => Some(format!("above {}", min)),
            (None, Some(max)) => Some(format!("below {}", max)),
            (None, None) => None,
        }
    }
}

/// Filters the interpreter applied. `None` means unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryFilters {
    pub year_range: Option<NumericRange>,
    pub cited_by_range: Option<NumericRange>,
    pub is_open_access: Option<bool>,
    pub search_term: Option<String>,
}

impl QueryFilters {
    /// One-line human description, `None` when no filter is set.
    pub fn describe(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(term) = self.search_term.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            parts.push(format!("topic: {}", term));
        }
        if let Some(years) = self.year_range.and_then(|r| r.describe()) {
            parts.push(format!("published {}", years));
        }
        if let Some(citations) = self.cited_by_range.and_then(|r| r.describe()) {
            parts.push(format!("citations {}", citations));
        }
        match self.is_open_access {
            Some(true) => parts.push("open access only".to_string()),
            Some(false) => parts.push("closed access only".to_string()),
            None => {}
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }
}

/// Outcome of interpreting one user utterance.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredQuery {
    Search {
        request_url: String,
        filters: QueryFilters,
    },
    Rejected {
        explanation: Option<String>,
        filters: QueryFilters,
    },
}

impl StructuredQuery {
    /// Explanation to show for a rejected query, falling back to the default.
    pub fn explanation_or_default(&self) -> Option<&str> {
        match self {
            StructuredQuery::Search { .. } => None,
            StructuredQuery::Rejected { explanation, .. } => Some(
                explanation
                    .as_deref()
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or(DEFAULT_INVALID_SEARCH_EXPLANATION),
            ),
        }
    }
}
