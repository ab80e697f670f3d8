use serde::Deserialize;

use super::prompts::{query_response_schema, query_system_role};
use super::{QueryFilters, StructuredQuery};
use crate::config::ChatConfig;
use crate::error::InterpretationError;
use crate::llm::{ChatMessage, GenerationConfig, LLMProvider};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireQuery {
    request_url: Option<String>,
    filters: QueryFilters,
    explanation: Option<String>,
}

/// Ask the model to turn `text` into a catalog request.
pub async fn interpret_query(
    llm: &dyn LLMProvider,
    text: &str,
    config: &ChatConfig,
) -> Result<StructuredQuery, InterpretationError> {
    let messages = [
        ChatMessage::system(query_system_role(&config.catalog.base_url)),
        ChatMessage::user(text.trim()),
    ];
    let raw = llm
        .complete_structured(
            &messages,
            &query_response_schema(),
            &GenerationConfig::from(&config.llm),
        )
        .await
        .map_err(InterpretationError::Upstream)?;

    let query = parse_structured_response(&raw, &config.catalog.base_url)?;
    match &query {
        StructuredQuery::Search { request_url, filters } => {
            tracing::info!(request_url = %request_url, filters = ?filters, "Query interpreted");
        }
        StructuredQuery::Rejected { .. } => {
            tracing::info!("Query rejected by interpreter");
        }
    }
    Ok(query)
}

/// Parse the model's JSON and check the URL targets the configured catalog.
pub fn parse_structured_response(
    raw: &str,
    base_url: &str,
) -> Result<StructuredQuery, InterpretationError> {
    // Strip markdown code fences if present
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let json_str = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => &cleaned[start..=end],
        _ => cleaned,
    };

    let wire: WireQuery = serde_json::from_str(json_str)
        .map_err(|e| InterpretationError::Malformed(e.to_string()))?;

    let request_url = wire
        .request_url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty());

    match request_url {
        Some(request_url) => {
            check_catalog_url(&request_url, base_url)?;
            Ok(StructuredQuery::Search {
                request_url,
                filters: wire.filters,
            })
        }
        None => Ok(StructuredQuery::Rejected {
            explanation: wire.explanation.filter(|e| !e.trim().is_empty()),
            filters: wire.filters,
        }),
    }
}

fn check_catalog_url(request_url: &str, base_url: &str) -> Result<(), InterpretationError> {
    let parsed = url::Url::parse(request_url)
        .map_err(|e| InterpretationError::Malformed(format!("requestUrl {}: {}", request_url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(InterpretationError::Malformed(format!(
            "requestUrl must be http(s): {}",
            request_url
        )));
    }

    let base = url::Url::parse(base_url)
        .map_err(|e| InterpretationError::Malformed(format!("base URL {}: {}", base_url, e)))?;
    if parsed.host_str() != base.host_str() || parsed.port_or_known_default() != base.port_or_known_default() {
        return Err(InterpretationError::Malformed(format!(
            "requestUrl {} does not target {}",
            request_url, base_url
        )));
    }
    Ok(())
}
