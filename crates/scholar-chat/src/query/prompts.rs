use serde_json::json;

use crate::llm::ResponseSchema;

pub const QUERY_SCHEMA_NAME: &str = "works_query";

/// System role for turning a request into a catalog works URL.
pub fn query_system_role(base_url: &str) -> String {
    format!(
        r#"You translate requests for academic literature into search URLs for a works catalog.
Base URL: {base}

Filters go in a single `filter` query parameter as a comma-separated list:
  - publication_year: `:2022` for an exact year, `:>2020` for after 2020, `:<2022` for before 2022.
    A year window needs two entries, e.g. publication_year:>2020,publication_year:<2024
  - cited_by_count: `:100` exact, `:>50` more than 50, `:<70` fewer than 70.
    A citation window needs two entries, e.g. cited_by_count:>50,cited_by_count:<70
  - is_oa: `true` for open access works only, `false` for closed access only.
  - default.search: free-text search over title and abstract, words joined with `+`,
    e.g. default.search:"graph+neural+networks"
Example: {base}?filter=publication_year:>2020,is_oa:true,default.search:"artificial+intelligence"

Rules:
  - Leave out every filter the user did not ask for. With no filters, return the base URL unchanged.
  - Never add a `page` parameter.
  - Mirror the filters you used in `filters`: yearRange and citedByRange hold the bounds as numbers,
    isOpenAccess is true, false or null, searchTerm is the plain search text. Use null for anything absent.
  - If the user is not asking for a list of works, set requestUrl to null and put a short, friendly
    explanation in `explanation` of what you can help with. Do not mention URLs, APIs or catalogs there.
  - When requestUrl is set, explanation must be null."#,
        base = base_url
    )
}

fn range_schema() -> serde_json::Value {
    json!({
        "anyOf": [
            {
                "type": "object",
                "properties": {
                    "min": {"type": ["integer", "null"]},
                    "max": {"type": ["integer", "null"]}
                },
                "required": ["min", "max"],
                "additionalProperties": false
            },
            {"type": "null"}
        ]
    })
}

/// Strict response schema for the interpreter.
pub fn query_response_schema() -> ResponseSchema {
    ResponseSchema {
        name: QUERY_SCHEMA_NAME.to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "requestUrl": {"type": ["string", "null"]},
                "filters": {
                    "type": "object",
                    "properties": {
                        "yearRange": range_schema(),
                        "citedByRange": range_schema(),
                        "isOpenAccess": {"type": ["boolean", "null"]},
                        "searchTerm": {"type": ["string", "null"]}
                    },
                    "required": ["yearRange", "citedByRange", "isOpenAccess", "searchTerm"],
                    "additionalProperties": false
                },
                "explanation": {"type": ["string", "null"]}
            },
            "required": ["requestUrl", "filters", "explanation"],
            "additionalProperties": false
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_embeds_base_url() {
        let role = query_system_role("http://localhost:9000/works");
        assert!(role.contains("Base URL: http://localhost:9000/works"));
        assert!(role.contains("http://localhost:9000/works?filter="));
    }

    #[test]
    fn test_schema_requires_every_field() {
        let schema = query_response_schema();
        assert_eq!(schema.name, QUERY_SCHEMA_NAME);
        let required = schema.schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 3);
        assert_eq!(schema.schema["additionalProperties"], false);
    }
}
