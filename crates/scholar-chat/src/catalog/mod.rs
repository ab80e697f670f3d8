//! Works catalog access: page schema, pagination contract and record
//! normalisation.
//!
//! The catalog is a paginated JSON search API. A page reports the total hit
//! count together with its own page number and size, and that triple is the
//! only thing used to decide whether another page exists.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{CatalogError, ChatError};

pub mod http;
pub mod normalize;

pub use http::HttpCatalog;
pub use normalize::{normalize_page, normalize_record};

/// Shown for a search that matched nothing.
pub const NO_PAPERS_FOUND_EXPLANATION: &str =
    "No papers matched this search. Try widening the year range or using fewer filters.";

const PAGE_PARAM: &str = "page";

// ============================================================================
// Page schema
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogMeta {
    pub count: u64,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAccess {
    pub is_oa: bool,
}

/// One work as the catalog returns it. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub title: String,
    pub doi: Option<String>,
    pub publication_date: String,
    pub cited_by_count: u64,
    pub open_access: OpenAccess,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogPage {
    pub meta: CatalogMeta,
    pub results: Vec<RawRecord>,
}

impl CatalogPage {
    /// `count > page * per_page`
    pub fn has_more_results(&self) -> bool {
        let seen = u64::from(self.meta.page).saturating_mul(u64::from(self.meta.per_page));
        self.meta.count > seen
    }

    /// Checks the constraints serde cannot express.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.meta.per_page == 0 {
            return Err(CatalogError::Schema("meta.per_page must be positive".into()));
        }
        for (i, record) in self.results.iter().enumerate() {
            if let Some(doi) = &record.doi {
                if url::Url::parse(doi).is_err() {
                    return Err(CatalogError::Schema(format!(
                        "results[{}].doi is not a URL: {}",
                        i, doi
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Parse and validate a raw response body.
pub fn parse_page(body: &str) -> Result<CatalogPage, CatalogError> {
    let page: CatalogPage =
        serde_json::from_str(body).map_err(|e| CatalogError::Schema(e.to_string()))?;
    page.validate()?;
    Ok(page)
}

/// Derive the URL of `page` from a request URL by replacing its `page`
/// parameter, or appending one if absent. Every other parameter is kept
/// exactly as written.
pub fn next_page_url(request_url: &str, page: u32) -> Result<String, CatalogError> {
    url::Url::parse(request_url).map_err(|e| CatalogError::InvalidUrl {
        url: request_url.to_string(),
        reason: e.to_string(),
    })?;

    let (without_fragment, fragment) = match request_url.split_once('#') {
        Some((head, fragment)) => (head, Some(fragment)),
        None => (request_url, None),
    };
    let (path, query) = match without_fragment.split_once('?') {
        Some((path, query)) => (path, query),
        None => (without_fragment, ""),
    };

    let page_pair = format!("{}={}", PAGE_PARAM, page);
    let mut replaced = false;
    let mut pairs: Vec<String> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let key = pair.split('=').next().unwrap_or_default();
            if key == PAGE_PARAM {
                replaced = true;
                page_pair.clone()
            } else {
                pair.to_string()
            }
        })
        .collect();
    if !replaced {
        pairs.push(page_pair);
    }

    let mut next = format!("{}?{}", path, pairs.join("&"));
    if let Some(fragment) = fragment {
        next.push('#');
        next.push_str(fragment);
    }
    Ok(next)
}

/// Source of catalog pages.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch one page. Resolves to `ChatError::Cancelled` once `cancel` fires.
    async fn fetch_page(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<CatalogPage, ChatError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(count: u64, page: u32, per_page: u32) -> CatalogPage {
        CatalogPage {
            meta: CatalogMeta { count, page, per_page },
            results: Vec::new(),
        }
    }

    #[test]
    fn test_has_more_results_boundaries() {
        assert!(!page(20, 2, 10).has_more_results());
        assert!(page(21, 2, 10).has_more_results());
        assert!(page(11, 1, 10).has_more_results());
        assert!(!page(0, 1, 25).has_more_results());
    }

    #[test]
    fn test_has_more_results_does_not_overflow() {
        assert!(!page(u64::MAX, u32::MAX, u32::MAX).has_more_results());
    }

    #[test]
    fn test_parse_page_ignores_unknown_fields() {
        let body = r#"{
            "meta": {"count": 1, "page": 1, "per_page": 25, "db_response_time_ms": 12},
            "results": [{
                "id": "https://openalex.org/W1",
                "title": "Deep learning",
                "doi": "https://doi.org/10.1038/nature14539",
                "publication_date": "2015-05-27",
                "cited_by_count": 50000,
                "open_access": {"is_oa": false, "oa_url": null}
            }],
            "group_by": []
        }"#;
        let page = parse_page(body).unwrap();
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].cited_by_count, 50000);
    }

    #[test]
    fn test_parse_page_rejects_missing_meta() {
        let err = parse_page(r#"{"results": []}"#).unwrap_err();
        assert!(matches!(err, CatalogError::Schema(_)));
    }

    #[test]
    fn test_parse_page_rejects_non_url_doi() {
        let body = r#"{
            "meta": {"count": 1, "page": 1, "per_page": 25},
            "results": [{
                "title": "x", "doi": "10.1038/nature14539", "publication_date": "2015-05-27",
                "cited_by_count": 1, "open_access": {"is_oa": true}
            }]
        }"#;
        assert!(matches!(parse_page(body), Err(CatalogError::Schema(_))));
    }

    #[test]
    fn test_next_page_url_appends_page() {
        let url = "https://api.openalex.org/works?filter=publication_year:>2020,is_oa:true";
        assert_eq!(
            next_page_url(url, 2).unwrap(),
            "https://api.openalex.org/works?filter=publication_year:>2020,is_oa:true&page=2"
        );
    }

    #[test]
    fn test_next_page_url_replaces_existing_page() {
        let url = "https://api.openalex.org/works?page=2&filter=is_oa:true";
        assert_eq!(
            next_page_url(url, 3).unwrap(),
            "https://api.openalex.org/works?page=3&filter=is_oa:true"
        );
    }

    #[test]
    fn test_next_page_url_without_query() {
        assert_eq!(
            next_page_url("https://api.openalex.org/works", 2).unwrap(),
            "https://api.openalex.org/works?page=2"
        );
    }

    #[test]
    fn test_next_page_url_keeps_similar_keys() {
        let url = "https://api.openalex.org/works?per_page=10";
        assert_eq!(
            next_page_url(url, 2).unwrap(),
            "https://api.openalex.org/works?per_page=10&page=2"
        );
    }

    #[test]
    fn test_next_page_url_rejects_relative() {
        assert!(matches!(
            next_page_url("/works?page=1", 2),
            Err(CatalogError::InvalidUrl { .. })
        ));
    }
}
