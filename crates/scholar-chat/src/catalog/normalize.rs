use super::{CatalogPage, RawRecord};
use crate::types::{Record, RecordId};

/// Map a catalog work onto a display record waiting for its summary.
pub fn normalize_record(raw: RawRecord) -> Record {
    Record {
        id: RecordId::new(),
        title: raw.title,
        link: raw.doi,
        date: raw.publication_date,
        citations: raw.cited_by_count,
        is_open_access: raw.open_access.is_oa,
        summary: String::new(),
        loading: true,
    }
}

pub fn normalize_page(page: CatalogPage) -> Vec<Record> {
    page.results.into_iter().map(normalize_record).collect()
}
