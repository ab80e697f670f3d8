pub mod cancellation;
pub mod catalog;
pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod query;
pub mod summary;
pub mod transcript;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export primary types for convenience
pub use chat::{ChatEngine, EventEmitter, NoopEmitter};
pub use config::{CatalogConfig, ChatConfig, SummaryConfig};
pub use error::{CatalogError, ChatError, InterpretationError, StreamError};
pub use types::{Message, MessageBody, MessageId, QueryContext, Record, RecordId, Sender};

// Re-export LLM types
pub use llm::{ApiProvider, ExternalProvider, GenerationConfig, LLMConfig, LLMProvider, ProviderInfo};

// Catalog + query entry points
pub use catalog::{CatalogSource, HttpCatalog};
pub use query::{QueryFilters, StructuredQuery};
