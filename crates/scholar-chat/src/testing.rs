//! Test doubles shared by the unit tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::catalog::{CatalogMeta, CatalogPage, CatalogSource, OpenAccess, RawRecord};
use crate::chat::EventEmitter;
use crate::error::{CatalogError, ChatError};
use crate::llm::{
    ChatMessage, GenerationConfig, LLMProvider, ProviderInfo, ResponseSchema, TokenStream,
};

/// LLM provider replaying queued replies in order.
#[derive(Default)]
pub struct ScriptedProvider {
    structured: Mutex<VecDeque<Result<String, String>>>,
    streams: Mutex<VecDeque<Result<TokenStream, String>>>,
    structured_requests: Mutex<Vec<Vec<ChatMessage>>>,
    stream_requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_structured(&self, reply: impl Into<String>) {
        self.structured.lock().push_back(Ok(reply.into()));
    }

    pub fn push_structured_error(&self, error: &str) {
        self.structured.lock().push_back(Err(error.to_string()));
    }

    pub fn push_stream(&self, stream: TokenStream) {
        self.streams.lock().push_back(Ok(stream));
    }

    pub fn push_fragments<I, S>(&self, fragments: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push_stream(TokenStream::from_fragments(fragments));
    }

    pub fn structured_calls(&self) -> usize {
        self.structured_requests.lock().len()
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_requests.lock().len()
    }

    pub fn last_structured_messages(&self) -> Option<Vec<ChatMessage>> {
        self.structured_requests.lock().last().cloned()
    }

    pub fn last_stream_messages(&self) -> Option<Vec<ChatMessage>> {
        self.stream_requests.lock().last().cloned()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn complete_structured(
        &self,
        messages: &[ChatMessage],
        _schema: &ResponseSchema,
        _config: &GenerationConfig,
    ) -> Result<String> {
        self.structured_requests.lock().push(messages.to_vec());
        match self.structured.lock().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(error)) => Err(anyhow!(error)),
            None => Err(anyhow!("no scripted structured reply")),
        }
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        _config: &GenerationConfig,
    ) -> Result<TokenStream> {
        self.stream_requests.lock().push(messages.to_vec());
        match self.streams.lock().pop_front() {
            Some(Ok(stream)) => Ok(stream),
            Some(Err(error)) => Err(anyhow!(error)),
            None => Err(anyhow!("no scripted stream")),
        }
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "Scripted".to_string(),
            model: "scripted".to_string(),
            supports_streaming: true,
            supports_structured_output: true,
        }
    }
}

/// In-memory catalog that records every requested URL.
#[derive(Default)]
pub struct StaticCatalog {
    pages: Mutex<VecDeque<Result<CatalogPage, CatalogError>>>,
    requested: Mutex<Vec<String>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_page(&self, page: CatalogPage) {
        self.pages.lock().push_back(Ok(page));
    }

    pub fn push_error(&self, error: CatalogError) {
        self.pages.lock().push_back(Err(error));
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.requested.lock().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.requested.lock().len()
    }
}

#[async_trait]
impl CatalogSource for StaticCatalog {
    async fn fetch_page(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<CatalogPage, ChatError> {
        self.requested.lock().push(url.to_string());
        if cancel.is_cancelled() {
            return Err(ChatError::Cancelled);
        }
        match self.pages.lock().pop_front() {
            Some(Ok(page)) => Ok(page),
            Some(Err(error)) => Err(error.into()),
            None => Err(CatalogError::Network("no scripted page".to_string()).into()),
        }
    }
}

/// Emitter that keeps every event.
#[derive(Default)]
pub struct RecordingEmitter {
    events: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<String> {
        self.events.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn payloads(&self, event: &str) -> Vec<serde_json::Value> {
        self.events
            .lock()
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, data)| data.clone())
            .collect()
    }
}

impl EventEmitter for RecordingEmitter {
    fn emit(&self, event: &str, data: serde_json::Value) {
        self.events.lock().push((event.to_string(), data));
    }
}

pub fn catalog_page(count: u64, page: u32, per_page: u32, titles: &[&str]) -> CatalogPage {
    CatalogPage {
        meta: CatalogMeta { count, page, per_page },
        results: titles
            .iter()
            .map(|title| RawRecord {
                title: title.to_string(),
                doi: Some(format!("https://doi.org/10.1000/{}", title)),
                publication_date: "2022-03-01".to_string(),
                cited_by_count: 10,
                open_access: OpenAccess { is_oa: true },
            })
            .collect(),
    }
}

const NO_FILTERS: &str =
    r#"{"yearRange": null, "citedByRange": null, "isOpenAccess": null, "searchTerm": null}"#;

pub fn search_reply(request_url: &str) -> String {
    let filters: serde_json::Value = serde_json::from_str(NO_FILTERS).unwrap();
    json!({ "requestUrl": request_url, "filters": filters, "explanation": null }).to_string()
}

pub fn rejected_reply(explanation: Option<&str>) -> String {
    let filters: serde_json::Value = serde_json::from_str(NO_FILTERS).unwrap();
    json!({ "requestUrl": null, "filters": filters, "explanation": explanation }).to_string()
}

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn wait_until<F>(condition: F)
where
    F: Fn() -> bool,
{
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
