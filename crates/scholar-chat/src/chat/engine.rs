//! Chat orchestration: one user utterance in, a record list with streamed
//! summaries out.
//!
//! Each `submit` and `load_more` runs as its own unit of work with its own
//! cancellation token. Whatever happens to a unit, the bot message it fills
//! is settled before the call returns.

use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{
    EventEmitter, NoopEmitter, EVENT_CHAT_ERROR, EVENT_MESSAGE_APPENDED, EVENT_MESSAGE_SETTLED,
    EVENT_RECORDS_APPENDED, EVENT_RECORD_SUMMARIZED, EVENT_TRANSCRIPT_RESET,
};
use crate::cancellation::{CancellationRegistry, UnitStatus, WorkId, WorkPhase};
use crate::catalog::{next_page_url, normalize_page, CatalogSource};
use crate::config::ChatConfig;
use crate::error::{ChatError, StreamError};
use crate::llm::LLMProvider;
use crate::query::{interpret_query, QueryFilters, StructuredQuery, DEFAULT_INVALID_SEARCH_EXPLANATION};
use crate::summary::{
    process_summary_stream, summary_generation_config, summary_messages, StreamOutcome,
};
use crate::transcript::TranscriptStore;
use crate::types::{Message, MessageId, QueryContext, Record, RecordId};

enum LoadMoreClaim {
    Missing,
    Exhausted,
    Busy,
    Claimed(QueryContext),
}

#[derive(Clone)]
pub struct ChatEngine {
    llm: Arc<dyn LLMProvider>,
    catalog: Arc<dyn CatalogSource>,
    transcript: Arc<TranscriptStore>,
    cancellation: Arc<CancellationRegistry>,
    last_error: Arc<Mutex<Option<String>>>,
    emitter: Arc<dyn EventEmitter>,
    config: Arc<ChatConfig>,
}

impl ChatEngine {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        catalog: Arc<dyn CatalogSource>,
        config: ChatConfig,
    ) -> Self {
        Self {
            llm,
            catalog,
            transcript: Arc::new(TranscriptStore::new()),
            cancellation: Arc::new(CancellationRegistry::new()),
            last_error: Arc::new(Mutex::new(None)),
            emitter: Arc::new(NoopEmitter),
            config: Arc::new(config),
        }
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    // ========================================================================
    // Read-only state
    // ========================================================================

    pub fn transcript(&self) -> Vec<Message> {
        self.transcript.snapshot()
    }

    pub fn message(&self, id: MessageId) -> Option<Message> {
        self.transcript.find_by_id(id)
    }

    /// True iff any message is mid-stream.
    pub fn is_streaming(&self) -> bool {
        self.transcript.is_streaming()
    }

    /// True while any unit of work is in flight, including query
    /// interpretation before a bot message exists.
    pub fn is_busy(&self) -> bool {
        !self.cancellation.is_idle()
    }

    pub fn active_units(&self) -> Vec<UnitStatus> {
        self.cancellation.active_units()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub fn clear_error(&self) {
        *self.last_error.lock() = None;
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Interpret `text`, fetch the first page and stream its summaries.
    ///
    /// Blank input does nothing. Returns the id of the bot message, or `None`
    /// when nothing was produced (blank input or cancellation).
    pub async fn submit(&self, text: &str) -> Result<Option<MessageId>, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        self.append(Message::user(text));
        let (work_id, token) = self
            .cancellation
            .register(WorkPhase::AwaitingQueryInterpretation);

        let result = self.run_submission(text, work_id, &token).await;
        self.cancellation.complete(work_id);
        self.finish(result, &token)
    }

    /// Fetch the next page for a record-list message and stream summaries for
    /// the newly appended records only.
    ///
    /// Returns the number of records appended, `Some(0)` if the message is
    /// gone or has no more results, and `None` when the load was cancelled.
    /// Rejected with `ChatError::Busy` while the message is still streaming.
    pub async fn load_more(&self, message_id: MessageId) -> Result<Option<usize>, ChatError> {
        // Register first so an abort racing with the claim still reaches us.
        let (work_id, token) = self.cancellation.register(WorkPhase::AwaitingPageFetch);

        let mut claim = LoadMoreClaim::Missing;
        self.transcript.update_by_id(message_id, |message| {
            if message.streaming {
                claim = LoadMoreClaim::Busy;
                message.clone()
            } else {
                match message.query.as_ref() {
                    Some(query) if query.has_more_results => {
                        claim = LoadMoreClaim::Claimed(query.clone());
                        message.with_streaming(true)
                    }
                    _ => {
                        claim = LoadMoreClaim::Exhausted;
                        message.clone()
                    }
                }
            }
        });

        let query = match claim {
            LoadMoreClaim::Claimed(query) => query,
            LoadMoreClaim::Busy => {
                self.cancellation.complete(work_id);
                tracing::debug!(message_id = %message_id, "Load more rejected, message still streaming");
                return Err(ChatError::Busy(message_id));
            }
            LoadMoreClaim::Missing | LoadMoreClaim::Exhausted => {
                self.cancellation.complete(work_id);
                tracing::debug!(message_id = %message_id, "Nothing more to load");
                return Ok(Some(0));
            }
        };

        self.cancellation.attach_message(work_id, message_id);
        let result = self.run_load_more(message_id, query, work_id, &token).await;
        self.settle(message_id);
        self.cancellation.complete(work_id);
        self.finish(result, &token)
    }

    /// Cancel every unit of work and settle every message.
    pub fn abort(&self) -> usize {
        let cancelled = self.cancellation.abort_all();
        for id in self.transcript.settle_all() {
            self.emitter
                .emit(EVENT_MESSAGE_SETTLED, json!({ "messageId": id }));
        }
        cancelled
    }

    /// Cancel only the work filling `message_id`, then settle it.
    pub fn abort_message(&self, message_id: MessageId) -> usize {
        let cancelled = self.cancellation.cancel_for_message(message_id);
        self.settle(message_id);
        cancelled
    }

    /// Abort everything and drop the whole transcript.
    pub fn reset(&self) {
        self.cancellation.abort_all();
        self.transcript.reset();
        self.clear_error();
        self.emitter.emit(EVENT_TRANSCRIPT_RESET, json!({}));
        tracing::info!("Transcript reset");
    }

    // ========================================================================
    // Units of work
    // ========================================================================

    async fn run_submission(
        &self,
        text: &str,
        work_id: WorkId,
        token: &CancellationToken,
    ) -> Result<Option<MessageId>, ChatError> {
        let query = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(ChatError::Cancelled),
            result = interpret_query(self.llm.as_ref(), text, &self.config) => result?,
        };

        let explanation = query.explanation_or_default().map(str::to_string);
        let StructuredQuery::Search { request_url, filters } = query else {
            if token.is_cancelled() {
                return Err(ChatError::Cancelled);
            }
            let explanation =
                explanation.unwrap_or_else(|| DEFAULT_INVALID_SEARCH_EXPLANATION.to_string());
            return Ok(Some(self.append(Message::bot_text(explanation))));
        };

        self.cancellation.set_phase(work_id, WorkPhase::AwaitingPageFetch);
        let page = self.catalog.fetch_page(&request_url, token).await?;
        if token.is_cancelled() {
            return Err(ChatError::Cancelled);
        }

        let context = QueryContext {
            request_url,
            current_page: page.meta.page,
            has_more_results: page.has_more_results(),
        };
        let records = normalize_page(page);
        let message_id = self.append(Message::bot_records(records.clone(), context));
        self.cancellation.attach_message(work_id, message_id);
        tracing::info!(message_id = %message_id, records = records.len(), "Records appended");

        let result = self
            .stream_summaries(message_id, &records, Some(&filters), work_id, token)
            .await;
        self.settle(message_id);
        result.map(|_| Some(message_id))
    }

    async fn run_load_more(
        &self,
        message_id: MessageId,
        query: QueryContext,
        work_id: WorkId,
        token: &CancellationToken,
    ) -> Result<Option<usize>, ChatError> {
        let next_page = query.current_page.saturating_add(1);
        let url = next_page_url(&query.request_url, next_page)?;
        tracing::info!(message_id = %message_id, page = next_page, "Loading more results");

        let page = self.catalog.fetch_page(&url, token).await?;
        if token.is_cancelled() {
            return Err(ChatError::Cancelled);
        }

        let context = QueryContext {
            request_url: query.request_url,
            current_page: next_page,
            has_more_results: page.has_more_results(),
        };
        let records = normalize_page(page);
        let mut applied = false;
        let updated = self.transcript.update_by_id(message_id, |message| {
            if token.is_cancelled() {
                message.clone()
            } else {
                applied = true;
                message.with_records_appended(&records).with_query(context.clone())
            }
        });
        if token.is_cancelled() {
            return Err(ChatError::Cancelled);
        }
        let Some(updated) = updated.filter(|_| applied) else {
            tracing::debug!(message_id = %message_id, "Message removed while loading more");
            return Ok(Some(0));
        };

        let offset = updated.records().len().saturating_sub(records.len());
        self.emitter.emit(
            EVENT_RECORDS_APPENDED,
            json!({
                "messageId": message_id,
                "offset": offset,
                "records": records,
                "hasMoreResults": context.has_more_results,
            }),
        );
        tracing::info!(message_id = %message_id, records = records.len(), "Records appended");

        self.stream_summaries(message_id, &records, None, work_id, token)
            .await?;
        Ok(Some(records.len()))
    }

    async fn stream_summaries(
        &self,
        message_id: MessageId,
        records: &[Record],
        filters: Option<&QueryFilters>,
        work_id: WorkId,
        token: &CancellationToken,
    ) -> Result<(), ChatError> {
        if records.is_empty() {
            return Ok(());
        }
        self.cancellation.set_phase(work_id, WorkPhase::StreamingSummaries);

        let delimiter = self.config.summary.delimiter.as_str();
        let messages = summary_messages(records, filters, delimiter);
        let generation = summary_generation_config(&self.config);
        let stream = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(ChatError::Cancelled),
            result = self.llm.chat_stream(&messages, &generation) => {
                result.map_err(|e| StreamError(format!("{:#}", e)))?
            }
        };

        let record_ids: Vec<RecordId> = records.iter().map(|r| r.id).collect();
        let outcome = process_summary_stream(stream, &record_ids, delimiter, token, |update| {
            // Checked under the store's lock so an abort sweep always wins.
            let mut applied = false;
            let updated = self.transcript.update_by_id(message_id, |message| {
                if token.is_cancelled() {
                    message.clone()
                } else {
                    applied = true;
                    message.with_summary(update.record_id, &update.summary)
                }
            });
            if let (true, Some(updated)) = (applied, updated) {
                let position = updated
                    .records()
                    .iter()
                    .position(|r| r.id == update.record_id);
                self.emitter.emit(
                    EVENT_RECORD_SUMMARIZED,
                    json!({
                        "messageId": message_id,
                        "recordId": update.record_id,
                        "position": position,
                        "summary": update.summary,
                    }),
                );
            }
        })
        .await?;

        match outcome {
            StreamOutcome::Completed { summaries } => {
                tracing::info!(message_id = %message_id, summaries, "Summaries streamed");
                Ok(())
            }
            StreamOutcome::Cancelled { .. } => Err(ChatError::Cancelled),
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn append(&self, message: Message) -> MessageId {
        let data = serde_json::to_value(&message).unwrap_or_default();
        let id = self.transcript.append(message);
        self.emitter.emit(EVENT_MESSAGE_APPENDED, data);
        id
    }

    fn settle(&self, message_id: MessageId) {
        let mut changed = false;
        self.transcript.update_by_id(message_id, |message| {
            changed = !message.is_settled();
            message.settled()
        });
        if changed {
            self.emitter
                .emit(EVENT_MESSAGE_SETTLED, json!({ "messageId": message_id }));
        }
    }

    /// Cancellation ends a unit silently; any other failure is recorded for
    /// the front-end and returned.
    fn finish<T: Default>(
        &self,
        result: Result<T, ChatError>,
        token: &CancellationToken,
    ) -> Result<T, ChatError> {
        match result {
            Ok(value) => Ok(value),
            Err(e) if e.is_cancelled() || token.is_cancelled() => {
                tracing::info!("Request cancelled");
                Ok(T::default())
            }
            Err(e) => {
                let message = e.user_message();
                tracing::error!(error = %e, "Chat request failed");
                *self.last_error.lock() = Some(message.clone());
                self.emitter
                    .emit(EVENT_CHAT_ERROR, json!({ "message": message }));
                Err(e)
            }
        }
    }
}
