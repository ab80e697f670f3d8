//! Summary stream processing
//!
//! One model run summarises a whole batch of records. The token stream is
//! demultiplexed on a delimiter and each completed summary is handed to a
//! callback together with the stable id of the record it belongs to.

use tokio_util::sync::CancellationToken;

use crate::config::ChatConfig;
use crate::error::StreamError;
use crate::llm::{GenerationConfig, TokenStream};
use crate::types::RecordId;

pub mod demux;
pub mod prompts;

pub use demux::SummaryDemux;
pub use prompts::{batch_text, summary_messages};

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryUpdate {
    pub index: usize,
    pub record_id: RecordId,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed { summaries: usize },
    Cancelled { summaries: usize },
}

pub fn summary_generation_config(config: &ChatConfig) -> GenerationConfig {
    GenerationConfig {
        max_tokens: config.summary.max_tokens,
        temperature: config.llm.temperature,
    }
}

/// Drive `stream` to completion, calling `on_update` once per finished
/// summary in record order.
///
/// Cancellation is checked between fragments and before every callback. Once
/// the token fires no further callbacks run, and a stream error raised after
/// that point is treated as the cancellation itself.
pub async fn process_summary_stream<F>(
    mut stream: TokenStream,
    record_ids: &[RecordId],
    delimiter: &str,
    cancel: &CancellationToken,
    mut on_update: F,
) -> Result<StreamOutcome, StreamError>
where
    F: FnMut(SummaryUpdate),
{
    let mut demux = SummaryDemux::new(delimiter, record_ids.len());
    let mut delivered = 0usize;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(delivered, "Summary stream cancelled");
                return Ok(StreamOutcome::Cancelled { summaries: delivered });
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(fragment)) => {
                for (index, summary) in demux.push(&fragment) {
                    if cancel.is_cancelled() {
                        return Ok(StreamOutcome::Cancelled { summaries: delivered });
                    }
                    let Some(&record_id) = record_ids.get(index) else {
                        continue;
                    };
                    on_update(SummaryUpdate { index, record_id, summary });
                    delivered += 1;
                }
            }
            Some(Err(e)) => {
                if cancel.is_cancelled() {
                    return Ok(StreamOutcome::Cancelled { summaries: delivered });
                }
                tracing::warn!(error = %e, delivered, "Summary stream failed");
                return Err(StreamError(format!("{:#}", e)));
            }
            None => break,
        }
    }

    if let Some((index, summary)) = demux.finish() {
        if cancel.is_cancelled() {
            return Ok(StreamOutcome::Cancelled { summaries: delivered });
        }
        if let Some(&record_id) = record_ids.get(index) {
            on_update(SummaryUpdate { index, record_id, summary });
            delivered += 1;
        }
    }

    if delivered < record_ids.len() {
        tracing::warn!(
            delivered,
            expected = record_ids.len(),
            "Summary stream ended before every record was summarised"
        );
    }
    Ok(StreamOutcome::Completed { summaries: delivered })
}
