//! Streaming response handling for LLM generation

use anyhow::Result;
use tokio::sync::mpsc;

/// Ordered, finite sequence of text fragments from one model run.
///
/// A transport failure mid-stream arrives as an `Err` item; the stream ends
/// when the sending side is dropped.
pub struct TokenStream {
    receiver: mpsc::Receiver<Result<String>>,
}

impl TokenStream {
    pub fn new(receiver: mpsc::Receiver<Result<String>>) -> Self {
        Self { receiver }
    }

    /// Build a stream that yields the given fragments and then ends.
    pub fn from_fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fragments: Vec<String> = fragments.into_iter().map(Into::into).collect();
        let (tx, rx) = mpsc::channel(fragments.len().max(1));
        for fragment in fragments {
            // Capacity covers every fragment, so this never fails.
            let _ = tx.try_send(Ok(fragment));
        }
        Self::new(rx)
    }

    /// Get next fragment
    pub async fn next(&mut self) -> Option<Result<String>> {
        self.receiver.recv().await
    }
}
