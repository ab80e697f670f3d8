/// Splits one continuous model output into per-record summaries.
///
/// Summaries arrive in record order separated by a literal delimiter. A
/// fragment may end in the middle of a delimiter, so anything after the last
/// complete delimiter stays buffered until more text arrives or the stream
/// ends.
#[derive(Debug)]
pub struct SummaryDemux {
    delimiter: String,
    buffer: String,
    next_index: usize,
    expected: usize,
}

impl SummaryDemux {
    pub fn new(delimiter: impl Into<String>, expected: usize) -> Self {
        Self {
            delimiter: delimiter.into(),
            buffer: String::new(),
            next_index: 0,
            expected,
        }
    }

    /// Feed one fragment; returns every summary it completed as
    /// `(record index, trimmed summary)`.
    pub fn push(&mut self, fragment: &str) -> Vec<(usize, String)> {
        self.buffer.push_str(fragment);

        let mut completed = Vec::new();
        while let Some(pos) = self.buffer.find(self.delimiter.as_str()) {
            let summary = self.buffer[..pos].trim().to_string();
            self.buffer.drain(..pos + self.delimiter.len());

            // Splits beyond the last record have nowhere to go.
            if self.next_index < self.expected {
                completed.push((self.next_index, summary));
                self.next_index += 1;
            }
        }
        completed
    }

    /// Flush the tail left after the stream ended, if it holds text and a
    /// record is still waiting for it.
    pub fn finish(&mut self) -> Option<(usize, String)> {
        let tail = std::mem::take(&mut self.buffer);
        let tail = tail.trim();
        if tail.is_empty() || self.next_index >= self.expected {
            return None;
        }
        let index = self.next_index;
        self.next_index += 1;
        Some((index, tail.to_string()))
    }

    pub fn completed(&self) -> usize {
        self.next_index
    }
}
