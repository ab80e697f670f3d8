use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Stable identity of a record within its message, assigned when the record
/// is appended and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// One catalog item attached to a bot message, in display-ready shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: RecordId,
    pub title: String,
    pub link: Option<String>,
    pub date: String,
    pub citations: u64,
    pub is_open_access: bool,
    pub summary: String,
    /// True until the summary is finalized or the stream ends/aborts.
    pub loading: bool,
}

/// Where a record-list message came from and whether it can grow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryContext {
    pub request_url: String,
    pub current_page: u32,
    pub has_more_results: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum MessageBody {
    Text(String),
    Records(Vec<Record>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender: Sender,
    pub body: MessageBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<QueryContext>,
    pub streaming: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            sender: Sender::User,
            body: MessageBody::Text(text.into()),
            query: None,
            streaming: false,
            created_at: Utc::now(),
        }
    }

    pub fn bot_text(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            sender: Sender::Bot,
            body: MessageBody::Text(text.into()),
            query: None,
            streaming: false,
            created_at: Utc::now(),
        }
    }

    /// A record-list bot message that starts out streaming.
    pub fn bot_records(records: Vec<Record>, query: QueryContext) -> Self {
        Self {
            id: MessageId::new(),
            sender: Sender::Bot,
            body: MessageBody::Records(records),
            query: Some(query),
            streaming: true,
            created_at: Utc::now(),
        }
    }

    pub fn records(&self) -> &[Record] {
        match &self.body {
            MessageBody::Records(records) => records,
            MessageBody::Text(_) => &[],
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text(text) => Some(text),
            MessageBody::Records(_) => None,
        }
    }

    pub fn is_record_list(&self) -> bool {
        matches!(self.body, MessageBody::Records(_))
    }

    pub fn has_more_results(&self) -> bool {
        self.query.as_ref().map(|q| q.has_more_results).unwrap_or(false)
    }

    /// A settled record-list message whose search found nothing.
    pub fn is_empty_result(&self) -> bool {
        matches!(&self.body, MessageBody::Records(records) if records.is_empty()) && !self.streaming
    }

    /// Appends records after the existing ones. Text bodies are left untouched.
    pub fn with_records_appended(&self, new_records: &[Record]) -> Self {
        let mut next = self.clone();
        if let MessageBody::Records(records) = &mut next.body {
            records.extend_from_slice(new_records);
        }
        next
    }

    /// Finalizes the summary of one record.
    pub fn with_summary(&self, record_id: RecordId, summary: &str) -> Self {
        let mut next = self.clone();
        if let MessageBody::Records(records) = &mut next.body {
            if let Some(record) = records.iter_mut().find(|r| r.id == record_id) {
                record.summary = summary.to_string();
                record.loading = false;
            }
        }
        next
    }

    pub fn with_query(&self, query: QueryContext) -> Self {
        let mut next = self.clone();
        if next.sender == Sender::Bot && next.is_record_list() {
            next.query = Some(query);
        }
        next
    }

    pub fn with_streaming(&self, streaming: bool) -> Self {
        let mut next = self.clone();
        next.streaming = streaming && next.sender == Sender::Bot;
        next
    }

    /// Not streaming, and no record left waiting on a summary.
    pub fn settled(&self) -> Self {
        let mut next = self.clone();
        next.streaming = false;
        if let MessageBody::Records(records) = &mut next.body {
            for record in records.iter_mut() {
                record.loading = false;
            }
        }
        next
    }

    pub fn is_settled(&self) -> bool {
        !self.streaming && self.records().iter().all(|r| !r.loading)
    }
}
