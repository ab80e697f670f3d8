pub mod engine;

pub use engine::ChatEngine;

// ============================================================================
// Events
// ============================================================================

pub const EVENT_MESSAGE_APPENDED: &str = "message_appended";
pub const EVENT_RECORDS_APPENDED: &str = "records_appended";
pub const EVENT_RECORD_SUMMARIZED: &str = "record_summarized";
pub const EVENT_MESSAGE_SETTLED: &str = "message_settled";
pub const EVENT_TRANSCRIPT_RESET: &str = "transcript_reset";
pub const EVENT_CHAT_ERROR: &str = "chat_error";

/// Trait for emitting transcript changes to a front-end.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: &str, data: serde_json::Value);
}

/// No-op emitter for front-ends that poll the transcript instead.
pub struct NoopEmitter;
impl EventEmitter for NoopEmitter {
    fn emit(&self, _event: &str, _data: serde_json::Value) {}
}
