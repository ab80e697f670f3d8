//! Prints engine events to the terminal.

use scholar_chat::catalog::NO_PAPERS_FOUND_EXPLANATION;
use scholar_chat::chat::{
    EVENT_CHAT_ERROR, EVENT_MESSAGE_APPENDED, EVENT_RECORDS_APPENDED, EVENT_RECORD_SUMMARIZED,
    EVENT_TRANSCRIPT_RESET,
};
use scholar_chat::{EventEmitter, Message, MessageBody, Record, Sender};

pub struct TerminalEmitter;

impl EventEmitter for TerminalEmitter {
    fn emit(&self, event: &str, data: serde_json::Value) {
        match event {
            EVENT_MESSAGE_APPENDED => match serde_json::from_value::<Message>(data) {
                Ok(message) => print_message(&message),
                Err(e) => tracing::warn!(error = %e, "Unreadable message event"),
            },
            EVENT_RECORDS_APPENDED => {
                let offset = data["offset"].as_u64().unwrap_or_default() as usize;
                let has_more = data["hasMoreResults"].as_bool().unwrap_or(false);
                match serde_json::from_value::<Vec<Record>>(data["records"].clone()) {
                    Ok(records) => print_records(offset, &records, has_more),
                    Err(e) => tracing::warn!(error = %e, "Unreadable records event"),
                }
            }
            EVENT_RECORD_SUMMARIZED => {
                let position = data["position"].as_u64().map(|p| p + 1);
                let summary = data["summary"].as_str().unwrap_or_default();
                match position {
                    Some(position) => println!("  [{}] {}", position, summary),
                    None => println!("  {}", summary),
                }
            }
            EVENT_CHAT_ERROR => {
                let message = data["message"].as_str().unwrap_or_default();
                eprintln!("error: {}", message);
            }
            EVENT_TRANSCRIPT_RESET => println!("(conversation cleared)"),
            _ => {}
        }
    }
}

fn print_message(message: &Message) {
    if message.sender == Sender::User {
        return;
    }
    match &message.body {
        MessageBody::Text(text) => println!("\n{}\n", text),
        MessageBody::Records(records) if records.is_empty() => {
            println!("\n{}\n", NO_PAPERS_FOUND_EXPLANATION)
        }
        MessageBody::Records(records) => print_records(0, records, message.has_more_results()),
    }
}

/// Records numbered from `offset + 1`, matching summary positions.
fn print_records(offset: usize, records: &[Record], has_more: bool) {
    println!();
    for (i, record) in records.iter().enumerate() {
        println!("{}", describe_record(offset + i + 1, record));
    }
    if has_more {
        println!("  (more results available, type /more)");
    }
    println!();
}

fn describe_record(position: usize, record: &Record) -> String {
    let access = if record.is_open_access { ", open access" } else { "" };
    let mut line = format!(
        "[{}] {} ({}, {} citations{})",
        position, record.title, record.date, record.citations, access
    );
    if let Some(link) = &record.link {
        line.push_str("\n    ");
        line.push_str(link);
    }
    line
}
