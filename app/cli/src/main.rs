mod commands;
mod emitter;

use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use commands::{Command, HELP};
use emitter::TerminalEmitter;
use scholar_chat::{
    ChatConfig, ChatEngine, ChatError, ExternalProvider, HttpCatalog, LLMProvider, MessageId,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they never interleave with the transcript on stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = ChatConfig::load().map_err(|e| anyhow!("Invalid configuration: {}", e))?;
    if config.llm.api_key.is_empty() {
        tracing::warn!("No API key configured; set OPENAI_API_KEY or llm.api_key");
    }

    let llm = Arc::new(ExternalProvider::new(&config.llm)?);
    let info = llm.info();
    tracing::info!(provider = %info.name, model = %info.model, "LLM provider ready");
    let catalog = Arc::new(HttpCatalog::new(&config.catalog)?);
    let engine = ChatEngine::new(llm, catalog, config).with_emitter(Arc::new(TerminalEmitter));

    println!("{}\n", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match Command::parse(&line) {
            Command::Empty => {}
            Command::Submit(text) => {
                let engine = engine.clone();
                tokio::spawn(async move {
                    // Failures are already reported through the chat_error event
                    if let Err(e) = engine.submit(&text).await {
                        tracing::debug!(error = %e, "Submission failed");
                    }
                    engine.clear_error();
                });
            }
            Command::More(n) => match record_list(&engine, n) {
                Some(id) => {
                    let engine = engine.clone();
                    tokio::spawn(async move {
                        match engine.load_more(id).await {
                            Ok(Some(0)) => println!("(no more results)"),
                            Ok(Some(_)) => {}
                            Ok(None) => println!("(load more stopped)"),
                            Err(ChatError::Busy(_)) => {
                                println!("(still loading, try again when it finishes)")
                            }
                            Err(e) => tracing::debug!(error = %e, "Load more failed"),
                        }
                        engine.clear_error();
                    });
                }
                None => println!("(no result list to extend)"),
            },
            Command::Stop => {
                let cancelled = engine.abort();
                println!("(stopped {} request(s))", cancelled);
            }
            Command::Clear => engine.reset(),
            Command::Help => println!("{}", HELP),
            Command::Quit => break,
            Command::Unknown(input) => println!("Unknown command: {} (type /help)", input),
        }
    }

    engine.abort();
    Ok(())
}

/// The n-th record-list message (1-based), or the latest one.
fn record_list(engine: &ChatEngine, n: Option<usize>) -> Option<MessageId> {
    let lists: Vec<MessageId> = engine
        .transcript()
        .into_iter()
        .filter(|m| m.is_record_list())
        .map(|m| m.id)
        .collect();
    match n {
        Some(n) => lists.get(n.checked_sub(1)?).copied(),
        None => lists.last().copied(),
    }
}
