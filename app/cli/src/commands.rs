//! Input line parsing.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Free text for the engine.
    Submit(String),
    /// Load the next page of a record list: `/more` targets the latest one,
    /// `/more 2` the second result list in the transcript.
    More(Option<usize>),
    Stop,
    Clear,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        if !line.starts_with('/') {
            return Command::Submit(line.to_string());
        }

        let mut parts = line.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let arg = parts.next();
        match name {
            "/more" => match arg.map(str::parse::<usize>) {
                None => Command::More(None),
                Some(Ok(n)) if n > 0 => Command::More(Some(n)),
                Some(_) => Command::Unknown(line.to_string()),
            },
            "/stop" => Command::Stop,
            "/clear" => Command::Clear,
            "/help" => Command::Help,
            "/quit" | "/exit" => Command::Quit,
            _ => Command::Unknown(line.to_string()),
        }
    }
}

pub const HELP: &str = "\
Type a request such as: open access papers on protein folding since 2020
  /more [n]  load the next page of the latest (or n-th) result list
  /stop      stop everything in flight
  /clear     clear the conversation
  /quit      exit";
