//! Parsing of terminal input lines into client commands

use shared::{ConnectionId, PollSpec, PollSpecError};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '/{0}'")]
    UnknownCommand(String),
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("'{0}' is not a number of seconds")]
    InvalidTimer(String),
    #[error("'{0}' is not a participant id")]
    InvalidTarget(String),
    #[error(transparent)]
    InvalidPoll(#[from] PollSpecError),
    #[error("there is no poll to answer")]
    NoPoll,
    #[error("the poll has no option {0}")]
    OptionOutOfRange(usize),
}

/// What the user picked in `/answer`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerChoice {
    /// 1-based option number
    Index(usize),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreatePoll(PollSpec),
    Answer(AnswerChoice),
    EndPoll,
    Kick(ConnectionId),
    History,
    Who,
    Quit,
    Chat(String),
}

/// Parses one input line. Blank lines yield `Ok(None)`.
///
/// Poll syntax: `/poll <secs> <question> | <opt> | *<opt> ...` where a
/// leading `*` marks a correct option.
pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    if let Ok(index) = line.parse::<usize>() {
        return Ok(Some(Command::Answer(AnswerChoice::Index(index))));
    }

    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Chat(line.to_string())));
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    let command = match name {
        "poll" => Command::CreatePoll(parse_poll(args)?),
        "answer" | "a" => {
            if args.is_empty() {
                return Err(CommandError::MissingArgument("option"));
            }
            match args.parse::<usize>() {
                Ok(index) => Command::Answer(AnswerChoice::Index(index)),
                Err(_) => Command::Answer(AnswerChoice::Text(args.to_string())),
            }
        }
        "end" => Command::EndPoll,
        "kick" => {
            if args.is_empty() {
                return Err(CommandError::MissingArgument("participant id"));
            }
            let id = args
                .trim_start_matches('#')
                .parse::<u32>()
                .map_err(|_| CommandError::InvalidTarget(args.to_string()))?;
            Command::Kick(ConnectionId(id))
        }
        "history" => Command::History,
        "who" => Command::Who,
        "quit" | "exit" => Command::Quit,
        other => return Err(CommandError::UnknownCommand(other.to_string())),
    };

    Ok(Some(command))
}

fn parse_poll(args: &str) -> Result<PollSpec, CommandError> {
    let (secs, rest) = args
        .split_once(char::is_whitespace)
        .ok_or(CommandError::MissingArgument("question"))?;
    let timer_secs = secs
        .parse::<u32>()
        .map_err(|_| CommandError::InvalidTimer(secs.to_string()))?;

    let mut parts = rest.split('|').map(str::trim);
    let question = parts.next().unwrap_or_default();

    let mut options = Vec::new();
    let mut correct = Vec::new();
    for part in parts {
        match part.strip_prefix('*') {
            Some(option) => {
                let option = option.trim();
                options.push(option.to_string());
                correct.push(option.to_string());
            }
            None => options.push(part.to_string()),
        }
    }

    let spec = PollSpec::new(question, options, correct, timer_secs);
    spec.validate()?;
    Ok(spec)
}
