//! Wire protocol and data model shared by the poll server and its clients.
//!
//! Every logical event travelling in either direction is a variant of
//! [`Packet`], encoded with `bincode` into a single UDP datagram. The poll
//! types here are the read-only snapshots the server hands out; the mutable
//! entities live server-side.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use thiserror::Error;

pub const PROTOCOL_VERSION: u32 = 1;
/// Largest payload a single UDP datagram can carry over IPv4.
pub const MAX_PACKET_SIZE: usize = 65_507;
/// Serialized size one page of poll history may fill, leaving room for the
/// packet envelope.
pub const HISTORY_PAGE_BUDGET: usize = MAX_PACKET_SIZE - 1_024;

pub const MAX_QUESTION_LEN: usize = 100;
pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 6;
/// Countdown lengths a presenter may pick, in seconds.
pub const TIMER_CHOICES: [u32; 6] = [15, 30, 45, 60, 90, 120];
pub const DEFAULT_TIMER_SECS: u32 = 60;

/// Volatile transport handle; a reconnecting client gets a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies one poll instance for the lifetime of the server process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PollId(pub u64);

impl fmt::Display for PollId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "poll-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Presenter,
    Respondent,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Presenter => write!(f, "presenter"),
            Role::Respondent => write!(f, "respondent"),
        }
    }
}

/// A registered participant as shown in participant lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantView {
    pub connection_id: ConnectionId,
    pub name: String,
    pub role: Role,
}

/// Reasons a poll definition is rejected before it reaches the lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollSpecError {
    #[error("question must not be empty")]
    EmptyQuestion,
    #[error("question is {len} characters long, the limit is 100")]
    QuestionTooLong { len: usize },
    #[error("a poll needs between 2 and 6 options, got {0}")]
    OptionCount(usize),
    #[error("option {0} is empty")]
    EmptyOption(usize),
    #[error("option \"{0}\" appears more than once")]
    DuplicateOption(String),
    #[error("at least one option must be marked correct")]
    NoCorrectOption,
    #[error("correct answer \"{0}\" is not one of the options")]
    UnknownCorrectOption(String),
    #[error("a {0} second timer is not offered")]
    UnsupportedTimer(u32),
}

/// What a presenter submits to open a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSpec {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answers: Vec<String>,
    pub timer_secs: u32,
}

impl PollSpec {
    pub fn new<Q, O, C>(question: Q, options: O, correct_answers: C, timer_secs: u32) -> Self
    where
        Q: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            question: question.into(),
            options: options.into_iter().map(Into::into).collect(),
            correct_answers: correct_answers.into_iter().map(Into::into).collect(),
            timer_secs,
        }
    }

    /// Checks every field against the authoring rules.
    ///
    /// Option texts are compared verbatim; callers are expected to trim
    /// user input before building a `PollSpec`.
    pub fn validate(&self) -> Result<(), PollSpecError> {
        let question = self.question.trim();
        if question.is_empty() {
            return Err(PollSpecError::EmptyQuestion);
        }
        let len = question.chars().count();
        if len > MAX_QUESTION_LEN {
            return Err(PollSpecError::QuestionTooLong { len });
        }

        if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&self.options.len()) {
            return Err(PollSpecError::OptionCount(self.options.len()));
        }

        let mut seen = HashSet::new();
        for (index, option) in self.options.iter().enumerate() {
            if option.trim().is_empty() {
                return Err(PollSpecError::EmptyOption(index + 1));
            }
            if !seen.insert(option.as_str()) {
                return Err(PollSpecError::DuplicateOption(option.clone()));
            }
        }

        if self.correct_answers.is_empty() {
            return Err(PollSpecError::NoCorrectOption);
        }
        if let Some(unknown) = self
            .correct_answers
            .iter()
            .find(|answer| !seen.contains(answer.as_str()))
        {
            return Err(PollSpecError::UnknownCorrectOption(unknown.clone()));
        }

        if !TIMER_CHOICES.contains(&self.timer_secs) {
            return Err(PollSpecError::UnsupportedTimer(self.timer_secs));
        }

        Ok(())
    }

    pub fn is_correct(&self, option: &str) -> bool {
        self.correct_answers.iter().any(|answer| answer == option)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollState {
    Active,
    Ended,
}

/// Live tally for one option, aligned with the poll's option order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionResult {
    pub option: String,
    pub count: u32,
    pub percentage: f64,
}

/// Share of `count` in `total` as a percentage rounded to one decimal.
///
/// Returns 0 when there are no responses at all.
pub fn round_percentage(count: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = count as f64 / total as f64 * 100.0;
    (raw * 10.0).round() / 10.0
}

/// Counts responses per option.
///
/// Responses naming an option that is not in `options` are not counted;
/// the server never records those, so the counts always add up to the
/// number of responses.
pub fn tally<'a, I>(options: &[String], responses: I) -> Vec<OptionResult>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut counts: HashMap<&str, u32> = options.iter().map(|o| (o.as_str(), 0)).collect();
    let mut total = 0u32;
    for response in responses {
        if let Some(count) = counts.get_mut(response.as_str()) {
            *count += 1;
            total += 1;
        }
    }

    options
        .iter()
        .map(|option| {
            let count = counts.get(option.as_str()).copied().unwrap_or(0);
            OptionResult {
                option: option.clone(),
                count,
                percentage: round_percentage(count, total),
            }
        })
        .collect()
}

/// Read-only view of a poll instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollSnapshot {
    pub id: PollId,
    pub question: String,
    pub options: Vec<String>,
    pub correct_answers: Vec<String>,
    pub timer_secs: u32,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    pub ended_at: Option<u64>,
    pub state: PollState,
    pub responses: BTreeMap<ConnectionId, String>,
    pub results: Vec<OptionResult>,
}

impl PollSnapshot {
    pub fn is_active(&self) -> bool {
        self.state == PollState::Active
    }

    /// Number of counted responses; also correct for a [`summary`](Self::summary).
    pub fn total_responses(&self) -> usize {
        self.results.iter().map(|r| r.count as usize).sum()
    }

    /// Copy without the per-connection responses, as kept in history pages
    pub fn summary(&self) -> PollSnapshot {
        PollSnapshot {
            responses: BTreeMap::new(),
            ..self.clone()
        }
    }

    /// Whole seconds left on the advisory countdown at `now` (ms).
    pub fn remaining_secs(&self, now: u64) -> u32 {
        let elapsed_secs = now.saturating_sub(self.created_at) / 1000;
        (self.timer_secs as u64).saturating_sub(elapsed_secs) as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: String,
    pub text: String,
    pub timestamp: u64,
    pub connection_id: ConnectionId,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    // Client to server
    Connect {
        client_version: u32,
    },
    Heartbeat,
    Disconnect,
    Register {
        role: Role,
        name: String,
    },
    CreatePoll(PollSpec),
    SubmitAnswer {
        option: String,
    },
    EndPoll,
    KickParticipant {
        target: ConnectionId,
    },
    GetPollHistory,
    SendMessage {
        sender: String,
        text: String,
    },

    // Server to client
    Connected {
        connection_id: ConnectionId,
    },
    Welcome {
        message: String,
    },
    Disconnected {
        reason: String,
    },
    ParticipantUpdate {
        participants: Vec<ParticipantView>,
    },
    NewPoll {
        poll: PollSnapshot,
        initial_timer: u32,
        is_submitted: bool,
    },
    PersonalPollUpdate {
        poll: PollSnapshot,
        is_submitted: bool,
    },
    PresenterPollUpdate {
        poll: PollSnapshot,
    },
    PollEnded {
        poll: PollSnapshot,
    },
    PollCreationDenied {
        reason: String,
    },
    RegistrationRejected {
        reason: String,
    },
    AllAnswered {
        poll: PollSnapshot,
    },
    /// One page of the history log; a client replaces its history once all
    /// `total` pages of the same `revision` have arrived.
    PollHistory {
        revision: u64,
        part: u32,
        total: u32,
        polls: Vec<PollSnapshot>,
    },
    Kicked {
        reason: String,
    },
    NewMessage {
        message: ChatMessage,
    },
}

impl Packet {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Connect { .. } => "connect",
            Packet::Heartbeat => "heartbeat",
            Packet::Disconnect => "disconnect",
            Packet::Register { .. } => "register",
            Packet::CreatePoll(_) => "create-poll",
            Packet::SubmitAnswer { .. } => "submit-answer",
            Packet::EndPoll => "end-poll",
            Packet::KickParticipant { .. } => "kick-participant",
            Packet::GetPollHistory => "get-poll-history",
            Packet::SendMessage { .. } => "send-message",
            Packet::Connected { .. } => "connected",
            Packet::Welcome { .. } => "welcome",
            Packet::Disconnected { .. } => "disconnected",
            Packet::ParticipantUpdate { .. } => "participant-update",
            Packet::NewPoll { .. } => "new-poll",
            Packet::PersonalPollUpdate { .. } => "personal-poll-update",
            Packet::PresenterPollUpdate { .. } => "presenter-poll-update",
            Packet::PollEnded { .. } => "poll-ended",
            Packet::PollCreationDenied { .. } => "poll-creation-denied",
            Packet::RegistrationRejected { .. } => "registration-rejected",
            Packet::AllAnswered { .. } => "all-answered",
            Packet::PollHistory { .. } => "poll-history",
            Packet::Kicked { .. } => "kicked",
            Packet::NewMessage { .. } => "new-message",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn spec() -> PollSpec {
        PollSpec::new("Capital of France?", ["Paris", "Lyon", "Nice"], ["Paris"], 60)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_valid_spec() {
        assert_eq!(spec().validate(), Ok(()));
        assert!(spec().is_correct("Paris"));
        assert!(!spec().is_correct("Nice"));
    }

    #[test]
    fn test_question_rules() {
        let mut s = spec();
        s.question = "   ".to_string();
        assert_eq!(s.validate(), Err(PollSpecError::EmptyQuestion));

        s.question = "q".repeat(MAX_QUESTION_LEN);
        assert_eq!(s.validate(), Ok(()));

        s.question = "q".repeat(MAX_QUESTION_LEN + 1);
        assert_eq!(
            s.validate(),
            Err(PollSpecError::QuestionTooLong { len: MAX_QUESTION_LEN + 1 })
        );
    }

    #[test]
    fn test_option_bounds() {
        let mut s = spec();
        s.options = strings(&["Paris"]);
        assert_eq!(s.validate(), Err(PollSpecError::OptionCount(1)));

        s.options = strings(&["Paris", "a", "b", "c", "d", "e", "f"]);
        assert_eq!(s.validate(), Err(PollSpecError::OptionCount(7)));

        s.options = strings(&["Paris", "a", "b", "c", "d", "e"]);
        assert_eq!(s.validate(), Ok(()));
    }

    #[test]
    fn test_option_contents() {
        let mut s = spec();
        s.options = strings(&["Paris", " "]);
        assert_eq!(s.validate(), Err(PollSpecError::EmptyOption(2)));

        s.options = strings(&["Paris", "Paris"]);
        assert_eq!(
            s.validate(),
            Err(PollSpecError::DuplicateOption("Paris".to_string()))
        );
    }

    #[test]
    fn test_correct_answers() {
        let mut s = spec();
        s.correct_answers.clear();
        assert_eq!(s.validate(), Err(PollSpecError::NoCorrectOption));

        s.correct_answers = strings(&["Berlin"]);
        assert_eq!(
            s.validate(),
            Err(PollSpecError::UnknownCorrectOption("Berlin".to_string()))
        );
    }

    #[test]
    fn test_timer_choices() {
        let mut s = spec();
        for secs in TIMER_CHOICES {
            s.timer_secs = secs;
            assert!(s.validate().is_ok());
        }
        s.timer_secs = 10;
        assert_eq!(s.validate(), Err(PollSpecError::UnsupportedTimer(10)));
    }

    #[test]
    fn test_round_percentage() {
        assert_eq!(round_percentage(0, 0), 0.0);
        assert_eq!(round_percentage(1, 2), 50.0);
        assert_approx_eq!(round_percentage(1, 3), 33.3, 1e-9);
        assert_approx_eq!(round_percentage(2, 3), 66.7, 1e-9);
        assert_eq!(round_percentage(3, 3), 100.0);
    }

    #[test]
    fn test_tally_counts_sum_to_responses() {
        let options = strings(&["x", "y", "z"]);
        let responses = strings(&["x", "y", "x", "x"]);
        let results = tally(&options, &responses);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].option, "x");
        assert_eq!(results[0].count, 3);
        assert_eq!(results[1].count, 1);
        assert_eq!(results[2].count, 0);
        assert_eq!(results.iter().map(|r| r.count).sum::<u32>(), 4);
        assert_approx_eq!(results[0].percentage, 75.0, 1e-9);
        assert_approx_eq!(results[1].percentage, 25.0, 1e-9);
        assert_eq!(results[2].percentage, 0.0);
    }

    #[test]
    fn test_tally_without_responses() {
        let options = strings(&["x", "y"]);
        let results = tally(&options, std::iter::empty());
        assert!(results.iter().all(|r| r.count == 0 && r.percentage == 0.0));
    }

    #[test]
    fn test_remaining_secs() {
        let poll = PollSnapshot {
            id: PollId(1),
            question: "q".to_string(),
            options: strings(&["x", "y"]),
            correct_answers: strings(&["x"]),
            timer_secs: 30,
            created_at: 10_000,
            ended_at: None,
            state: PollState::Active,
            responses: BTreeMap::new(),
            results: Vec::new(),
        };

        assert_eq!(poll.remaining_secs(10_000), 30);
        assert_eq!(poll.remaining_secs(12_999), 28);
        assert_eq!(poll.remaining_secs(40_000), 0);
        assert_eq!(poll.remaining_secs(99_000), 0);
        // A clock that went backwards reports the full timer.
        assert_eq!(poll.remaining_secs(5_000), 30);
    }

    #[test]
    fn test_summary_keeps_counts_without_responses() {
        let mut responses = BTreeMap::new();
        responses.insert(ConnectionId(1), "x".to_string());
        responses.insert(ConnectionId(2), "x".to_string());
        responses.insert(ConnectionId(3), "y".to_string());
        let options = strings(&["x", "y"]);
        let results = tally(&options, responses.values());
        let poll = PollSnapshot {
            id: PollId(3),
            question: "q".to_string(),
            options,
            correct_answers: strings(&["x"]),
            timer_secs: 30,
            created_at: 0,
            ended_at: Some(5_000),
            state: PollState::Ended,
            responses,
            results,
        };

        let summary = poll.summary();
        assert!(summary.responses.is_empty());
        assert_eq!(summary.results, poll.results);
        assert_eq!(summary.total_responses(), 3);
        assert_eq!(poll.total_responses(), 3);
        assert!(
            bincode::serialized_size(&summary).unwrap() < bincode::serialized_size(&poll).unwrap()
        );
    }

    #[test]
    fn test_packet_serialization_new_poll() {
        let mut responses = BTreeMap::new();
        responses.insert(ConnectionId(4), "x".to_string());
        let options = strings(&["x", "y"]);
        let results = tally(&options, responses.values());

        let packet = Packet::NewPoll {
            poll: PollSnapshot {
                id: PollId(7),
                question: "q".to_string(),
                options,
                correct_answers: strings(&["y"]),
                timer_secs: 45,
                created_at: 123,
                ended_at: None,
                state: PollState::Active,
                responses,
                results,
            },
            initial_timer: 40,
            is_submitted: true,
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::NewPoll {
                poll,
                initial_timer,
                is_submitted,
            } => {
                assert_eq!(poll.id, PollId(7));
                assert_eq!(poll.responses.get(&ConnectionId(4)), Some(&"x".to_string()));
                assert_eq!(poll.results[0].count, 1);
                assert_eq!(initial_timer, 40);
                assert!(is_submitted);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(ConnectionId(3).to_string(), "#3");
        assert_eq!(PollId(9).to_string(), "poll-9");
        assert_eq!(Role::Respondent.to_string(), "respondent");
        assert_eq!(Packet::EndPoll.kind(), "end-poll");
    }
}
