//! Local view of the polling session as seen by one terminal client
//!
//! The server is authoritative; this state only mirrors what it has been
//! told so the user can see the current poll, its countdown and who is in
//! the room. The countdown is advisory: it is reset only by `NewPoll` and
//! ticks down locally once per second.
//!
//! History arrives in pages; it is replaced only once a full page set of
//! one revision is in.

use crate::commands::{AnswerChoice, CommandError};
use shared::{ChatMessage, ConnectionId, Packet, ParticipantView, PollSnapshot, Role};
use std::collections::BTreeMap;

/// What changed after applying a server packet
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Connected(ConnectionId),
    Welcome(String),
    Participants,
    NewPoll,
    PollUpdated,
    PollEnded,
    AllAnswered,
    CreationDenied(String),
    RegistrationRejected(String),
    History,
    Message(ChatMessage),
    Kicked(String),
    Disconnected(String),
    Ignored,
}

#[derive(Debug)]
pub struct SessionView {
    pub role: Role,
    pub name: String,
    pub connection_id: Option<ConnectionId>,
    pub current_poll: Option<PollSnapshot>,
    pub remaining_secs: u32,
    pub is_submitted: bool,
    pub all_answered: bool,
    pub participants: Vec<ParticipantView>,
    pub history: Vec<PollSnapshot>,
    history_revision: Option<u64>,
    pending_revision: u64,
    pending_pages: BTreeMap<u32, Vec<PollSnapshot>>,
}

impl SessionView {
    pub fn new(role: Role, name: impl Into<String>) -> Self {
        Self {
            role,
            name: name.into(),
            connection_id: None,
            current_poll: None,
            remaining_secs: 0,
            is_submitted: false,
            all_answered: false,
            participants: Vec::new(),
            history: Vec::new(),
            history_revision: None,
            pending_revision: 0,
            pending_pages: BTreeMap::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection_id.is_some()
    }

    /// Folds one server packet into the view
    pub fn apply(&mut self, packet: Packet) -> Update {
        match packet {
            Packet::Connected { connection_id } => {
                self.connection_id = Some(connection_id);
                // Revisions restart when the server does
                self.history_revision = None;
                self.pending_pages.clear();
                Update::Connected(connection_id)
            }
            Packet::Welcome { message } => Update::Welcome(message),
            Packet::ParticipantUpdate { participants } => {
                self.participants = participants;
                Update::Participants
            }
            Packet::NewPoll {
                poll,
                initial_timer,
                is_submitted,
            } => {
                self.current_poll = Some(poll);
                self.remaining_secs = initial_timer;
                self.is_submitted = is_submitted;
                self.all_answered = false;
                Update::NewPoll
            }
            Packet::PersonalPollUpdate { poll, is_submitted } => {
                self.is_submitted = is_submitted;
                self.replace_poll(poll)
            }
            Packet::PresenterPollUpdate { poll } => self.replace_poll(poll),
            Packet::PollEnded { poll } => {
                self.current_poll = Some(poll);
                self.remaining_secs = 0;
                Update::PollEnded
            }
            Packet::AllAnswered { poll } => {
                self.all_answered = true;
                self.replace_poll(poll);
                Update::AllAnswered
            }
            Packet::PollCreationDenied { reason } => Update::CreationDenied(reason),
            Packet::RegistrationRejected { reason } => Update::RegistrationRejected(reason),
            Packet::PollHistory {
                revision,
                part,
                total,
                polls,
            } => self.apply_history_page(revision, part, total, polls),
            Packet::NewMessage { message } => Update::Message(message),
            Packet::Kicked { reason } => {
                self.connection_id = None;
                Update::Kicked(reason)
            }
            Packet::Disconnected { reason } => {
                self.connection_id = None;
                Update::Disconnected(reason)
            }
            _ => Update::Ignored,
        }
    }

    /// Updates results only when the packet is about the poll on screen
    fn replace_poll(&mut self, poll: PollSnapshot) -> Update {
        match &self.current_poll {
            Some(current) if current.id == poll.id => {
                self.current_poll = Some(poll);
                Update::PollUpdated
            }
            _ => Update::Ignored,
        }
    }

    fn apply_history_page(
        &mut self,
        revision: u64,
        part: u32,
        total: u32,
        polls: Vec<PollSnapshot>,
    ) -> Update {
        if self.history_revision.map_or(false, |applied| revision < applied) {
            return Update::Ignored;
        }
        if revision != self.pending_revision {
            self.pending_pages.clear();
            self.pending_revision = revision;
        }
        self.pending_pages.insert(part, polls);
        if (self.pending_pages.len() as u32) < total {
            return Update::Ignored;
        }

        let pages = std::mem::take(&mut self.pending_pages);
        self.history = pages.into_values().flatten().collect();
        self.history_revision = Some(revision);
        Update::History
    }

    /// Advances the countdown by one second.
    ///
    /// Returns true on the tick that reaches zero.
    pub fn tick(&mut self) -> bool {
        let running = self
            .current_poll
            .as_ref()
            .map_or(false, PollSnapshot::is_active);
        if !running || self.remaining_secs == 0 {
            return false;
        }
        self.remaining_secs -= 1;
        self.remaining_secs == 0
    }

    /// Turns an `/answer` choice into the option text to submit
    pub fn resolve_answer(&self, choice: &AnswerChoice) -> Result<String, CommandError> {
        let poll = self
            .current_poll
            .as_ref()
            .filter(|poll| poll.is_active())
            .ok_or(CommandError::NoPoll)?;

        match choice {
            AnswerChoice::Index(index) => index
                .checked_sub(1)
                .and_then(|i| poll.options.get(i))
                .cloned()
                .ok_or(CommandError::OptionOutOfRange(*index)),
            AnswerChoice::Text(text) => Ok(text.clone()),
        }
    }
}
