//! Poll lifecycle: the single current-poll slot and its creation gate
//!
//! The slot moves `Empty -> Active -> Ended -> Empty`. A new poll may replace
//! whatever the slot holds only once every currently registered respondent
//! has answered it; the respondent list is passed in on every call because
//! it changes underneath the poll and must never be cached here.

use crate::error::SessionError;
use crate::poll::Poll;
use log::info;
use shared::{ConnectionId, PollId, PollSpec};

pub const CREATION_DENIED_REASON: &str =
    "Cannot create a new poll until all respondents have answered the current poll.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Active,
    Ended,
}

#[derive(Debug)]
pub struct PollLifecycle {
    current: Option<Poll>,
    next_id: u64,
}

impl Default for PollLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl PollLifecycle {
    pub fn new() -> Self {
        Self {
            current: None,
            next_id: 1,
        }
    }

    pub fn state(&self) -> SlotState {
        match &self.current {
            None => SlotState::Empty,
            Some(poll) if poll.is_active() => SlotState::Active,
            Some(_) => SlotState::Ended,
        }
    }

    pub fn current(&self) -> Option<&Poll> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut Poll> {
        self.current.as_mut()
    }

    /// The current poll, if it still accepts responses
    pub fn active(&self) -> Option<&Poll> {
        self.current.as_ref().filter(|poll| poll.is_active())
    }

    /// Whether a new poll may be created right now
    pub fn check_gate(&self, respondents: &[ConnectionId]) -> Result<(), SessionError> {
        match &self.current {
            None => Ok(()),
            Some(poll) if poll.all_answered(respondents) => Ok(()),
            Some(_) => Err(SessionError::PollCreationDenied(
                CREATION_DENIED_REASON.to_string(),
            )),
        }
    }

    /// Opens a new poll, replacing a fully answered or ended one
    ///
    /// Returns the poll it replaced. A replaced poll that was still active is
    /// ended at `now`, so at most one poll is ever active.
    pub fn create(
        &mut self,
        spec: PollSpec,
        respondents: &[ConnectionId],
        now: u64,
    ) -> Result<Option<Poll>, SessionError> {
        spec.validate()?;
        self.check_gate(respondents)?;

        let id = PollId(self.next_id);
        self.next_id += 1;
        info!("Poll {} opened: '{}'", id, spec.question);

        let mut replaced = self.current.replace(Poll::new(id, spec, now));
        if let Some(poll) = replaced.as_mut().filter(|poll| poll.is_active()) {
            poll.end(now);
            info!("Poll {} closed by {}", poll.id, id);
        }
        Ok(replaced)
    }

    /// Ends the active poll; it stays readable in the slot until cleared
    pub fn end(&mut self, now: u64) -> Result<&Poll, SessionError> {
        match self.current.as_mut() {
            None => Err(SessionError::NoActivePoll),
            Some(poll) if !poll.is_active() => Err(SessionError::PollEnded),
            Some(poll) => {
                poll.end(now);
                info!(
                    "Poll {} ended with {} responses",
                    poll.id,
                    poll.response_count()
                );
                Ok(&*poll)
            }
        }
    }

    pub fn clear(&mut self) -> Option<Poll> {
        self.current.take()
    }

    /// Clears an ended poll once every remaining respondent has answered it
    ///
    /// Returns true when the slot was cleared.
    pub fn settle(&mut self, respondents: &[ConnectionId]) -> bool {
        let settled = matches!(
            &self.current,
            Some(poll) if !poll.is_active() && poll.all_answered(respondents)
        );
        if settled {
            if let Some(poll) = self.current.take() {
                info!("Poll {} cleared", poll.id);
            }
        }
        settled
    }
}
