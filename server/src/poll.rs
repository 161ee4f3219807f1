//! The poll entity: question, options, responses and live results.

use crate::error::SessionError;
use shared::{tally, ConnectionId, OptionResult, PollId, PollSnapshot, PollSpec, PollState};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct Poll {
    pub id: PollId,
    pub spec: PollSpec,
    pub created_at: u64,
    pub ended_at: Option<u64>,
    pub state: PollState,
    responses: BTreeMap<ConnectionId, String>,
    results: Vec<OptionResult>,
}

impl Poll {
    pub fn new(id: PollId, spec: PollSpec, created_at: u64) -> Self {
        let results = tally(&spec.options, std::iter::empty());
        Self {
            id,
            spec,
            created_at,
            ended_at: None,
            state: PollState::Active,
            responses: BTreeMap::new(),
            results,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == PollState::Active
    }

    /// Records one answer for `connection_id`.
    ///
    /// A connection answers at most once per poll; answers can be neither
    /// changed nor withdrawn.
    pub fn record_response(
        &mut self,
        connection_id: ConnectionId,
        option: &str,
    ) -> Result<(), SessionError> {
        if !self.is_active() {
            return Err(SessionError::PollEnded);
        }
        if !self.spec.options.iter().any(|o| o == option) {
            return Err(SessionError::InvalidOption(option.to_string()));
        }
        if self.responses.contains_key(&connection_id) {
            return Err(SessionError::DuplicateSubmission(connection_id));
        }

        self.responses.insert(connection_id, option.to_string());
        self.recompute_results();
        Ok(())
    }

    /// Moves the response recorded under `from` to `to`.
    ///
    /// Returns false when `from` never answered. An answer already stored
    /// under `to` wins over the moved one so the total never grows.
    pub fn rekey_response(&mut self, from: ConnectionId, to: ConnectionId) -> bool {
        let Some(option) = self.responses.remove(&from) else {
            return false;
        };
        self.responses.entry(to).or_insert(option);
        self.recompute_results();
        true
    }

    /// Drops the response recorded under `connection_id`.
    ///
    /// Used when the connection stops speaking for the respondent who gave
    /// the answer; respondents themselves cannot withdraw.
    pub fn withdraw_response(&mut self, connection_id: ConnectionId) -> Option<String> {
        let option = self.responses.remove(&connection_id)?;
        self.recompute_results();
        Some(option)
    }

    pub fn has_answered(&self, connection_id: ConnectionId) -> bool {
        self.responses.contains_key(&connection_id)
    }

    /// Every listed respondent has a recorded response.
    ///
    /// Vacuously true for an empty list.
    pub fn all_answered(&self, respondents: &[ConnectionId]) -> bool {
        respondents.iter().all(|id| self.responses.contains_key(id))
    }

    pub fn end(&mut self, now: u64) {
        self.state = PollState::Ended;
        self.ended_at = Some(now);
    }

    /// The advisory countdown has run out at `now` (ms).
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.created_at + self.spec.timer_secs as u64 * 1000
    }

    pub fn response_count(&self) -> usize {
        self.responses.len()
    }

    pub fn results(&self) -> &[OptionResult] {
        &self.results
    }

    fn recompute_results(&mut self) {
        self.results = tally(&self.spec.options, self.responses.values());
    }

    pub fn snapshot(&self) -> PollSnapshot {
        PollSnapshot {
            id: self.id,
            question: self.spec.question.clone(),
            options: self.spec.options.clone(),
            correct_answers: self.spec.correct_answers.clone(),
            timer_secs: self.spec.timer_secs,
            created_at: self.created_at,
            ended_at: self.ended_at,
            state: self.state,
            responses: self.responses.clone(),
            results: self.results.clone(),
        }
    }
}
