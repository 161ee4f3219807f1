//! Response aggregation for the current poll
//!
//! Responses are keyed by connection inside the poll itself; this module adds
//! the validation around a submission and the per-name "submitted" bookkeeping
//! that survives a respondent's reconnects, remembering which connection each
//! name answered from so the response can follow the name. Rejected
//! submissions are never errors for the sender: late, duplicate and invalid
//! answers are dropped and only traced at debug level by the caller.

use crate::error::SessionError;
use crate::lifecycle::PollLifecycle;
use crate::poll::Poll;
use crate::registry::ParticipantRegistry;
use shared::ConnectionId;
use std::collections::HashMap;

/// Result of an accepted submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    /// Every currently registered respondent has now answered
    pub all_answered: bool,
}

#[derive(Debug, Default)]
pub struct ResponseAggregator {
    /// Respondent name to the connection its answer is recorded under
    submitted: HashMap<String, ConnectionId>,
}

impl ResponseAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `option` for the respondent on `connection_id`
    pub fn submit(
        &mut self,
        lifecycle: &mut PollLifecycle,
        registry: &ParticipantRegistry,
        connection_id: ConnectionId,
        option: &str,
    ) -> Result<Submission, SessionError> {
        if registry.is_kicked(connection_id) {
            return Err(SessionError::Kicked(connection_id));
        }
        let poll = lifecycle.current_mut().ok_or(SessionError::NoActivePoll)?;
        if !poll.is_active() {
            return Err(SessionError::PollEnded);
        }
        let participant = registry
            .find_by_connection(connection_id)
            .filter(|p| p.is_respondent())
            .ok_or(SessionError::UnknownParticipant(connection_id))?;

        poll.record_response(connection_id, option)?;
        self.submitted
            .insert(participant.name.clone(), connection_id);

        Ok(Submission {
            all_answered: all_answered(poll, registry),
        })
    }

    /// Whether `name` already answered the current poll instance
    pub fn is_submitted(&self, name: &str) -> bool {
        self.submitted.contains_key(name)
    }

    /// Connection the answer of `name` is recorded under, if any
    pub fn answered_from(&self, name: &str) -> Option<ConnectionId> {
        self.submitted.get(name).copied()
    }

    /// Notes that the answer of `name` now lives under `connection_id`
    pub fn follow(&mut self, name: &str, connection_id: ConnectionId) {
        if let Some(current) = self.submitted.get_mut(name) {
            *current = connection_id;
        }
    }

    /// Drops the answer bookkeeping of `name`; it may answer again
    pub fn forget(&mut self, name: &str) -> Option<ConnectionId> {
        self.submitted.remove(name)
    }

    /// Forgets all submissions; called whenever the poll instance changes
    pub fn reset(&mut self) {
        self.submitted.clear();
    }
}

/// Every respondent registered right now has a response in `poll`.
///
/// Evaluated against the live registry on every call: a respondent joining
/// later flips a complete poll back to incomplete.
pub fn all_answered(poll: &Poll, registry: &ParticipantRegistry) -> bool {
    poll.all_answered(&registry.respondent_connections())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{PollSpec, Role};

    fn setup() -> (ResponseAggregator, PollLifecycle, ParticipantRegistry) {
        let mut registry = ParticipantRegistry::new();
        registry.register("alice", Role::Respondent, ConnectionId(1)).unwrap();
        registry.register("bob", Role::Respondent, ConnectionId(2)).unwrap();
        registry.register("host", Role::Presenter, ConnectionId(3)).unwrap();

        let mut lifecycle = PollLifecycle::new();
        lifecycle
            .create(
                PollSpec::new("Q", ["x", "y"], ["x"], 60),
                &registry.respondent_connections(),
                0,
            )
            .unwrap();

        (ResponseAggregator::new(), lifecycle, registry)
    }

    #[test]
    fn test_submissions_until_all_answered() {
        let (mut aggregator, mut lifecycle, registry) = setup();

        let first = aggregator
            .submit(&mut lifecycle, &registry, ConnectionId(1), "x")
            .unwrap();
        assert!(!first.all_answered);
        assert!(aggregator.is_submitted("alice"));
        assert!(!aggregator.is_submitted("bob"));
        assert_eq!(aggregator.answered_from("alice"), Some(ConnectionId(1)));

        let second = aggregator
            .submit(&mut lifecycle, &registry, ConnectionId(2), "y")
            .unwrap();
        assert!(second.all_answered);

        let poll = lifecycle.current().unwrap();
        assert_eq!(poll.results()[0].count, 1);
        assert_eq!(poll.results()[0].percentage, 50.0);
        assert_eq!(poll.results()[1].percentage, 50.0);
    }

    #[test]
    fn test_duplicate_leaves_responses_unchanged() {
        let (mut aggregator, mut lifecycle, registry) = setup();
        aggregator
            .submit(&mut lifecycle, &registry, ConnectionId(1), "x")
            .unwrap();

        let again = aggregator.submit(&mut lifecycle, &registry, ConnectionId(1), "y");

        assert_eq!(again, Err(SessionError::DuplicateSubmission(ConnectionId(1))));
        assert_eq!(lifecycle.current().unwrap().response_count(), 1);
    }

    #[test]
    fn test_presenter_cannot_answer() {
        let (mut aggregator, mut lifecycle, registry) = setup();
        let result = aggregator.submit(&mut lifecycle, &registry, ConnectionId(3), "x");
        assert_eq!(result, Err(SessionError::UnknownParticipant(ConnectionId(3))));
    }

    #[test]
    fn test_unregistered_connection_cannot_answer() {
        let (mut aggregator, mut lifecycle, registry) = setup();
        let result = aggregator.submit(&mut lifecycle, &registry, ConnectionId(42), "x");
        assert_eq!(result, Err(SessionError::UnknownParticipant(ConnectionId(42))));
    }

    #[test]
    fn test_no_poll_and_ended_poll() {
        let (mut aggregator, mut lifecycle, registry) = setup();
        lifecycle.end(10).unwrap();
        assert_eq!(
            aggregator.submit(&mut lifecycle, &registry, ConnectionId(1), "x"),
            Err(SessionError::PollEnded)
        );

        lifecycle.clear();
        assert_eq!(
            aggregator.submit(&mut lifecycle, &registry, ConnectionId(1), "x"),
            Err(SessionError::NoActivePoll)
        );
    }

    #[test]
    fn test_invalid_option() {
        let (mut aggregator, mut lifecycle, registry) = setup();
        let result = aggregator.submit(&mut lifecycle, &registry, ConnectionId(1), "zzz");
        assert_eq!(result, Err(SessionError::InvalidOption("zzz".to_string())));
        assert!(!aggregator.is_submitted("alice"));
    }

    #[test]
    fn test_late_joiner_reopens_all_answered() {
        let (mut aggregator, mut lifecycle, mut registry) = setup();
        aggregator
            .submit(&mut lifecycle, &registry, ConnectionId(1), "x")
            .unwrap();
        aggregator
            .submit(&mut lifecycle, &registry, ConnectionId(2), "x")
            .unwrap();
        assert!(all_answered(lifecycle.current().unwrap(), &registry));

        registry.register("carol", Role::Respondent, ConnectionId(4)).unwrap();
        assert!(!all_answered(lifecycle.current().unwrap(), &registry));

        registry.remove(ConnectionId(4));
        assert!(all_answered(lifecycle.current().unwrap(), &registry));
    }

    #[test]
    fn test_reset() {
        let (mut aggregator, mut lifecycle, registry) = setup();
        aggregator
            .submit(&mut lifecycle, &registry, ConnectionId(1), "x")
            .unwrap();
        aggregator.follow("alice", ConnectionId(9));
        assert_eq!(aggregator.answered_from("alice"), Some(ConnectionId(9)));
        aggregator.follow("bob", ConnectionId(10));
        assert_eq!(aggregator.answered_from("bob"), None);

        aggregator.reset();
        assert!(!aggregator.is_submitted("alice"));
    }

    #[test]
    fn test_forget_allows_new_answer() {
        let (mut aggregator, mut lifecycle, registry) = setup();
        aggregator
            .submit(&mut lifecycle, &registry, ConnectionId(1), "x")
            .unwrap();

        assert_eq!(aggregator.forget("alice"), Some(ConnectionId(1)));
        assert!(!aggregator.is_submitted("alice"));
        assert_eq!(aggregator.forget("alice"), None);
    }
}
