//! Error kinds raised by the session core and the UDP transport.

use shared::{ConnectionId, PollSpecError};
use thiserror::Error;

/// Outcome of a rejected session operation.
///
/// Some kinds are reported back to the requesting connection; the rest are
/// the "ignore late or invalid input" cases and only show up in debug logs.
/// None of them is fatal to the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("respondents must register with a name")]
    InvalidRegistration,
    #[error("{0}")]
    PollCreationDenied(String),
    #[error("invalid poll: {0}")]
    InvalidPoll(#[from] PollSpecError),
    #[error("no poll is active")]
    NoActivePoll,
    #[error("the current poll has ended")]
    PollEnded,
    #[error("\"{0}\" is not an option of the current poll")]
    InvalidOption(String),
    #[error("connection {0} already answered this poll")]
    DuplicateSubmission(ConnectionId),
    #[error("connection {0} is not a registered respondent")]
    UnknownParticipant(ConnectionId),
    #[error("no participant is connected as {0}")]
    UnknownTarget(ConnectionId),
    #[error("connection {0} was removed from the session")]
    Kicked(ConnectionId),
}

impl SessionError {
    /// True for the kinds that are dropped without telling the requester.
    pub fn is_silent(&self) -> bool {
        !matches!(
            self,
            SessionError::InvalidRegistration
                | SessionError::PollCreationDenied(_)
                | SessionError::InvalidPoll(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("packet encoding failed: {0}")]
    Codec(#[from] bincode::Error),
    #[error("packet of {0} bytes exceeds the datagram limit")]
    Oversized(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reported_kinds() {
        assert!(!SessionError::InvalidRegistration.is_silent());
        assert!(!SessionError::PollCreationDenied("busy".to_string()).is_silent());
        assert!(!SessionError::InvalidPoll(PollSpecError::EmptyQuestion).is_silent());
    }

    #[test]
    fn test_silent_kinds() {
        let silent = [
            SessionError::NoActivePoll,
            SessionError::PollEnded,
            SessionError::InvalidOption("z".to_string()),
            SessionError::DuplicateSubmission(ConnectionId(1)),
            SessionError::UnknownParticipant(ConnectionId(1)),
            SessionError::UnknownTarget(ConnectionId(1)),
            SessionError::Kicked(ConnectionId(1)),
        ];
        assert!(silent.iter().all(SessionError::is_silent));
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            SessionError::PollCreationDenied("wait".to_string()).to_string(),
            "wait"
        );
        assert_eq!(
            SessionError::InvalidPoll(PollSpecError::OptionCount(1)).to_string(),
            "invalid poll: a poll needs between 2 and 6 options, got 1"
        );
    }
}
