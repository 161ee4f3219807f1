//! Participant registry: stable identities layered over volatile connections
//!
//! A respondent is identified by the name they typed in; the connection id
//! the transport hands out changes on every reconnect. The registry keeps the
//! two-level mapping (name to current connection) and performs the
//! merge-on-register step explicitly:
//! - A respondent registering under a known name takes over that entry and
//!   the previous connection id stops mapping to anyone
//! - Presenters are keyed by connection only and never merged by name
//! - A connection maps to at most one participant at any instant
//!
//! Entries keep their insertion slot across reconnects, so participant lists
//! stay in join order.

use crate::error::SessionError;
use log::info;
use shared::{ConnectionId, ParticipantView, Role};
use std::collections::HashSet;

/// A registered participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Human-provided name, unique among respondents
    pub name: String,
    pub role: Role,
    /// Transport handle currently serving this participant
    pub connection_id: ConnectionId,
}

impl Participant {
    pub fn view(&self) -> ParticipantView {
        ParticipantView {
            connection_id: self.connection_id,
            name: self.name.clone(),
            role: self.role,
        }
    }

    pub fn is_respondent(&self) -> bool {
        self.role == Role::Respondent
    }
}

/// What a successful registration did to the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// A participant entry was created
    Joined,
    /// The connection re-registered the identity it already held
    Refreshed,
    /// A respondent came back under a new connection id
    Reconnected { previous: ConnectionId },
}

#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    participants: Vec<Participant>,
    /// Connections removed by a kick; they are never admitted again
    kicked: HashSet<ConnectionId>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` in `role` for `connection_id`
    ///
    /// Respondent names are trimmed and must not be empty. When a respondent
    /// name is already held by another connection, that entry is moved onto
    /// the new connection in place and the old id is reported back so the
    /// caller can carry per-connection state (the poll response) over.
    pub fn register(
        &mut self,
        name: &str,
        role: Role,
        connection_id: ConnectionId,
    ) -> Result<Registration, SessionError> {
        if self.kicked.contains(&connection_id) {
            return Err(SessionError::Kicked(connection_id));
        }

        let name = name.trim();
        if role == Role::Respondent && name.is_empty() {
            return Err(SessionError::InvalidRegistration);
        }

        if let Some(existing) = self.find_by_connection(connection_id) {
            let same_identity = existing.role == role && existing.name == name;
            if same_identity {
                return Ok(Registration::Refreshed);
            }
            // Switching identity on the same connection: drop the old entry
            // so the connection never maps to two participants.
            self.participants
                .retain(|p| p.connection_id != connection_id);
        }

        if role == Role::Respondent {
            if let Some(existing) = self
                .participants
                .iter_mut()
                .find(|p| p.is_respondent() && p.name == name)
            {
                let previous = existing.connection_id;
                existing.connection_id = connection_id;
                info!(
                    "Respondent '{}' reconnected: {} -> {}",
                    name, previous, connection_id
                );
                return Ok(Registration::Reconnected { previous });
            }
        }

        info!("{} '{}' registered on {}", role, name, connection_id);
        self.participants.push(Participant {
            name: name.to_string(),
            role,
            connection_id,
        });
        Ok(Registration::Joined)
    }

    /// Removes the participant currently served by `connection_id`
    ///
    /// A stale id left behind by a reconnect matches nobody, so a late
    /// disconnect of the old connection cannot evict the reconnected entry.
    pub fn remove(&mut self, connection_id: ConnectionId) -> Option<Participant> {
        let index = self
            .participants
            .iter()
            .position(|p| p.connection_id == connection_id)?;
        let participant = self.participants.remove(index);
        info!(
            "{} '{}' left ({})",
            participant.role, participant.name, connection_id
        );
        Some(participant)
    }

    /// Removes the participant and bars the connection id for good
    pub fn kick(&mut self, connection_id: ConnectionId) -> Option<Participant> {
        let participant = self.remove(connection_id)?;
        self.kicked.insert(connection_id);
        Some(participant)
    }

    pub fn is_kicked(&self, connection_id: ConnectionId) -> bool {
        self.kicked.contains(&connection_id)
    }

    pub fn find_by_connection(&self, connection_id: ConnectionId) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.connection_id == connection_id)
    }

    pub fn find_respondent(&self, name: &str) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.is_respondent() && p.name == name)
    }

    /// Connection ids of every registered respondent
    pub fn respondent_connections(&self) -> Vec<ConnectionId> {
        self.participants
            .iter()
            .filter(|p| p.is_respondent())
            .map(|p| p.connection_id)
            .collect()
    }

    pub fn list_all(&self) -> Vec<ParticipantView> {
        self.participants.iter().map(Participant::view).collect()
    }

    pub fn list_respondents(&self) -> Vec<ParticipantView> {
        self.participants
            .iter()
            .filter(|p| p.is_respondent())
            .map(Participant::view)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(views: &[ParticipantView]) -> Vec<&str> {
        views.iter().map(|v| v.name.as_str()).collect()
    }

    #[test]
    fn test_register_new_respondents() {
        let mut registry = ParticipantRegistry::new();

        let a = registry.register("alice", Role::Respondent, ConnectionId(1));
        let b = registry.register("bob", Role::Respondent, ConnectionId(2));

        assert_eq!(a, Ok(Registration::Joined));
        assert_eq!(b, Ok(Registration::Joined));
        assert_eq!(registry.len(), 2);
        assert_eq!(names(&registry.list_all()), vec!["alice", "bob"]);
    }

    #[test]
    fn test_respondent_name_required() {
        let mut registry = ParticipantRegistry::new();

        let result = registry.register("   ", Role::Respondent, ConnectionId(1));

        assert_eq!(result, Err(SessionError::InvalidRegistration));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_names_are_trimmed() {
        let mut registry = ParticipantRegistry::new();
        registry
            .register("  alice ", Role::Respondent, ConnectionId(1))
            .unwrap();

        assert!(registry.find_respondent("alice").is_some());
    }

    #[test]
    fn test_reconnect_moves_identity_in_place() {
        let mut registry = ParticipantRegistry::new();
        registry.register("alice", Role::Respondent, ConnectionId(1)).unwrap();
        registry.register("bob", Role::Respondent, ConnectionId(2)).unwrap();

        let result = registry.register("alice", Role::Respondent, ConnectionId(3));

        assert_eq!(
            result,
            Ok(Registration::Reconnected {
                previous: ConnectionId(1)
            })
        );
        assert_eq!(registry.len(), 2);
        assert!(registry.find_by_connection(ConnectionId(1)).is_none());
        let alice = registry.find_by_connection(ConnectionId(3)).unwrap();
        assert_eq!(alice.name, "alice");
        // Original slot is kept
        assert_eq!(names(&registry.list_all()), vec!["alice", "bob"]);
    }

    #[test]
    fn test_refresh_same_connection() {
        let mut registry = ParticipantRegistry::new();
        registry.register("alice", Role::Respondent, ConnectionId(1)).unwrap();

        let result = registry.register("alice", Role::Respondent, ConnectionId(1));

        assert_eq!(result, Ok(Registration::Refreshed));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_identity_switch_on_same_connection() {
        let mut registry = ParticipantRegistry::new();
        registry.register("alice", Role::Respondent, ConnectionId(1)).unwrap();

        registry.register("carol", Role::Respondent, ConnectionId(1)).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.find_by_connection(ConnectionId(1)).unwrap().name,
            "carol"
        );
        assert!(registry.find_respondent("alice").is_none());
    }

    #[test]
    fn test_presenters_not_merged_by_name() {
        let mut registry = ParticipantRegistry::new();
        registry.register("host", Role::Presenter, ConnectionId(1)).unwrap();
        let second = registry.register("host", Role::Presenter, ConnectionId(2));

        assert_eq!(second, Ok(Registration::Joined));
        assert_eq!(registry.len(), 2);
        assert!(registry.respondent_connections().is_empty());
        assert!(registry.list_respondents().is_empty());
    }

    #[test]
    fn test_presenter_and_respondent_share_name() {
        let mut registry = ParticipantRegistry::new();
        registry.register("sam", Role::Presenter, ConnectionId(1)).unwrap();
        let result = registry.register("sam", Role::Respondent, ConnectionId(2));

        assert_eq!(result, Ok(Registration::Joined));
        assert_eq!(registry.respondent_connections(), vec![ConnectionId(2)]);
    }

    #[test]
    fn test_remove_by_connection() {
        let mut registry = ParticipantRegistry::new();
        registry.register("alice", Role::Respondent, ConnectionId(1)).unwrap();

        let removed = registry.remove(ConnectionId(1));
        assert_eq!(removed.map(|p| p.name), Some("alice".to_string()));
        assert!(registry.is_empty());

        assert!(registry.remove(ConnectionId(1)).is_none());
    }

    #[test]
    fn test_stale_disconnect_after_reconnect_is_noop() {
        let mut registry = ParticipantRegistry::new();
        registry.register("alice", Role::Respondent, ConnectionId(1)).unwrap();
        registry.register("alice", Role::Respondent, ConnectionId(2)).unwrap();

        assert!(registry.remove(ConnectionId(1)).is_none());
        assert_eq!(registry.respondent_connections(), vec![ConnectionId(2)]);
    }

    #[test]
    fn test_kicked_connection_is_barred() {
        let mut registry = ParticipantRegistry::new();
        registry.register("alice", Role::Respondent, ConnectionId(1)).unwrap();

        assert!(registry.kick(ConnectionId(1)).is_some());
        assert!(registry.is_kicked(ConnectionId(1)));
        assert_eq!(
            registry.register("alice", Role::Respondent, ConnectionId(1)),
            Err(SessionError::Kicked(ConnectionId(1)))
        );
        // The name itself can come back on a fresh connection
        assert_eq!(
            registry.register("alice", Role::Respondent, ConnectionId(2)),
            Ok(Registration::Joined)
        );
    }

    #[test]
    fn test_kick_unknown_connection() {
        let mut registry = ParticipantRegistry::new();
        assert!(registry.kick(ConnectionId(9)).is_none());
        assert!(!registry.is_kicked(ConnectionId(9)));
    }
}
