//! Session state coordinator
//!
//! [`Session`] is the single owner of all mutable poll state: the participant
//! registry, the current-poll slot, response bookkeeping, the history log and
//! the fan-out outbox. The network loop feeds it one inbound event at a time
//! and drains the outbox afterwards, so no operation needs locking and the
//! creation gate is always evaluated atomically with the mutation it guards.
//!
//! Every operation queues its packets with an explicit delivery class:
//!
//! | operation        | packet                 | delivery            |
//! |------------------|------------------------|---------------------|
//! | connect          | `Welcome`, history     | requester           |
//! | register         | `ParticipantUpdate`    | everyone            |
//! | register         | `NewPoll` (once)       | requester           |
//! | create poll      | `NewPoll`, history     | everyone            |
//! | create (denied)  | `PollCreationDenied`   | requester           |
//! | submit           | `PersonalPollUpdate`   | requester           |
//! | submit           | `PresenterPollUpdate`  | everyone but sender |
//! | submit           | `AllAnswered`          | everyone            |
//! | submit           | history                | everyone            |
//! | end poll         | `PollEnded`, history   | everyone            |
//! | kick             | `Kicked` + close       | target              |
//! | chat             | `NewMessage`           | everyone            |
//!
//! History goes out as one or more `PollHistory` pages sized for a datagram.

use crate::aggregator::{ResponseAggregator, Submission};
use crate::error::SessionError;
use crate::history::SessionHistory;
use crate::lifecycle::{PollLifecycle, SlotState};
use crate::notifier::{Notifier, Outbound};
use crate::poll::Poll;
use crate::registry::{ParticipantRegistry, Registration};
use log::{debug, info, warn};
use shared::{ChatMessage, ConnectionId, Packet, PollId, PollSpec, Role};

pub const WELCOME_MESSAGE: &str = "Connected to the polling server!";
pub const KICK_REASON: &str = "You have been removed from the session.";

#[derive(Debug, Default)]
pub struct Session {
    registry: ParticipantRegistry,
    lifecycle: PollLifecycle,
    aggregator: ResponseAggregator,
    history: SessionHistory,
    notifier: Notifier,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &ParticipantRegistry {
        &self.registry
    }

    pub fn lifecycle(&self) -> &PollLifecycle {
        &self.lifecycle
    }

    pub fn history(&self) -> &SessionHistory {
        &self.history
    }

    pub fn aggregator(&self) -> &ResponseAggregator {
        &self.aggregator
    }

    /// Takes every packet queued since the last call
    pub fn drain_outbox(&mut self) -> Vec<Outbound> {
        self.notifier.drain()
    }

    /// Routes one inbound request to its operation.
    ///
    /// Rejections are logged here; the operations themselves already queued
    /// whatever the requester is told.
    pub fn handle_packet(&mut self, connection_id: ConnectionId, packet: Packet, now: u64) {
        if self.registry.is_kicked(connection_id) {
            debug!("Dropping {} from kicked connection {}", packet.kind(), connection_id);
            return;
        }

        let kind = packet.kind();
        let result = match packet {
            Packet::Register { role, name } => {
                self.register(connection_id, role, &name, now).map(|_| ())
            }
            Packet::CreatePoll(spec) => self.create_poll(connection_id, spec, now).map(|_| ()),
            Packet::SubmitAnswer { option } => {
                self.submit_answer(connection_id, &option).map(|_| ())
            }
            Packet::EndPoll => self.end_poll(now).map(|_| ()),
            Packet::KickParticipant { target } => self.kick(target),
            Packet::GetPollHistory => {
                self.send_poll_history(connection_id);
                Ok(())
            }
            Packet::SendMessage { sender, text } => {
                self.send_message(connection_id, sender, text, now);
                Ok(())
            }
            other => {
                warn!("Unexpected {} packet from {}", other.kind(), connection_id);
                Ok(())
            }
        };

        if let Err(err) = result {
            if err.is_silent() {
                debug!("Ignored {} from {}: {}", kind, connection_id, err);
            } else {
                info!("Rejected {} from {}: {}", kind, connection_id, err);
            }
        }
    }

    /// A transport connection came up
    pub fn connect(&mut self, connection_id: ConnectionId) {
        self.notifier.connect(connection_id);
        self.notifier.unicast(
            connection_id,
            Packet::Welcome {
                message: WELCOME_MESSAGE.to_string(),
            },
        );
        self.send_poll_history(connection_id);
    }

    /// A transport connection went away (explicit disconnect or timeout)
    pub fn disconnect(&mut self, connection_id: ConnectionId) {
        self.notifier.disconnect(connection_id);

        let was_all_answered = self.current_all_answered();
        if self.registry.remove(connection_id).is_some() {
            self.broadcast_participants();
            self.after_registry_change(was_all_answered);
        }
    }

    /// Registers a participant, merging a returning respondent by name.
    pub fn register(
        &mut self,
        connection_id: ConnectionId,
        role: Role,
        name: &str,
        now: u64,
    ) -> Result<Registration, SessionError> {
        let was_all_answered = self.current_all_answered();
        let previous_name = self
            .registry
            .find_by_connection(connection_id)
            .filter(|p| p.is_respondent())
            .map(|p| p.name.clone());
        let registration = match self.registry.register(name, role, connection_id) {
            Ok(registration) => registration,
            Err(err) => {
                if err == SessionError::InvalidRegistration {
                    self.notifier.unicast(
                        connection_id,
                        Packet::RegistrationRejected {
                            reason: err.to_string(),
                        },
                    );
                }
                return Err(err);
            }
        };

        if registration != Registration::Refreshed {
            if let Some(previous_name) = previous_name {
                self.release_answer(connection_id, &previous_name);
            }
        }
        self.carry_response(connection_id, &registration);

        self.broadcast_participants();
        self.push_current_poll(connection_id, now);
        self.send_poll_history(connection_id);
        self.after_registry_change(was_all_answered);
        Ok(registration)
    }

    /// Opens a new poll if the creation gate allows it.
    pub fn create_poll(
        &mut self,
        connection_id: ConnectionId,
        spec: PollSpec,
        now: u64,
    ) -> Result<PollId, SessionError> {
        let respondents = self.registry.respondent_connections();
        let replaced = match self.lifecycle.create(spec, &respondents, now) {
            Ok(replaced) => replaced,
            Err(err) => {
                self.notifier.unicast(
                    connection_id,
                    Packet::PollCreationDenied {
                        reason: err.to_string(),
                    },
                );
                return Err(err);
            }
        };
        if let Some(replaced) = replaced {
            self.history.update(replaced.snapshot());
        }
        let Some(snapshot) = self.lifecycle.current().map(Poll::snapshot) else {
            return Err(SessionError::NoActivePoll);
        };

        self.aggregator.reset();
        self.notifier.forget_polls();
        self.history.append(snapshot.clone());

        let id = snapshot.id;
        let initial_timer = snapshot.timer_secs;
        self.notifier.broadcast_poll(
            id,
            Packet::NewPoll {
                poll: snapshot,
                initial_timer,
                is_submitted: false,
            },
        );
        self.broadcast_history();
        Ok(id)
    }

    /// Records one answer from a registered respondent.
    pub fn submit_answer(
        &mut self,
        connection_id: ConnectionId,
        option: &str,
    ) -> Result<Submission, SessionError> {
        let submission =
            self.aggregator
                .submit(&mut self.lifecycle, &self.registry, connection_id, option)?;

        let Some(poll) = self.lifecycle.current() else {
            return Ok(submission);
        };
        let snapshot = poll.snapshot();
        self.history.update(snapshot.clone());

        self.notifier.unicast(
            connection_id,
            Packet::PersonalPollUpdate {
                poll: snapshot.clone(),
                is_submitted: true,
            },
        );
        self.notifier.broadcast_except(
            connection_id,
            Packet::PresenterPollUpdate {
                poll: snapshot.clone(),
            },
        );
        if submission.all_answered {
            info!("Every respondent answered {}", snapshot.id);
            self.notifier.broadcast_all(Packet::AllAnswered { poll: snapshot });
        }
        self.broadcast_history();
        Ok(submission)
    }

    /// Ends the active poll, clearing the slot straight away when nobody is
    /// still owing an answer.
    pub fn end_poll(&mut self, now: u64) -> Result<PollId, SessionError> {
        let snapshot = self.lifecycle.end(now)?.snapshot();
        let id = snapshot.id;

        self.history.update(snapshot.clone());
        self.notifier.broadcast_all(Packet::PollEnded { poll: snapshot });
        self.broadcast_history();

        let respondents = self.registry.respondent_connections();
        if self.lifecycle.settle(&respondents) {
            self.reset_poll_bookkeeping();
        }
        Ok(id)
    }

    /// Ends an active poll whose countdown has run out.
    ///
    /// Only called by the network loop when automatic expiry is enabled.
    pub fn expire_polls(&mut self, now: u64) -> Option<PollId> {
        let expired = self
            .lifecycle
            .active()
            .map_or(false, |poll| poll.is_expired(now));
        if !expired {
            return None;
        }
        info!("Countdown ran out, ending the current poll");
        self.end_poll(now).ok()
    }

    /// Removes a participant and terminates their connection.
    pub fn kick(&mut self, target: ConnectionId) -> Result<(), SessionError> {
        let was_all_answered = self.current_all_answered();
        let participant = self
            .registry
            .kick(target)
            .ok_or(SessionError::UnknownTarget(target))?;
        info!("Kicked '{}' ({})", participant.name, target);

        self.broadcast_participants();
        self.notifier.unicast(
            target,
            Packet::Kicked {
                reason: KICK_REASON.to_string(),
            },
        );
        self.notifier.close(target);
        self.notifier.disconnect(target);
        self.after_registry_change(was_all_answered);
        Ok(())
    }

    pub fn send_poll_history(&mut self, connection_id: ConnectionId) {
        for packet in self.history_packets() {
            self.notifier.unicast(connection_id, packet);
        }
    }

    /// Chat pass-through: stamped and broadcast, never stored.
    pub fn send_message(&mut self, connection_id: ConnectionId, sender: String, text: String, now: u64) {
        self.notifier.broadcast_all(Packet::NewMessage {
            message: ChatMessage {
                sender,
                text,
                timestamp: now,
                connection_id,
            },
        });
    }

    /// Moves a returning respondent's answer onto their new connection.
    ///
    /// The old connection comes from the registry when the respondent was
    /// still listed, otherwise from the submission bookkeeping (the old
    /// connection already disconnected).
    fn carry_response(&mut self, connection_id: ConnectionId, registration: &Registration) {
        let Some(participant) = self
            .registry
            .find_by_connection(connection_id)
            .filter(|p| p.is_respondent())
        else {
            return;
        };
        let name = participant.name.clone();

        let previous = match registration {
            Registration::Reconnected { previous } => Some(*previous),
            _ => self.aggregator.answered_from(&name),
        };
        let Some(previous) = previous.filter(|id| *id != connection_id) else {
            return;
        };
        let Some(poll) = self.lifecycle.current_mut() else {
            return;
        };

        if poll.rekey_response(previous, connection_id) {
            debug!(
                "Moved response for {} from {} to {}",
                poll.id, previous, connection_id
            );
            let snapshot = poll.snapshot();
            self.aggregator.follow(&name, connection_id);
            self.history.update(snapshot);
        }
    }

    /// Drops the answer `name` gave from `connection_id` once that connection
    /// registers as someone else, so it counts for neither identity.
    fn release_answer(&mut self, connection_id: ConnectionId, name: &str) {
        if self.aggregator.answered_from(name) != Some(connection_id) {
            return;
        }
        self.aggregator.forget(name);
        let Some(poll) = self.lifecycle.current_mut() else {
            return;
        };
        if let Some(option) = poll.withdraw_response(connection_id) {
            debug!(
                "Dropped '{}' from {} for {}: {} switched identity",
                option, name, poll.id, connection_id
            );
            let snapshot = poll.snapshot();
            self.history.update(snapshot);
            self.broadcast_history();
        }
    }

    fn broadcast_participants(&mut self) {
        let participants = self.registry.list_all();
        self.notifier
            .broadcast_all(Packet::ParticipantUpdate { participants });
    }

    fn broadcast_history(&mut self) {
        for packet in self.history_packets() {
            self.notifier.broadcast_all(packet);
        }
    }

    fn history_packets(&self) -> Vec<Packet> {
        let pages = self.history.wire_pages();
        let total = pages.len() as u32;
        let revision = self.history.revision();
        pages
            .into_iter()
            .enumerate()
            .map(|(part, polls)| Packet::PollHistory {
                revision,
                part: part as u32,
                total,
                polls,
            })
            .collect()
    }

    /// Shows the active poll to a connection that has not seen it yet.
    fn push_current_poll(&mut self, connection_id: ConnectionId, now: u64) {
        let Some(poll) = self.lifecycle.active() else {
            return;
        };

        let is_submitted = poll.has_answered(connection_id)
            || self
                .registry
                .find_by_connection(connection_id)
                .filter(|p| p.is_respondent())
                .map_or(false, |p| self.aggregator.is_submitted(&p.name));

        let snapshot = poll.snapshot();
        let initial_timer = snapshot.remaining_secs(now);
        let pushed = self.notifier.push_poll_once(
            connection_id,
            poll.id,
            Packet::NewPoll {
                poll: snapshot,
                initial_timer,
                is_submitted,
            },
        );
        if !pushed {
            debug!("{} already has {}", connection_id, poll.id);
        }
    }

    fn current_all_answered(&self) -> bool {
        self.lifecycle
            .current()
            .map_or(false, |poll| poll.all_answered(&self.registry.respondent_connections()))
    }

    /// Re-evaluates all-answered after the respondent set changed.
    fn after_registry_change(&mut self, was_all_answered: bool) {
        let respondents = self.registry.respondent_connections();
        match self.lifecycle.state() {
            SlotState::Active => {
                let Some(poll) = self.lifecycle.current() else {
                    return;
                };
                if !was_all_answered && poll.response_count() > 0 && poll.all_answered(&respondents) {
                    info!("Remaining respondents have all answered {}", poll.id);
                    self.notifier
                        .broadcast_all(Packet::AllAnswered { poll: poll.snapshot() });
                }
            }
            SlotState::Ended => {
                if self.lifecycle.settle(&respondents) {
                    self.reset_poll_bookkeeping();
                }
            }
            SlotState::Empty => {}
        }
    }

    fn reset_poll_bookkeeping(&mut self) {
        self.aggregator.reset();
        self.notifier.forget_polls();
    }
}
