//! Fan-out of session events to connections
//!
//! The notifier holds no business rules. Session operations queue packets
//! with a delivery class and the network loop drains the outbox after each
//! inbound event, resolving classes to addresses. The only state kept here is
//! the audience (connected ids) and which poll instance each connection has
//! already been shown, so a reconnecting view does not restart its countdown
//! because of a redundant push.

use shared::{ConnectionId, Packet, PollId};
use std::collections::{BTreeSet, HashSet};

/// Who receives a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    All,
    AllExcept(ConnectionId),
    To(ConnectionId),
}

impl Delivery {
    pub fn includes(&self, connection_id: ConnectionId) -> bool {
        match self {
            Delivery::All => true,
            Delivery::AllExcept(excluded) => *excluded != connection_id,
            Delivery::To(target) => *target == connection_id,
        }
    }
}

/// Work queued for the transport
#[derive(Debug, Clone)]
pub enum Outbound {
    Send { delivery: Delivery, packet: Packet },
    /// Terminate the transport connection after prior sends went out
    Close { connection_id: ConnectionId },
}

impl Outbound {
    /// The packet this item delivers to `connection_id`, if any
    pub fn packet_for(&self, connection_id: ConnectionId) -> Option<&Packet> {
        match self {
            Outbound::Send { delivery, packet } if delivery.includes(connection_id) => Some(packet),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Notifier {
    outbox: Vec<Outbound>,
    connected: BTreeSet<ConnectionId>,
    served_polls: HashSet<(ConnectionId, PollId)>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, connection_id: ConnectionId) {
        self.connected.insert(connection_id);
    }

    pub fn disconnect(&mut self, connection_id: ConnectionId) {
        self.connected.remove(&connection_id);
        self.served_polls.retain(|(id, _)| *id != connection_id);
    }

    pub fn is_connected(&self, connection_id: ConnectionId) -> bool {
        self.connected.contains(&connection_id)
    }

    pub fn connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connected.iter().copied()
    }

    pub fn broadcast_all(&mut self, packet: Packet) {
        self.queue(Delivery::All, packet);
    }

    pub fn broadcast_except(&mut self, sender: ConnectionId, packet: Packet) {
        self.queue(Delivery::AllExcept(sender), packet);
    }

    pub fn unicast(&mut self, connection_id: ConnectionId, packet: Packet) {
        self.queue(Delivery::To(connection_id), packet);
    }

    pub fn close(&mut self, connection_id: ConnectionId) {
        self.outbox.push(Outbound::Close { connection_id });
    }

    fn queue(&mut self, delivery: Delivery, packet: Packet) {
        self.outbox.push(Outbound::Send { delivery, packet });
    }

    /// Unicasts a current-poll packet unless this connection has already
    /// been shown `poll_id`.
    ///
    /// Returns true when the packet was queued.
    pub fn push_poll_once(&mut self, connection_id: ConnectionId, poll_id: PollId, packet: Packet) -> bool {
        if !self.served_polls.insert((connection_id, poll_id)) {
            return false;
        }
        self.unicast(connection_id, packet);
        true
    }

    /// Broadcasts a new poll and marks every connection as served for it.
    pub fn broadcast_poll(&mut self, poll_id: PollId, packet: Packet) {
        for connection_id in self.connected.iter().copied() {
            self.served_polls.insert((connection_id, poll_id));
        }
        self.broadcast_all(packet);
    }

    /// Drops the served-poll marks; called whenever the poll instance changes
    pub fn forget_polls(&mut self) {
        self.served_polls.clear();
    }

    pub fn pending(&self) -> &[Outbound] {
        &self.outbox
    }

    pub fn drain(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_classes() {
        let me = ConnectionId(1);
        let other = ConnectionId(2);

        assert!(Delivery::All.includes(me));
        assert!(!Delivery::AllExcept(me).includes(me));
        assert!(Delivery::AllExcept(me).includes(other));
        assert!(Delivery::To(me).includes(me));
        assert!(!Delivery::To(me).includes(other));
    }

    #[test]
    fn test_outbox_keeps_order_and_drains() {
        let mut notifier = Notifier::new();
        notifier.unicast(ConnectionId(1), Packet::Kicked { reason: "bye".into() });
        notifier.close(ConnectionId(1));
        notifier.broadcast_except(ConnectionId(2), Packet::GetPollHistory);

        let drained = notifier.drain();
        assert_eq!(drained.len(), 3);
        assert!(matches!(
            drained[0],
            Outbound::Send {
                delivery: Delivery::To(ConnectionId(1)),
                packet: Packet::Kicked { .. }
            }
        ));
        assert!(matches!(
            drained[1],
            Outbound::Close {
                connection_id: ConnectionId(1)
            }
        ));
        assert!(matches!(
            drained[2],
            Outbound::Send {
                delivery: Delivery::AllExcept(ConnectionId(2)),
                ..
            }
        ));
        assert!(notifier.pending().is_empty());
    }

    #[test]
    fn test_poll_push_deduplicated_per_connection_and_poll() {
        let mut notifier = Notifier::new();
        let conn = ConnectionId(1);

        assert!(notifier.push_poll_once(conn, PollId(1), Packet::EndPoll));
        assert!(!notifier.push_poll_once(conn, PollId(1), Packet::EndPoll));
        assert!(notifier.push_poll_once(conn, PollId(2), Packet::EndPoll));
        assert!(notifier.push_poll_once(ConnectionId(2), PollId(1), Packet::EndPoll));
        assert_eq!(notifier.pending().len(), 3);
    }

    #[test]
    fn test_broadcast_poll_marks_connected() {
        let mut notifier = Notifier::new();
        notifier.connect(ConnectionId(1));
        notifier.connect(ConnectionId(2));

        notifier.broadcast_poll(PollId(5), Packet::EndPoll);

        assert!(!notifier.push_poll_once(ConnectionId(1), PollId(5), Packet::EndPoll));
        assert!(!notifier.push_poll_once(ConnectionId(2), PollId(5), Packet::EndPoll));
        // Joined after the broadcast
        assert!(notifier.push_poll_once(ConnectionId(3), PollId(5), Packet::EndPoll));
    }

    #[test]
    fn test_disconnect_and_forget() {
        let mut notifier = Notifier::new();
        notifier.connect(ConnectionId(1));
        notifier.push_poll_once(ConnectionId(1), PollId(1), Packet::EndPoll);

        notifier.disconnect(ConnectionId(1));
        assert!(!notifier.is_connected(ConnectionId(1)));
        assert!(notifier.push_poll_once(ConnectionId(1), PollId(1), Packet::EndPoll));

        notifier.forget_polls();
        assert!(notifier.push_poll_once(ConnectionId(1), PollId(1), Packet::EndPoll));
    }
}
