//! Pluggable message transport: `send`/`on_incoming` plus a loopback
//! implementation that supports directional partition simulation for tests.
//!
//! A transport never calls back into the `Router` directly (that would
//! need either a trait-object cycle or an `Rc<RefCell<_>>` that panics the
//! moment a reply is sent while still inside the delivery call). Instead
//! `send` hands back the encoded bytes to deliver (or `None` if the route
//! is blocked), and `on_incoming` hands back the decoded `Message` (or
//! `None` on a dropped, undecodable buffer); [`crate::router::Router`]
//! owns the decode-then-dispatch step and the outbound queue, rather than
//! having the transport push messages itself.

use std::collections::HashSet;

use crate::codec;
use crate::message::{MemberId, Message};

/// Something capable of moving serialized `Message`s between members.
///
/// Serialization and byte-counting happen in `send`; deserialization and
/// byte-counting happen in `on_incoming`. Whatever owns a `MessageTransport`
/// sees only deserialized `Message`s once `on_incoming` returns.
pub trait MessageTransport {
    /// Serializes `message` and updates the sent counters. Returns the
    /// encoded buffer to deliver, or `None` if this route is blocked
    /// (e.g. a simulated partition) and the message should be dropped.
    fn send(&mut self, to_address: &MemberId, message: &Message, from_sender: &MemberId) -> Option<Vec<u8>>;

    /// Updates the received counters and decodes `bytes`. Returns the
    /// decoded message, or `None` if the buffer didn't decode (the fault
    /// is logged here and never propagated as an `Err`).
    fn on_incoming(&mut self, bytes: &[u8]) -> Option<Message>;

    fn sent_messages(&self) -> u64;
    fn received_messages(&self) -> u64;
    fn sent_bytes(&self) -> u64;
    fn received_bytes(&self) -> u64;
}

/// A transport that can only deliver to other local, in-process
/// `Membership`s (there is no network). Useful for unit and scenario
/// tests; not for production use.
///
/// [`LoopbackTransport::simulate_partition_between`] drops all messages
/// sent along a given directed `(from, to)` edge, letting scenario tests
/// build deterministic partial and full partitions.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    blocked_routes: HashSet<(MemberId, MemberId)>,
    sent_messages: u64,
    received_messages: u64,
    sent_bytes: u64,
    received_bytes: u64,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a uni-directional routing problem: all messages sent
    /// from `from_address` to `to_address` are dropped. The reverse
    /// direction is unaffected unless blocked separately.
    pub fn simulate_partition_between(&mut self, from_address: MemberId, to_address: MemberId) {
        self.blocked_routes.insert((from_address, to_address));
    }

    /// Removes a previously simulated partition, restoring the route.
    pub fn heal_partition_between(&mut self, from_address: &MemberId, to_address: &MemberId) {
        self.blocked_routes
            .remove(&(from_address.clone(), to_address.clone()));
    }
}

impl MessageTransport for LoopbackTransport {
    fn send(&mut self, to_address: &MemberId, message: &Message, from_sender: &MemberId) -> Option<Vec<u8>> {
        self.sent_messages += 1;
        let bytes = codec::encode(message);
        self.sent_bytes += bytes.len() as u64;
        if self
            .blocked_routes
            .contains(&(from_sender.clone(), to_address.clone()))
        {
            debug!(
                "loopback transport: dropping {} -> {} ({}) due to simulated partition",
                from_sender, to_address, message
            );
            return None;
        }
        Some(bytes)
    }

    fn on_incoming(&mut self, bytes: &[u8]) -> Option<Message> {
        self.received_messages += 1;
        self.received_bytes += bytes.len() as u64;
        match codec::decode(bytes) {
            Ok(message) => Some(message),
            Err(err) => {
                warn!("loopback transport: dropping undecodable message: {}", err);
                None
            }
        }
    }

    fn sent_messages(&self) -> u64 {
        self.sent_messages
    }

    fn received_messages(&self) -> u64 {
        self.received_messages
    }

    fn sent_bytes(&self) -> u64 {
        self.sent_bytes
    }

    fn received_bytes(&self) -> u64 {
        self.received_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ping;

    #[test]
    fn partition_is_directional() {
        let mut transport = LoopbackTransport::new();
        let a = MemberId::new("A");
        let b = MemberId::new("B");
        transport.simulate_partition_between(a.clone(), b.clone());

        assert!(transport.send(&b, &ping(), &a).is_none());
        assert!(transport.send(&a, &ping(), &b).is_some());
    }

    #[test]
    fn healing_a_partition_restores_the_route() {
        let mut transport = LoopbackTransport::new();
        let a = MemberId::new("A");
        let b = MemberId::new("B");
        transport.simulate_partition_between(a.clone(), b.clone());
        assert!(transport.send(&b, &ping(), &a).is_none());

        transport.heal_partition_between(&a, &b);
        assert!(transport.send(&b, &ping(), &a).is_some());
    }

    #[test]
    fn counters_track_sent_and_received() {
        let mut transport = LoopbackTransport::new();
        let a = MemberId::new("A");
        let b = MemberId::new("B");
        let bytes = transport.send(&b, &ping(), &a).expect("unblocked route");
        assert_eq!(transport.sent_messages(), 1);
        assert!(transport.sent_bytes() > 0);

        let decoded = transport.on_incoming(&bytes).expect("well-formed message");
        assert_eq!(decoded, ping());
        assert_eq!(transport.received_messages(), 1);
        assert!(transport.received_bytes() > 0);
    }
}
