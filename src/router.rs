//! Dispatches outbound sends through the transport and routes the
//! resulting inbound messages to the right `Membership`. Performs no
//! protocol logic itself.
//!
//! A single call to [`Router::send_to`] or [`Router::tick_member`] drains
//! the full synchronous cascade it triggers — replies, forwarded
//! `ping_req`s, eventual `ping_req_ack`s — before returning. Scenario
//! tests refer to this as "one router turn".

use std::collections::{HashMap, VecDeque};

use crate::membership::Membership;
use crate::message::{MemberId, Message};
use crate::transport::MessageTransport;

struct QueuedSend {
    to: MemberId,
    message: Message,
    from: MemberId,
}

pub struct Router<T: MessageTransport> {
    transport: T,
    members: HashMap<MemberId, Membership>,
    queue: VecDeque<QueuedSend>,
}

impl<T: MessageTransport> Router<T> {
    pub fn new(transport: T) -> Self {
        Router {
            transport,
            members: HashMap::new(),
            queue: VecDeque::new(),
        }
    }

    /// Adds or replaces the `Membership` registered at `id`.
    pub fn register(&mut self, id: MemberId, membership: Membership) {
        self.members.insert(id, membership);
    }

    pub fn member(&self, id: &MemberId) -> Option<&Membership> {
        self.members.get(id)
    }

    pub fn member_mut(&mut self, id: &MemberId) -> Option<&mut Membership> {
        self.members.get_mut(id)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Enqueues `message` for delivery from `from_id` to `to_id`, then
    /// drains the resulting cascade.
    pub fn send_to(&mut self, to_id: &MemberId, message: Message, from_id: &MemberId) {
        self.queue.push_back(QueuedSend {
            to: to_id.clone(),
            message,
            from: from_id.clone(),
        });
        self.pump();
    }

    /// Drives `member_id`'s `tick(now)` and delivers whatever it produces.
    pub fn tick_member(&mut self, member_id: &MemberId, now: f64) {
        let outbound = match self.members.get_mut(member_id) {
            Some(membership) => membership.tick(now),
            None => {
                self.routing_fault(member_id);
                return;
            }
        };
        for (to, message) in outbound {
            self.queue.push_back(QueuedSend {
                to,
                message,
                from: member_id.clone(),
            });
        }
        self.pump();
    }

    /// Ticks every registered member once, in an unspecified but stable
    /// order. Convenience for scenario tests driving a whole group.
    pub fn tick_all(&mut self, now: f64) {
        let ids: Vec<MemberId> = self.members.keys().cloned().collect();
        for id in ids {
            self.tick_member(&id, now);
        }
    }

    fn pump(&mut self) {
        while let Some(QueuedSend { to, message, from }) = self.queue.pop_front() {
            let Some(bytes) = self.transport.send(&to, &message, &from) else {
                continue;
            };
            let Some(decoded) = self.transport.on_incoming(&bytes) else {
                continue;
            };
            self.dispatch_incoming(&to, decoded, &from);
        }
    }

    fn dispatch_incoming(&mut self, to: &MemberId, message: Message, from: &MemberId) {
        match self.members.get_mut(to) {
            Some(membership) => {
                let outbound = membership.on_incoming(message, from.clone());
                for (next_to, next_message) in outbound {
                    self.queue.push_back(QueuedSend {
                        to: next_to,
                        message: next_message,
                        from: to.clone(),
                    });
                }
            }
            None => self.routing_fault(to),
        }
    }

    fn routing_fault(&self, address: &MemberId) {
        let fault = crate::error::SwimError::Routing {
            address: address.clone(),
        };
        error!("{fault}");
        debug_assert!(false, "{fault}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ack, ping};
    use crate::transport::LoopbackTransport;

    fn harness() -> Router<LoopbackTransport> {
        let mut router: Router<LoopbackTransport> = Router::new(LoopbackTransport::new());
        for (id, peers) in [("A", ["B", "C"]), ("B", ["A", "C"]), ("C", ["A", "B"])] {
            router.register(
                MemberId::new(id),
                Membership::new(MemberId::new(id), peers.iter().map(|p| MemberId::new(*p)).collect(), false),
            );
        }
        router
    }

    #[test]
    fn a_direct_probe_resolves_alive_within_one_router_turn() {
        let mut router = harness();
        router.tick_member(&MemberId::new("A"), 0.0);

        // Whichever peer A's round-robin cursor picked, the resulting
        // ping/ack cascade must resolve within this single turn.
        let a = router.member(&MemberId::new("A")).unwrap();
        let probed = ["B", "C"]
            .into_iter()
            .map(MemberId::new)
            .find(|id| a.remote_state(id) == Some(crate::message::LivenessState::Alive));
        assert!(probed.is_some(), "A's probe target must resolve Alive in one turn");
    }

    #[test]
    fn transport_counts_both_legs_of_a_ping_ack_exchange() {
        let mut router = harness();
        router.send_to(&MemberId::new("B"), ping(), &MemberId::new("A"));
        assert_eq!(router.transport().sent_messages(), 2);
        assert_eq!(router.transport().received_messages(), 2);
    }

    #[test]
    fn ack_without_an_active_transaction_or_correlation_is_ignored() {
        let mut router = harness();
        router.send_to(&MemberId::new("A"), ack(None), &MemberId::new("B"));
        assert_eq!(router.transport().sent_messages(), 1);
        assert_eq!(router.transport().received_messages(), 1);
    }
}
