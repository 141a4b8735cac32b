//! The protocol driver: local member-id, known peers, incarnation, probe
//! cursor, and the probe/piggyback logic that ties `RemoteMember` and
//! `FailureDetectionTransaction` together.
//!
//! `Membership` never talks to a `Router` or `Transport` directly. Every
//! operation that would otherwise hand a message straight to a router
//! instead returns the `(MemberId, Message)` pairs it wants sent, the same
//! way a tick/process loop returns or accumulates outgoing messages for an
//! external driver to deliver, rather than reaching for a stored transport
//! handle. This sidesteps the reference cycle a literal `router: shared
//! reference` field would create once `Router` also owns the `Membership`
//! it would need to call back into — see DESIGN.md.

use std::fmt;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};

use crate::constants;
use crate::error::SwimError;
use crate::message::{ack, ping, ping_req, ping_req_ack, ping_with_meta};
use crate::message::{Incarnation, LivenessState, MemberId, Message, MessageKind, PiggybackPayload};
use crate::remote_member::RemoteMember;
use crate::transaction::{FailureDetectionTransaction, TickOutcome};

/// A message this `Membership` wants delivered, addressed to its recipient.
pub type Outbound = (MemberId, Message);

pub struct Membership {
    member_id: MemberId,
    incarnation: Incarnation,
    remote_members: Vec<RemoteMember>,
    probe_order: Vec<usize>,
    probe_cursor: usize,
    started: bool,
    enable_infection_dissemination: bool,
    response_timeout: f64,
    k: usize,
    rng: Box<dyn RngCore>,
}

impl Membership {
    /// Constructs a `Membership` with a non-deterministic RNG. Use
    /// [`Membership::with_rng`] in tests that need a deterministic probe
    /// order.
    pub fn new(member_id: MemberId, remote_member_ids: Vec<MemberId>, enable_infection_dissemination: bool) -> Self {
        Self::with_rng(
            member_id,
            remote_member_ids,
            enable_infection_dissemination,
            Box::new(StdRng::from_entropy()),
        )
    }

    pub fn with_rng(
        member_id: MemberId,
        remote_member_ids: Vec<MemberId>,
        enable_infection_dissemination: bool,
        rng: Box<dyn RngCore>,
    ) -> Self {
        Membership {
            member_id,
            // Incarnation only ever changes via the refutation rule in
            // `ingest_piggyback`; folded into the initial value here
            // rather than bumped by a separate construction-time step.
            incarnation: 1,
            remote_members: remote_member_ids.into_iter().map(RemoteMember::new).collect(),
            probe_order: Vec::new(),
            probe_cursor: 0,
            started: false,
            enable_infection_dissemination,
            response_timeout: constants::RESPONSE_TIMEOUT,
            k: constants::K,
            rng,
        }
    }

    pub fn with_response_timeout(mut self, response_timeout: f64) -> Self {
        self.response_timeout = response_timeout;
        self
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn member_id(&self) -> &MemberId {
        &self.member_id
    }

    pub fn incarnation(&self) -> Incarnation {
        self.incarnation
    }

    pub fn remote_state(&self, id: &MemberId) -> Option<LivenessState> {
        self.find_remote_index(id).map(|idx| self.remote_members[idx].state)
    }

    pub fn remote_incarnation(&self, id: &MemberId) -> Option<Incarnation> {
        self.find_remote_index(id).map(|idx| self.remote_members[idx].incarnation)
    }

    pub fn is_currently_checking(&self, id: &MemberId) -> bool {
        self.find_remote_index(id)
            .map(|idx| self.remote_members[idx].is_currently_being_checked())
            .unwrap_or(false)
    }

    /// Idempotent setup step. In the original, `start()` attaches the
    /// back-reference each `RemoteMember` holds to its owning
    /// `Membership`; that back-reference doesn't exist here (see the
    /// module doc comment), so `start()`'s remaining job is to eagerly
    /// materialize the probe cycle rather than wait for the first `tick`.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.ensure_probe_order();
        self.started = true;
    }

    /// One protocol period: escalate/resolve the in-flight probe (if any)
    /// on every peer, and begin a new probe on the next round-robin
    /// target if it isn't already being checked.
    pub fn tick(&mut self, time_now: f64) -> Vec<Outbound> {
        let mut outbound = Vec::new();

        if let Some(idx) = self.select_node_to_ping() {
            if !self.remote_members[idx].is_currently_being_checked() {
                self.remote_members[idx].active_transaction =
                    Some(FailureDetectionTransaction::start(time_now, self.response_timeout));
                outbound.extend(self.send_ping(idx));
            }
        }

        for idx in 0..self.remote_members.len() {
            outbound.extend(self.on_tick_for(idx, time_now));
        }

        outbound
    }

    /// Sends `message` to every remote member. Used only for non-SWIM
    /// diagnostics and tests.
    pub fn broadcast(&mut self, message: Message) -> Vec<Outbound> {
        let ids: Vec<MemberId> = self.remote_members.iter().map(|r| r.remote_member_id.clone()).collect();
        ids.into_iter().flat_map(|id| self.send_to(message.clone(), id)).collect()
    }

    /// Stamps piggyback (if infection dissemination is enabled) and
    /// returns the message addressed to `to_member_id`, ready to hand to
    /// a `Router`.
    pub fn send_to(&mut self, message: Message, to_member_id: MemberId) -> Vec<Outbound> {
        let message = if self.enable_infection_dissemination {
            message.with_piggyback(self.build_piggyback())
        } else {
            message
        };
        vec![(to_member_id, message)]
    }

    /// Dispatches an inbound message from `from_sender_id`. Unknown
    /// senders are logged and dropped.
    pub fn on_incoming(&mut self, message: Message, from_sender_id: MemberId) -> Vec<Outbound> {
        let idx = match self.find_remote_index(&from_sender_id) {
            Some(idx) => idx,
            None => {
                let fault = SwimError::UnknownSender {
                    member_id: from_sender_id,
                };
                warn!("{}: {fault} ({message})", self.member_id);
                return Vec::new();
            }
        };

        if let Some(piggyback) = message.piggyback.clone() {
            self.ingest_piggyback(&piggyback);
        }

        self.handle_incoming_for(idx, message)
    }

    /// Called when a `RemoteMember` receives a `ping_req_ack` concerning a
    /// different peer. Resolves that peer's active transaction, if any.
    pub fn member_indirectly_reachable(
        &mut self,
        member_id: MemberId,
        reachable_from: MemberId,
        message: Message,
    ) -> Vec<Outbound> {
        let idx = match self.find_remote_index(&member_id) {
            Some(idx) => idx,
            None => {
                let fault = SwimError::UnknownTarget { member_id };
                warn!("{}: {fault}", self.member_id);
                return Vec::new();
            }
        };
        debug!(
            "{}: {} reported reachable via {} ({})",
            self.member_id, member_id, reachable_from, message
        );
        if let Some(transaction) = self.remote_members[idx].active_transaction.as_mut() {
            transaction.on_ping_req_ack();
        }
        self.resolve_if_terminal(idx)
    }

    // --- probe-target / subgroup selection ---

    fn ensure_probe_order(&mut self) {
        if self.probe_order.len() != self.remote_members.len() {
            self.probe_order = (0..self.remote_members.len()).collect();
            self.probe_order.shuffle(&mut self.rng);
            self.probe_cursor = 0;
        }
    }

    fn select_node_to_ping(&mut self) -> Option<usize> {
        if self.remote_members.is_empty() {
            return None;
        }
        self.ensure_probe_order();
        let idx = self.probe_order[self.probe_cursor % self.probe_order.len()];
        self.probe_cursor = (self.probe_cursor + 1) % self.probe_order.len();
        Some(idx)
    }

    fn select_indices_to_ping_req(&mut self, target_idx: usize) -> Vec<usize> {
        let mut candidates: Vec<usize> = (0..self.remote_members.len())
            .filter(|&idx| idx != target_idx)
            .collect();
        candidates.shuffle(&mut self.rng);
        candidates.truncate(self.k);
        candidates
    }

    // --- piggyback construction / ingestion ---

    fn build_piggyback(&self) -> PiggybackPayload {
        let mut alive = vec![(self.member_id.clone(), self.incarnation)];
        let mut dead = Vec::new();
        for remote in &self.remote_members {
            match remote.state {
                LivenessState::Alive => alive.push((remote.remote_member_id.clone(), remote.incarnation)),
                LivenessState::Dead => dead.push((remote.remote_member_id.clone(), remote.incarnation)),
                LivenessState::Unknown => {}
            }
        }
        PiggybackPayload { alive, dead }
    }

    fn ingest_piggyback(&mut self, payload: &PiggybackPayload) {
        for (id, incarnation) in &payload.alive {
            if *id == self.member_id {
                continue;
            }
            if let Some(idx) = self.find_remote_index(id) {
                let remote = &mut self.remote_members[idx];
                if *incarnation >= remote.incarnation {
                    remote.incarnation = *incarnation;
                    remote.state = LivenessState::Alive;
                }
            }
        }
        for (id, incarnation) in &payload.dead {
            if *id == self.member_id {
                // Refutation: a claim of our own death is answered by
                // bumping our incarnation past it, remaining Alive.
                self.incarnation = self.incarnation.max(incarnation + 1);
                continue;
            }
            if let Some(idx) = self.find_remote_index(id) {
                let remote = &mut self.remote_members[idx];
                if *incarnation >= remote.incarnation {
                    remote.incarnation = *incarnation;
                    remote.state = LivenessState::Dead;
                }
            }
        }
    }

    // --- RemoteMember behavior, index-addressed ---

    fn send_ping(&mut self, idx: usize) -> Vec<Outbound> {
        let target = self.remote_members[idx].remote_member_id.clone();
        self.send_to(ping(), target)
    }

    fn send_ping_reqs(&mut self, idx: usize) -> Vec<Outbound> {
        let target_id = self.remote_members[idx].remote_member_id.clone();
        let proxies = self.select_indices_to_ping_req(idx);
        let local_id = self.member_id.clone();
        proxies
            .into_iter()
            .flat_map(|proxy_idx| {
                let proxy_id = self.remote_members[proxy_idx].remote_member_id.clone();
                self.send_to(ping_req(local_id.clone(), target_id.clone()), proxy_id)
            })
            .collect()
    }

    fn handle_incoming_for(&mut self, idx: usize, message: Message) -> Vec<Outbound> {
        if self.remote_members[idx].active_transaction.is_some() {
            match message.kind {
                MessageKind::Ack => {
                    self.remote_members[idx]
                        .active_transaction
                        .as_mut()
                        .expect("checked above")
                        .on_ack();
                    return self.resolve_if_terminal(idx);
                }
                MessageKind::PingReqAck => {
                    self.remote_members[idx]
                        .active_transaction
                        .as_mut()
                        .expect("checked above")
                        .on_ping_req_ack();
                    return self.resolve_if_terminal(idx);
                }
                _ => {}
            }
        }

        match message.kind {
            MessageKind::Ping => {
                let sender = self.remote_members[idx].remote_member_id.clone();
                self.send_to(ack(message.meta), sender)
            }
            MessageKind::PingReq => {
                let Some(meta) = message.meta else {
                    warn!(
                        "{}: ping_req without correlation metadata from {}",
                        self.member_id, self.remote_members[idx].remote_member_id
                    );
                    return Vec::new();
                };
                let target = meta.member_id_to_ping.clone();
                self.send_to(ping_with_meta(meta), target)
            }
            MessageKind::Ack => match message.meta {
                Some(meta) => {
                    let requested_by = meta.requested_by_member_id.clone();
                    self.send_to(
                        ping_req_ack(meta.requested_by_member_id, meta.member_id_to_ping),
                        requested_by,
                    )
                }
                // No active transaction and no correlation: no bearer for
                // this ack, silently ignored.
                None => Vec::new(),
            },
            MessageKind::PingReqAck => match message.meta.clone() {
                Some(meta)
                    if meta.requested_by_member_id == self.member_id
                        && meta.member_id_to_ping != self.remote_members[idx].remote_member_id =>
                {
                    let reachable_from = self.remote_members[idx].remote_member_id.clone();
                    self.member_indirectly_reachable(meta.member_id_to_ping, reachable_from, message)
                }
                _ => Vec::new(), // stale or misrouted
            },
            MessageKind::Test => Vec::new(),
        }
    }

    fn on_tick_for(&mut self, idx: usize, now: f64) -> Vec<Outbound> {
        let outcome = match self.remote_members[idx].active_transaction.as_mut() {
            Some(transaction) => transaction.on_tick(now),
            None => return Vec::new(),
        };
        match outcome {
            TickOutcome::NoOp => Vec::new(),
            TickOutcome::EscalateToPingReq => self.send_ping_reqs(idx),
            TickOutcome::Failed => {
                self.node_failed(idx);
                Vec::new()
            }
        }
    }

    fn resolve_if_terminal(&mut self, idx: usize) -> Vec<Outbound> {
        let Some(transaction) = self.remote_members[idx].active_transaction.as_ref() else {
            return Vec::new();
        };
        if !transaction.is_terminal() {
            return Vec::new();
        }
        use crate::transaction::TransactionState;
        match transaction.state() {
            TransactionState::Alive => self.node_alive(idx),
            TransactionState::FailureDetected => self.node_failed(idx),
            _ => unreachable!("is_terminal() implies Alive or FailureDetected"),
        }
        Vec::new()
    }

    fn node_alive(&mut self, idx: usize) {
        self.remote_members[idx].state = LivenessState::Alive;
        self.remote_members[idx].active_transaction = None;
    }

    fn node_failed(&mut self, idx: usize) {
        self.remote_members[idx].state = LivenessState::Dead;
        self.remote_members[idx].active_transaction = None;
    }

    fn find_remote_index(&self, id: &MemberId) -> Option<usize> {
        self.remote_members.iter().position(|r| &r.remote_member_id == id)
    }
}

impl fmt::Display for Membership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Membership({}, incarnation={}, peers={})",
            self.member_id,
            self.incarnation,
            self.remote_members.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::test as test_msg;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn deterministic(member_id: &str, peers: &[&str]) -> Membership {
        Membership::with_rng(
            MemberId::new(member_id),
            peers.iter().map(|p| MemberId::new(*p)).collect(),
            false,
            Box::new(StdRng::seed_from_u64(42)),
        )
    }

    #[test]
    fn probe_cycle_visits_every_peer_once_before_repeating() {
        let mut m = deterministic("A", &["B", "C", "D"]);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..3 {
            let idx = m.select_node_to_ping().unwrap();
            seen.insert(m.remote_members[idx].remote_member_id.clone());
        }
        assert_eq!(seen.len(), 3, "one full cycle must touch every peer exactly once");
    }

    #[test]
    fn at_most_one_transaction_per_remote_member() {
        let mut m = deterministic("A", &["B"]);
        m.tick(0.0);
        m.tick(0.1);
        let active = m.remote_members.iter().filter(|r| r.active_transaction.is_some()).count();
        assert!(active <= 1);
    }

    #[test]
    fn select_nodes_to_ping_req_excludes_the_target() {
        let mut m = deterministic("A", &["B", "C", "D", "E"]);
        let target_idx = 0;
        let proxies = m.select_indices_to_ping_req(target_idx);
        assert!(!proxies.contains(&target_idx));
        assert!(proxies.len() <= m.k);
    }

    #[test]
    fn refutation_bumps_incarnation_past_the_claimed_death() {
        let mut m = deterministic("A", &["B"]);
        let original = m.incarnation();
        m.ingest_piggyback(&PiggybackPayload {
            alive: vec![],
            dead: vec![(MemberId::new("A"), original + 5)],
        });
        assert_eq!(m.incarnation(), original + 6);
    }

    #[test]
    fn alive_ingestion_never_lowers_recorded_incarnation() {
        let mut m = deterministic("A", &["B"]);
        m.ingest_piggyback(&PiggybackPayload {
            alive: vec![(MemberId::new("B"), 5)],
            dead: vec![],
        });
        assert_eq!(m.remote_incarnation(&MemberId::new("B")), Some(5));
        m.ingest_piggyback(&PiggybackPayload {
            alive: vec![(MemberId::new("B"), 2)],
            dead: vec![],
        });
        assert_eq!(m.remote_incarnation(&MemberId::new("B")), Some(5));
    }

    #[test]
    fn unknown_sender_is_logged_and_dropped_without_panicking() {
        let mut m = deterministic("A", &["B"]);
        let outbound = m.on_incoming(test_msg(), MemberId::new("D"));
        assert!(outbound.is_empty());
    }

    #[test]
    fn ping_is_answered_with_an_ack_carrying_the_same_meta() {
        let mut m = deterministic("A", &["B"]);
        let outbound = m.on_incoming(ping(), MemberId::new("B"));
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].0, MemberId::new("B"));
        assert_eq!(outbound[0].1.kind, MessageKind::Ack);
    }

    #[test]
    fn with_response_timeout_shrinks_the_failure_detection_window() {
        let mut m = deterministic("A", &["B"]).with_response_timeout(1.0);
        assert_eq!(m.member_id(), &MemberId::new("A"));

        m.tick(0.0);
        assert!(m.is_currently_checking(&MemberId::new("B")));

        m.tick(1.5); // 1.5 > 0.0 + 1.0 -> escalate to the indirect probe
        assert!(m.is_currently_checking(&MemberId::new("B")));

        m.tick(2.5); // 2.5 > 0.0 + 2*1.0 -> failure detected
        assert_eq!(m.remote_state(&MemberId::new("B")), Some(LivenessState::Dead));
        assert!(!m.is_currently_checking(&MemberId::new("B")));
    }

    #[test]
    fn with_k_overrides_the_default_indirect_probe_fanout() {
        let mut m = deterministic("A", &["B", "C", "D", "E"]).with_k(1);
        let proxies = m.select_indices_to_ping_req(0);
        assert!(proxies.len() <= 1);
    }
}
