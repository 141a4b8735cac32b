use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque, equatable, hashable identifier for a member of the process group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId(String);

impl MemberId {
    pub fn new(id: impl Into<String>) -> Self {
        MemberId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MemberId {
    fn from(s: &str) -> Self {
        MemberId::new(s)
    }
}

impl From<String> for MemberId {
    fn from(s: String) -> Self {
        MemberId::new(s)
    }
}

/// Per-member monotonic version number, used to linearize competing claims
/// about that member's liveness (a higher incarnation overrides a lower one).
pub type Incarnation = u64;

/// Liveness view of a remote member. `Suspect` is reserved (see the
/// `Suspect` Open Question resolved in DESIGN.md); this core only ever
/// assigns `Unknown`, `Alive` or `Dead`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessState {
    Unknown,
    Alive,
    Dead,
}

/// Correlation metadata present on a `ping_req`, its `ping_req_ack`, and on
/// the `ping`/`ack` sent on behalf of a `ping_req`. Its presence on a
/// ping/ack is the sole mechanism by which an ack on behalf of another
/// probe gets routed back to the originator as a `ping_req_ack`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correlation {
    pub requested_by_member_id: MemberId,
    pub member_id_to_ping: MemberId,
}

/// Epidemic-dissemination rider carried on ping/ack messages.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PiggybackPayload {
    pub alive: Vec<(MemberId, Incarnation)>,
    pub dead: Vec<(MemberId, Incarnation)>,
}

impl PiggybackPayload {
    pub fn is_empty(&self) -> bool {
        self.alive.is_empty() && self.dead.is_empty()
    }
}

/// One of the four SWIM protocol messages, plus the inert `Test` message
/// used only for non-SWIM broadcast scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Ping,
    Ack,
    PingReq,
    PingReqAck,
    Test,
}

impl MessageKind {
    fn as_wire_name(&self) -> &'static str {
        match self {
            MessageKind::Ping => "ping",
            MessageKind::Ack => "ack",
            MessageKind::PingReq => "ping_req",
            MessageKind::PingReqAck => "ping_req_ack",
            MessageKind::Test => "test",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_wire_name())
    }
}

/// A tagged SWIM protocol message.
///
/// `PartialEq` deliberately ignores `piggyback`: protocol logic routes on
/// `kind` + `meta` alone, while piggyback is transient epidemic gossip.
/// Use [`Message::eq_strict`] when piggyback contents matter, e.g. in a
/// round-trip test.
#[derive(Debug, Clone)]
pub struct Message {
    pub kind: MessageKind,
    pub meta: Option<Correlation>,
    pub piggyback: Option<PiggybackPayload>,
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.equals_ignoring_piggyback(other)
    }
}
impl Eq for Message {}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(meta={:?}, piggyback={:?})",
            self.kind, self.meta, self.piggyback
        )
    }
}

impl Message {
    pub fn equals_ignoring_piggyback(&self, other: &Self) -> bool {
        self.kind == other.kind && self.meta == other.meta
    }

    pub fn eq_strict(&self, other: &Self) -> bool {
        self.equals_ignoring_piggyback(other) && self.piggyback == other.piggyback
    }

    pub fn with_piggyback(mut self, piggyback: PiggybackPayload) -> Self {
        self.piggyback = Some(piggyback);
        self
    }
}

/// Factory for a `ping` message, with no correlation metadata.
pub fn ping() -> Message {
    Message {
        kind: MessageKind::Ping,
        meta: None,
        piggyback: None,
    }
}

/// Factory for a `ping` message carrying the correlation metadata of the
/// `ping_req` it's being sent on behalf of.
pub fn ping_with_meta(meta: Correlation) -> Message {
    Message {
        kind: MessageKind::Ping,
        meta: Some(meta),
        piggyback: None,
    }
}

/// Factory for an `ack`, optionally forwarding correlation metadata from
/// the ping it answers.
pub fn ack(meta: Option<Correlation>) -> Message {
    Message {
        kind: MessageKind::Ack,
        meta,
        piggyback: None,
    }
}

/// Factory for a `ping_req` asking `member_id_to_ping` to be probed on
/// behalf of `requested_by_member_id`.
pub fn ping_req(requested_by_member_id: MemberId, member_id_to_ping: MemberId) -> Message {
    Message {
        kind: MessageKind::PingReq,
        meta: Some(Correlation {
            requested_by_member_id,
            member_id_to_ping,
        }),
        piggyback: None,
    }
}

/// Factory for a `ping_req_ack` reporting that `member_id_to_ping` was
/// reachable, bound for `requested_by_member_id`.
pub fn ping_req_ack(requested_by_member_id: MemberId, member_id_to_ping: MemberId) -> Message {
    Message {
        kind: MessageKind::PingReqAck,
        meta: Some(Correlation {
            requested_by_member_id,
            member_id_to_ping,
        }),
        piggyback: None,
    }
}

/// Factory for the inert `test` message used by non-SWIM broadcast tests.
pub fn test() -> Message {
    Message {
        kind: MessageKind::Test,
        meta: None,
        piggyback: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_req_carries_correlation() {
        let m = ping_req(MemberId::new("A"), MemberId::new("C"));
        assert_eq!(m.kind, MessageKind::PingReq);
        assert_eq!(
            m.meta,
            Some(Correlation {
                requested_by_member_id: MemberId::new("A"),
                member_id_to_ping: MemberId::new("C"),
            })
        );
    }

    #[test]
    fn equality_ignores_piggyback_but_strict_eq_does_not() {
        let a = ping().with_piggyback(PiggybackPayload {
            alive: vec![(MemberId::new("X"), 1)],
            dead: vec![],
        });
        let b = ping().with_piggyback(PiggybackPayload {
            alive: vec![(MemberId::new("Y"), 4)],
            dead: vec![],
        });
        assert_eq!(a, b);
        assert!(a.equals_ignoring_piggyback(&b));
        assert!(!a.eq_strict(&b));
    }

    #[test]
    fn piggyback_payload_is_empty_only_with_no_alive_or_dead_rows() {
        assert!(PiggybackPayload::default().is_empty());
        let with_alive = PiggybackPayload {
            alive: vec![(MemberId::new("A"), 1)],
            dead: vec![],
        };
        assert!(!with_alive.is_empty());
        let with_dead = PiggybackPayload {
            alive: vec![],
            dead: vec![(MemberId::new("A"), 1)],
        };
        assert!(!with_dead.is_empty());
    }
}
