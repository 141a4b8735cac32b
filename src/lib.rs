//! Core SWIM membership and failure-detection protocol: a per-peer
//! probe/failure-detection state machine, a randomized round-robin probe
//! selector with indirect-probe fallback, a small typed message protocol
//! routed over a pluggable transport, and piggyback (infection-style)
//! dissemination riding on ping/ack traffic.
//!
//! The crate is organized bottom-up, matching its own data flow:
//! [`message`] (the wire vocabulary) → [`codec`] (pure (de)serialization)
//! → [`transport`] (byte-level delivery, pluggable) → [`router`]
//! (address → `Membership` dispatch) → [`membership`] (the protocol
//! driver, internally backed by the per-peer state in `remote_member`
//! and the per-probe state machine in `transaction`).
//!
//! The core is single-threaded and cooperative: nothing here spawns a
//! thread or blocks. A production embedder drives time by calling
//! `Router::tick_member`/`tick_all` on an interval and feeds inbound
//! bytes from its own transport implementation; for cross-thread entry
//! points, wrap each `Router` in a single mutex (or otherwise serialize
//! entry) rather than adding locking inside the core itself.
#[macro_use]
extern crate log;

pub mod codec;
pub mod constants;
pub mod error;
pub mod membership;
pub mod message;
mod remote_member;
pub mod router;
mod transaction;
pub mod transport;

pub use error::SwimError;
pub use membership::Membership;
pub use message::{ack, ping, ping_req, ping_req_ack, test, MemberId, Message, MessageKind};
pub use router::Router;
pub use transport::{LoopbackTransport, MessageTransport};
