use thiserror::Error;

use crate::message::MemberId;

/// Errors surfaced by the protocol core.
///
/// Per the error-handling policy: [`SwimError::Deserialization`] is the only
/// variant that ever escapes a public method as a real `Err`. The others
/// describe faults that are logged and absorbed internally (see
/// [`crate::transport::MessageTransport::on_incoming`],
/// [`crate::membership::Membership::on_incoming`] and
/// [`crate::membership::Membership::member_indirectly_reachable`]); they exist
/// as a type mainly so those call sites have something uniform to log.
#[derive(Error, Debug)]
pub enum SwimError {
    /// The codec could not reconstruct a `Message` from a buffer: malformed
    /// encoding, or a well-formed document missing a required field.
    #[error("failed to deserialize SWIM message: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// The buffer parsed as well-formed JSON but named a `message_name`
    /// outside the four protocol messages (plus `test`).
    #[error("unrecognized message name '{name}'")]
    UnknownMessageName { name: String },

    /// A message arrived claiming a `from_sender_id` not present in the
    /// local `Membership`'s remote member set. Normal during churn.
    #[error("message from unknown sender '{member_id}'")]
    UnknownSender { member_id: MemberId },

    /// `member_indirectly_reachable` was called for a member_id not
    /// present in the local remote member set.
    #[error("member_indirectly_reachable for unknown member '{member_id}'")]
    UnknownTarget { member_id: MemberId },

    /// The router received an inbound message addressed to a member_id it
    /// has no registration for. Indicates a programmer error, not a normal
    /// protocol fault.
    #[error("no membership registered for address '{address}'")]
    Routing { address: MemberId },
}
