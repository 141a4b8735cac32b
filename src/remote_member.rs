//! Per-peer state. `RemoteMember` holds no back-reference to its owning
//! `Membership` — `Membership` instead owns a `Vec<RemoteMember>` and
//! addresses entries by index, so behavior that needs to reach other
//! peers (`handle_incoming`, `send_ping`, `send_ping_reqs`) is implemented
//! as index-addressed methods on `Membership` itself (see membership.rs)
//! rather than as inherent methods here. This type stays pure data.

use crate::message::{Incarnation, LivenessState, MemberId};
use crate::transaction::FailureDetectionTransaction;

#[derive(Debug, Clone)]
pub(crate) struct RemoteMember {
    pub(crate) remote_member_id: MemberId,
    pub(crate) incarnation: Incarnation,
    pub(crate) state: LivenessState,
    pub(crate) active_transaction: Option<FailureDetectionTransaction>,
}

impl RemoteMember {
    pub(crate) fn new(remote_member_id: MemberId) -> Self {
        RemoteMember {
            remote_member_id,
            incarnation: 0,
            state: LivenessState::Unknown,
            active_transaction: None,
        }
    }

    pub(crate) fn is_currently_being_checked(&self) -> bool {
        self.active_transaction.is_some()
    }
}
