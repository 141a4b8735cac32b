//! Per-probe failure-detection state machine:
//! `ping_sent -> ping_req_sent -> alive | failure_detected`. The absence
//! of a transaction (`RemoteMember::active_transaction == None`) stands in
//! for the `idle` state.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransactionState {
    PingSent,
    PingReqSent,
    Alive,
    FailureDetected,
}

/// What `on_tick` decided should happen. The caller (`Membership`, acting
/// on `RemoteMember`'s behalf) performs the corresponding side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    NoOp,
    EscalateToPingReq,
    Failed,
}

#[derive(Debug, Clone)]
pub(crate) struct FailureDetectionTransaction {
    start_time: f64,
    state: TransactionState,
    response_timeout: f64,
}

impl FailureDetectionTransaction {
    /// Starts a transaction at `now`; the caller is responsible for
    /// actually sending the ping.
    pub(crate) fn start(now: f64, response_timeout: f64) -> Self {
        FailureDetectionTransaction {
            start_time: now,
            state: TransactionState::PingSent,
            response_timeout,
        }
    }

    pub(crate) fn state(&self) -> TransactionState {
        self.state
    }

    /// Advances the transaction against the monotonic clock, escalating to
    /// an indirect probe after one `response_timeout`, and failing the
    /// target after the full `2 * response_timeout` window.
    pub(crate) fn on_tick(&mut self, now: f64) -> TickOutcome {
        match self.state {
            TransactionState::PingSent if now > self.start_time + self.response_timeout => {
                self.state = TransactionState::PingReqSent;
                TickOutcome::EscalateToPingReq
            }
            TransactionState::PingReqSent if now > self.start_time + 2.0 * self.response_timeout => {
                self.state = TransactionState::FailureDetected;
                TickOutcome::Failed
            }
            _ => TickOutcome::NoOp,
        }
    }

    /// A direct ack always resolves the transaction as alive, even from
    /// `ping_req_sent` — direct liveness overrides a pending indirect probe.
    pub(crate) fn on_ack(&mut self) {
        self.state = TransactionState::Alive;
    }

    /// A successful indirect probe resolves the transaction as alive.
    pub(crate) fn on_ping_req_ack(&mut self) {
        self.state = TransactionState::Alive;
    }

    pub(crate) fn is_terminal(&self) -> bool {
        matches!(self.state, TransactionState::Alive | TransactionState::FailureDetected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalates_after_response_timeout_then_fails_after_the_full_window() {
        let mut txn = FailureDetectionTransaction::start(0.0, 2.0);
        assert_eq!(txn.on_tick(1.0), TickOutcome::NoOp);
        assert_eq!(txn.on_tick(2.5), TickOutcome::EscalateToPingReq);
        assert_eq!(txn.on_tick(3.0), TickOutcome::NoOp);
        assert_eq!(txn.on_tick(4.5), TickOutcome::Failed);
    }

    #[test]
    fn a_direct_ack_resolves_alive_even_after_escalation() {
        let mut txn = FailureDetectionTransaction::start(0.0, 2.0);
        txn.on_tick(2.5);
        assert_eq!(txn.state(), TransactionState::PingReqSent);
        txn.on_ack();
        assert_eq!(txn.state(), TransactionState::Alive);
        assert!(txn.is_terminal());
    }

    #[test]
    fn an_indirect_ack_also_resolves_alive() {
        let mut txn = FailureDetectionTransaction::start(0.0, 2.0);
        txn.on_tick(2.5);
        txn.on_ping_req_ack();
        assert_eq!(txn.state(), TransactionState::Alive);
    }
}
