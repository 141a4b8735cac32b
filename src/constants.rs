//! Protocol constants. Kept as defaults threaded through `Membership`'s
//! constructor rather than hard globals, so tests can shrink
//! `response_timeout` without touching production code paths.

/// Tick period: how often `Membership::tick` should be invoked in
/// production. The core never reads this itself — the caller drives time.
pub const T: f64 = 2.0;

/// Indirect-probe fanout: number of peers asked to ping_req a target that
/// missed its direct response window.
pub const K: usize = 3;

/// Per-phase response window. The full probe window before a target is
/// marked failed is `2 * RESPONSE_TIMEOUT`.
pub const RESPONSE_TIMEOUT: f64 = 2.0;
