//! Deterministic role arbitration
//!
//! Both peers independently compute the same role pair from the same two
//! identifiers, so no message exchange is needed to agree on who initiates.

use crate::session::Role;

/// Decide the local role from the two participant identifiers
///
/// Identifiers are compared with a fixed total order (lexicographic by
/// bytes); the larger identifier is the Caller. Re-invoked whenever a new
/// remote identifier is discovered; a fresh discovery after a departure is
/// a new epoch with a fresh decision.
pub fn decide_role(local_id: &str, remote_id: &str) -> Role {
    if local_id > remote_id {
        Role::Caller
    } else {
        Role::Listener
    }
}

/// Whether the local side yields on an offer collision
///
/// The side that is not the Caller is the polite one: it rolls back its own
/// outstanding offer and accepts the incoming one, so the Caller's offer
/// always wins within a single round-trip.
pub fn is_polite(role: Role) -> bool {
    role != Role::Caller
}
