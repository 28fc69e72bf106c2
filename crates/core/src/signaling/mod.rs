//! Control-plane signaling: envelopes and the relay transport contract

mod envelope;
mod relay;

pub use envelope::{CandidateInit, SignalEnvelope, SignalPayload};
pub use relay::{RelayEvent, RelayTransport};
