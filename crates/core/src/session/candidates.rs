//! Buffer for connectivity candidates that arrive early
//!
//! The relay gives no ordering guarantee, so candidates routinely arrive
//! before the description they belong to. They are held here in arrival
//! order until the session has a remote description, then drained exactly
//! once; anything arriving later is applied immediately without buffering.

use crate::signaling::CandidateInit;

/// A buffered connectivity hint tied to its originating peer
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRecord {
    /// Identifier of the peer the candidate came from
    pub peer_id: String,
    /// The connectivity hint
    pub candidate: CandidateInit,
}

/// FIFO queue of candidates awaiting a remote description
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    queue: Vec<CandidateRecord>,
}

impl CandidateBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a candidate in arrival order
    pub fn enqueue(&mut self, peer_id: impl Into<String>, candidate: CandidateInit) {
        self.queue.push(CandidateRecord {
            peer_id: peer_id.into(),
            candidate,
        });
    }

    /// Take every buffered candidate, in arrival order, leaving the buffer
    /// empty
    pub fn drain(&mut self) -> Vec<CandidateRecord> {
        std::mem::take(&mut self.queue)
    }

    /// Discard all buffered candidates
    ///
    /// Stale candidates are never carried into a new epoch.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Number of buffered candidates
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(n: u16) -> CandidateInit {
        CandidateInit {
            candidate: format!("candidate:{}", n),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(n),
        }
    }

    #[test]
    fn test_drain_preserves_arrival_order() {
        let mut buffer = CandidateBuffer::new();
        for n in 0..5 {
            buffer.enqueue("bob", candidate(n));
        }

        let drained = buffer.drain();
        assert_eq!(drained.len(), 5);
        for (n, record) in drained.iter().enumerate() {
            assert_eq!(record.candidate.sdp_mline_index, Some(n as u16));
        }
    }

    #[test]
    fn test_drain_empties_the_buffer() {
        let mut buffer = CandidateBuffer::new();
        buffer.enqueue("bob", candidate(0));

        assert_eq!(buffer.drain().len(), 1);
        assert!(buffer.is_empty());
        assert!(buffer.drain().is_empty());
    }

    #[test]
    fn test_clear_discards_everything() {
        let mut buffer = CandidateBuffer::new();
        buffer.enqueue("bob", candidate(0));
        buffer.enqueue("bob", candidate(1));

        buffer.clear();
        assert!(buffer.is_empty());
    }
}
