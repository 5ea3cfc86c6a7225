use std::collections::VecDeque;
use std::sync::Arc;

use crate::log::LogSink;
use crate::peer::{IceCandidate, PeerLink};
use crate::{sink_debug, sink_trace, sink_warn};

/// FIFO of remote candidates waiting for the link's remote description.
///
/// Each candidate is applied at most once, in arrival order, and never before
/// the remote description is set. A candidate the link rejects is logged and
/// dropped.
pub struct CandidateBuffer {
    queue: VecDeque<IceCandidate>,
    logger: Arc<dyn LogSink>,
}

impl CandidateBuffer {
    pub fn new(logger: Arc<dyn LogSink>) -> Self {
        Self {
            queue: VecDeque::new(),
            logger,
        }
    }

    pub fn enqueue(&mut self, candidate: IceCandidate) {
        sink_trace!(self.logger, "[ice] queued candidate {}", candidate.candidate);
        self.queue.push_back(candidate);
    }

    /// Applies `candidate` right away when `link` has a remote description,
    /// otherwise queues it. Returns true if it was applied.
    pub async fn offer(&mut self, candidate: IceCandidate, link: Option<&dyn PeerLink>) -> bool {
        match link {
            Some(link) if link.has_remote_description() && self.queue.is_empty() => {
                self.apply(link, candidate).await
            }
            Some(link) if link.has_remote_description() => {
                // Keep arrival order behind anything still queued.
                self.queue.push_back(candidate);
                self.flush(link).await > 0
            }
            _ => {
                self.enqueue(candidate);
                false
            }
        }
    }

    /// Applies every queued candidate in order and empties the queue.
    ///
    /// Does nothing while the link has no remote description. Returns the
    /// number of candidates the link accepted.
    pub async fn flush(&mut self, link: &dyn PeerLink) -> usize {
        if !link.has_remote_description() {
            if !self.queue.is_empty() {
                sink_debug!(
                    self.logger,
                    "[ice] flush deferred, {} candidates wait for remote description",
                    self.queue.len()
                );
            }
            return 0;
        }
        let mut applied = 0;
        while let Some(candidate) = self.queue.pop_front() {
            if self.apply(link, candidate).await {
                applied += 1;
            }
        }
        applied
    }

    async fn apply(&self, link: &dyn PeerLink, candidate: IceCandidate) -> bool {
        match link.add_ice_candidate(candidate.clone()).await {
            Ok(()) => true,
            Err(e) => {
                sink_warn!(
                    self.logger,
                    "[ice] dropping candidate {}: {}",
                    candidate.candidate,
                    e
                );
                false
            }
        }
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::{LogLevel, MemoryLogSink, NoopLogSink};
    use crate::peer::{PeerLink, SessionDescription};
    use crate::sim::SimPeerLink;

    fn cand(s: &str) -> IceCandidate {
        IceCandidate::new(s).with_mid("0", 0)
    }

    async fn link_with_remote_offer() -> Arc<SimPeerLink> {
        let link = SimPeerLink::detached();
        link.set_remote_description(SessionDescription::offer("v=0 remote"))
            .await
            .unwrap();
        link
    }

    #[tokio::test]
    async fn queued_candidates_flush_in_arrival_order() {
        let link = SimPeerLink::detached();
        let mut buf = CandidateBuffer::new(Arc::new(NoopLogSink));
        for c in ["A", "B", "C"] {
            assert!(!buf.offer(cand(c), Some(&*link)).await);
        }
        assert_eq!(buf.flush(&*link).await, 0, "no remote description yet");
        assert_eq!(buf.len(), 3);

        link.set_remote_description(SessionDescription::offer("v=0 remote"))
            .await
            .unwrap();
        assert_eq!(buf.flush(&*link).await, 3);
        assert!(buf.is_empty());
        assert_eq!(buf.flush(&*link).await, 0, "flush is idempotent");

        let applied: Vec<_> = link
            .applied_candidates()
            .into_iter()
            .map(|c| c.candidate)
            .collect();
        assert_eq!(applied, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn late_candidate_applies_immediately() {
        let link = link_with_remote_offer().await;
        let mut buf = CandidateBuffer::new(Arc::new(NoopLogSink));
        assert!(buf.offer(cand("D"), Some(&*link)).await);
        assert!(buf.is_empty());
        assert_eq!(link.applied_candidates().len(), 1);
    }

    #[tokio::test]
    async fn candidate_without_link_is_queued() {
        let mut buf = CandidateBuffer::new(Arc::new(NoopLogSink));
        assert!(!buf.offer(cand("E"), None).await);
        assert_eq!(buf.len(), 1);
        buf.clear();
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn rejected_candidate_is_logged_and_dropped() {
        let link = link_with_remote_offer().await;
        let mem = Arc::new(MemoryLogSink::new());
        let mut buf = CandidateBuffer::new(mem.clone());
        buf.enqueue(cand("bad-candidate"));
        buf.enqueue(cand("F"));

        assert_eq!(buf.flush(&*link).await, 1);
        assert!(buf.is_empty());
        assert!(mem.contains(LogLevel::Warn, "dropping candidate bad-candidate"));
        assert_eq!(link.applied_candidates()[0].candidate, "F");
    }
}
