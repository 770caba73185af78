//! Top-k operator: retains the k best messages by quality score.
//!
//! Ranking is by quality score descending (unscored messages rank as
//! zero), ties broken by ascending uid. The plain variant emits the final
//! ranking at end of stream; the incremental variant re-emits a message
//! whenever it enters the current top-k.

use std::cmp::Ordering;

use crate::message::Message;

use super::{Operator, OperatorCore, OperatorKind};

/// Metadata key carrying a message's rank at emission time (0 = best).
pub const TOPK_RANK: &str = "topk.rank";

/// Best-k retention node.
pub struct TopKOperator {
    core: OperatorCore,
    k: usize,
    incremental: bool,
    ranked: Vec<Message>,
}

impl TopKOperator {
    /// Creates a top-k operator that emits the ranking at end of stream.
    #[must_use]
    pub fn new(name: impl Into<String>, k: usize) -> Self {
        Self {
            core: OperatorCore::new(name, OperatorKind::TopK),
            k: k.max(1),
            incremental: false,
            ranked: Vec::new(),
        }
    }

    /// Creates the incremental variant: every entry into the current
    /// top-k is emitted immediately.
    #[must_use]
    pub fn incremental(name: impl Into<String>, k: usize) -> Self {
        Self {
            core: OperatorCore::new(name, OperatorKind::ITopK),
            k: k.max(1),
            incremental: true,
            ranked: Vec::new(),
        }
    }

    /// The retention bound.
    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }

    fn rank_of(&self, message: &Message) -> usize {
        self.ranked
            .binary_search_by(|probe| compare(probe, message))
            .unwrap_or_else(|insert_at| insert_at)
    }
}

/// Descending score, ascending uid.
fn compare(a: &Message, b: &Message) -> Ordering {
    let sa = a.quality_score().unwrap_or(0.0);
    let sb = b.quality_score().unwrap_or(0.0);
    sb.partial_cmp(&sa).unwrap_or(Ordering::Equal).then_with(|| a.uid().cmp(&b.uid()))
}

impl Operator for TopKOperator {
    fn core(&self) -> &OperatorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut OperatorCore {
        &mut self.core
    }

    fn process(&mut self, input: Option<Message>, _slot: usize) -> bool {
        let Some(message) = input else {
            return false;
        };
        self.core.count_processed();

        let rank = self.rank_of(&message);
        if rank >= self.k {
            // Not good enough to displace anything.
            return false;
        }

        let mut emitted = false;
        if self.incremental {
            let mut copy = message.replicate();
            copy.set_metadata(TOPK_RANK, rank.to_string());
            self.core.emit(copy);
            emitted = true;
        }
        self.ranked.insert(rank, message);
        self.ranked.truncate(self.k);
        emitted
    }

    fn finish(&mut self) -> bool {
        if self.incremental {
            // Updates were streamed as they happened.
            self.ranked.clear();
            return false;
        }
        if self.ranked.is_empty() {
            return false;
        }
        for (rank, mut msg) in self.ranked.drain(..).enumerate() {
            msg.set_metadata(TOPK_RANK, rank.to_string());
            self.core.emit(msg);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(uid: u64, score: f32) -> Message {
        let mut msg = Message::text(uid, "x");
        msg.set_quality_score(score);
        msg
    }

    #[test]
    fn retains_best_k_and_emits_ranking_at_finish() {
        let mut op = TopKOperator::new("top2", 2);
        op.process(Some(scored(1, 0.2)), 0);
        op.process(Some(scored(2, 0.9)), 0);
        op.process(Some(scored(3, 0.5)), 0);
        assert!(op.take_emitted().is_empty());

        assert!(op.finish());
        let out = op.take_emitted();
        let uids: Vec<u64> = out.iter().map(Message::uid).collect();
        assert_eq!(uids, vec![2, 3]);
        assert_eq!(out[0].metadata(TOPK_RANK), Some("0"));
        assert_eq!(out[1].metadata(TOPK_RANK), Some("1"));
    }

    #[test]
    fn low_scores_never_enter() {
        let mut op = TopKOperator::new("top1", 1);
        op.process(Some(scored(1, 0.9)), 0);
        assert!(!op.process(Some(scored(2, 0.1)), 0));
        op.finish();
        let out = op.take_emitted();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].uid(), 1);
    }

    #[test]
    fn incremental_emits_on_entry() {
        let mut op = TopKOperator::incremental("itop2", 2);
        assert!(op.process(Some(scored(1, 0.3)), 0));
        assert!(op.process(Some(scored(2, 0.7)), 0));
        // Worse than both incumbents: no emission.
        assert!(!op.process(Some(scored(3, 0.1)), 0));

        let out = op.take_emitted();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].uid(), 1);
        assert_eq!(out[0].metadata(TOPK_RANK), Some("0"));
        // uid 2 entered at rank 0, displacing uid 1.
        assert_eq!(out[1].uid(), 2);
        assert_eq!(out[1].metadata(TOPK_RANK), Some("0"));

        assert!(!op.finish());
        assert!(op.take_emitted().is_empty());
    }

    #[test]
    fn ties_rank_by_uid() {
        let mut op = TopKOperator::new("top2", 2);
        op.process(Some(scored(5, 0.5)), 0);
        op.process(Some(scored(3, 0.5)), 0);
        op.finish();
        let uids: Vec<u64> = op.take_emitted().iter().map(Message::uid).collect();
        assert_eq!(uids, vec![3, 5]);
    }
}
