//! Accumulation of verified votes per result hash

use super::Vote;
use crate::{MemberIndex, ResultHash};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

/// Effect of recording one vote
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The vote was counted; `supporters` is the updated count for `hash`
    Counted { hash: ResultHash, supporters: usize },
    /// The sender already voted for `first_hash`; the vote was ignored
    DuplicateVote {
        sender: MemberIndex,
        first_hash: ResultHash,
    },
}

#[derive(Debug, Default)]
struct Support {
    signatures: BTreeMap<MemberIndex, Vec<u8>>,
    /// Sequence number of the vote that brought the hash to its current count
    reached_at: u64,
}

/// Verified votes of one session, keyed by result hash and by sender
#[derive(Debug, Default)]
pub struct ResultTally {
    support: HashMap<ResultHash, Support>,
    voted: HashMap<MemberIndex, ResultHash>,
    recorded: u64,
}

impl ResultTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a verified vote. Only the first vote of each sender counts.
    pub fn record(&mut self, vote: &Vote) -> RecordOutcome {
        if let Some(first_hash) = self.voted.get(&vote.sender_index()) {
            return RecordOutcome::DuplicateVote {
                sender: vote.sender_index(),
                first_hash: *first_hash,
            };
        }

        self.recorded += 1;
        self.voted.insert(vote.sender_index(), *vote.result_hash());

        let support = self.support.entry(*vote.result_hash()).or_default();
        support
            .signatures
            .insert(vote.sender_index(), vote.signature().to_vec());
        support.reached_at = self.recorded;

        RecordOutcome::Counted {
            hash: *vote.result_hash(),
            supporters: support.signatures.len(),
        }
    }

    /// Number of distinct senders supporting `hash`
    pub fn supporters_of(&self, hash: &ResultHash) -> usize {
        self.support
            .get(hash)
            .map_or(0, |support| support.signatures.len())
    }

    /// Hash with the most supporters.
    ///
    /// Among equally supported hashes the one that reached its count first
    /// wins. Returns `None` before any vote is recorded.
    pub fn leader(&self) -> Option<(ResultHash, usize)> {
        self.support
            .iter()
            .min_by_key(|(_, support)| (Reverse(support.signatures.len()), support.reached_at))
            .map(|(hash, support)| (*hash, support.signatures.len()))
    }

    /// Whether any hash has at least `threshold` supporters
    pub fn has_quorum(&self, threshold: usize) -> bool {
        self.support
            .values()
            .any(|support| support.signatures.len() >= threshold)
    }

    /// Signatures of the members supporting `hash`, by member index
    pub fn signatures_for(&self, hash: &ResultHash) -> BTreeMap<MemberIndex, Vec<u8>> {
        self.support
            .get(hash)
            .map(|support| support.signatures.clone())
            .unwrap_or_default()
    }

    /// Number of counted votes across all hashes
    pub fn votes_counted(&self) -> usize {
        self.voted.len()
    }
}
