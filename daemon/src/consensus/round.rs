use serde::{Deserialize, Serialize};
use std::fmt;

/// Consensus round. `block_round` advances with every committed block,
/// `reject_round` counts agreement failures within one block round and
/// resets to zero on commit. Ordering is lexicographic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Round {
    pub block_round: u64,
    pub reject_round: u64,
}

impl Round {
    pub fn new(block_round: u64, reject_round: u64) -> Self {
        Self {
            block_round,
            reject_round,
        }
    }

    /// Round of the next block after this one committed.
    pub fn next_block_round(&self) -> Round {
        Round::new(self.block_round + 1, 0)
    }

    /// Next attempt within the same block round.
    pub fn next_reject_round(&self) -> Round {
        Round::new(self.block_round, self.reject_round + 1)
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.block_round, self.reject_round)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexicographic_order() {
        assert!(Round::new(1, 5) < Round::new(2, 0));
        assert!(Round::new(2, 0) < Round::new(2, 1));
        assert_eq!(Round::new(3, 3), Round::new(3, 3));
    }

    #[test]
    fn test_transitions() {
        let round = Round::new(4, 2);
        assert_eq!(round.next_block_round(), Round::new(5, 0));
        assert_eq!(round.next_reject_round(), Round::new(4, 3));
    }
}
