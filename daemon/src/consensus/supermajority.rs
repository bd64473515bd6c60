//! Supermajority arithmetic under the k·f+1 consistency model.
//!
//! With `N = k·f + 1 + extra` peers, agreement needs `k·f + 1` matching
//! votes, which for a given `N` is every count `c` with `c·k > (k−1)·N`.
//! BFT uses k = 3 (3-of-4, 5-of-7), CFT k = 2 (3-of-4).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConsistencyModel {
    #[default]
    Bft,
    Cft,
}

impl ConsistencyModel {
    /// The free parameter of the k·f+1 model.
    pub fn kf1_parameter(&self) -> u64 {
        match self {
            ConsistencyModel::Bft => 3,
            ConsistencyModel::Cft => 2,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SupermajorityChecker {
    k: u64,
}

impl SupermajorityChecker {
    pub fn new(model: ConsistencyModel) -> Self {
        Self {
            k: model.kf1_parameter(),
        }
    }

    /// True when `current` same votes out of `all` peers are agreement.
    pub fn has_supermajority(&self, current: usize, all: usize) -> bool {
        let (current, all) = (current as u64, all as u64);
        current <= all && all > 0 && current * self.k > (self.k - 1) * all
    }

    /// True while some vote group could still reach supermajority once the
    /// peers who have not voted yet weigh in. Used for early reject
    /// detection.
    pub fn can_have_supermajority(&self, vote_groups: &[usize], all: usize) -> bool {
        let voted: usize = vote_groups.iter().sum();
        if voted > all {
            return false;
        }
        let not_voted = all - voted;
        if vote_groups.is_empty() {
            return self.has_supermajority(not_voted, all);
        }
        vote_groups
            .iter()
            .any(|group| self.has_supermajority(group + not_voted, all))
    }
}
