//! Per-key replica set differences

use serde::Serialize;

use super::bucket_set::Bucket;

/// Buckets gained and lost by one key between two replica sets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Delta {
    /// In `new`, not in `old`; ordered as in `new`
    pub inc: Vec<Bucket>,
    /// In `old`, not in `new`; ordered as in `old`
    pub del: Vec<Bucket>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.inc.is_empty() && self.del.is_empty()
    }
}

/// Compute `new − old` and `old − new`
pub fn compute_delta(old: &[Bucket], new: &[Bucket]) -> Delta {
    Delta {
        inc: new.iter().filter(|b| !old.contains(b)).cloned().collect(),
        del: old.iter().filter(|b| !new.contains(b)).cloned().collect(),
    }
}
