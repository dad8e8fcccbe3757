//! Bucket choosers
//!
//! A chooser deterministically maps a key to one bucket, or to `k` distinct
//! buckets, out of a fixed bucket list. The planner only relies on the
//! [`Chooser`] contract; two implementations are provided:
//!
//! - [`JumpChooser`]: jump consistent hash over a seahash of the key.
//! - [`RendezvousChooser`]: highest random weight over seahash scores.

use serde::{Deserialize, Serialize};

use super::bucket_set::Bucket;
use crate::error::{ReshardError, ReshardResult};

/// Deterministic key to bucket selection for a fixed bucket list
pub trait Chooser: Send + Sync {
    /// Install the bucket list. Empty or duplicate lists are rejected.
    fn set_buckets(&mut self, buckets: &[Bucket]) -> ReshardResult<()>;

    /// Currently installed buckets
    fn buckets(&self) -> &[Bucket];

    /// Pick a single bucket for `key`
    fn choose(&self, key: &str) -> ReshardResult<Bucket>;

    /// Pick `n` distinct buckets for `key`, in preference order
    fn choose_replicas(&self, key: &str, n: usize) -> ReshardResult<Vec<Bucket>>;
}

/// Which chooser implementation to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChooserKind {
    #[default]
    Jump,
    Rendezvous,
}

impl ChooserKind {
    pub fn build(self) -> Box<dyn Chooser> {
        match self {
            ChooserKind::Jump => Box::new(JumpChooser::new()),
            ChooserKind::Rendezvous => Box::new(RendezvousChooser::new()),
        }
    }
}

impl std::fmt::Display for ChooserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChooserKind::Jump => write!(f, "jump"),
            ChooserKind::Rendezvous => write!(f, "rendezvous"),
        }
    }
}

fn validate_buckets(buckets: &[Bucket]) -> ReshardResult<()> {
    if buckets.is_empty() {
        return Err(ReshardError::InvalidBucketSet(
            "empty bucket list".to_string(),
        ));
    }
    for (i, bucket) in buckets.iter().enumerate() {
        if buckets[..i].contains(bucket) {
            return Err(ReshardError::InvalidBucketSet(format!(
                "duplicate bucket '{}'",
                bucket
            )));
        }
    }
    Ok(())
}

fn check_replica_count(n: usize, available: usize) -> ReshardResult<()> {
    if available == 0 {
        return Err(ReshardError::InvalidBucketSet(
            "no buckets configured".to_string(),
        ));
    }
    if n > available {
        return Err(ReshardError::InsufficientBuckets {
            requested: n,
            available,
        });
    }
    Ok(())
}

/// Jump consistent hash (Lamping & Veach).
///
/// Maps `key` to `[0, num_buckets)`. Growing from N to N+1 buckets moves
/// only ~1/(N+1) of the keys, all of them onto the new last bucket.
pub fn jump_consistent_hash(key: u64, num_buckets: usize) -> usize {
    let mut k = key;
    let mut b: i64 = -1;
    let mut j: i64 = 0;

    while j < num_buckets as i64 {
        b = j;
        k = k.wrapping_mul(2862933555777941757).wrapping_add(1);
        j = ((b.wrapping_add(1) as f64) * (f64::from(1u32 << 31))
            / (((k >> 33).wrapping_add(1)) as f64)) as i64;
    }

    b.max(0) as usize
}

/// splitmix64 finalizer, used to derive the next replica's hash
fn remix(mut h: u64) -> u64 {
    h = h.wrapping_add(0x9E37_79B9_7F4A_7C15);
    h = (h ^ (h >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    h = (h ^ (h >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    h ^ (h >> 31)
}

/// Jump-hash chooser.
///
/// Replica `i` is picked by jump hash over the buckets not yet chosen, with
/// the key hash re-mixed between picks.
#[derive(Debug, Clone, Default)]
pub struct JumpChooser {
    buckets: Vec<Bucket>,
}

impl JumpChooser {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Chooser for JumpChooser {
    fn set_buckets(&mut self, buckets: &[Bucket]) -> ReshardResult<()> {
        validate_buckets(buckets)?;
        self.buckets = buckets.to_vec();
        Ok(())
    }

    fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    fn choose(&self, key: &str) -> ReshardResult<Bucket> {
        check_replica_count(1, self.buckets.len())?;
        let hash = seahash::hash(key.as_bytes());
        Ok(self.buckets[jump_consistent_hash(hash, self.buckets.len())].clone())
    }

    fn choose_replicas(&self, key: &str, n: usize) -> ReshardResult<Vec<Bucket>> {
        check_replica_count(n, self.buckets.len())?;

        let mut remaining: Vec<&Bucket> = self.buckets.iter().collect();
        let mut hash = seahash::hash(key.as_bytes());
        let mut chosen = Vec::with_capacity(n);

        for _ in 0..n {
            let idx = jump_consistent_hash(hash, remaining.len());
            chosen.push(remaining.remove(idx).clone());
            hash = remix(hash);
        }

        Ok(chosen)
    }
}

/// Rendezvous (highest random weight) chooser
#[derive(Debug, Clone, Default)]
pub struct RendezvousChooser {
    buckets: Vec<Bucket>,
}

impl RendezvousChooser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deterministic score = seahash(key || 0xFF || bucket)
    fn score(key: &str, bucket: &str) -> u64 {
        let mut bytes = Vec::with_capacity(key.len() + bucket.len() + 1);
        bytes.extend_from_slice(key.as_bytes());
        bytes.push(0xFF);
        bytes.extend_from_slice(bucket.as_bytes());
        seahash::hash(&bytes)
    }

    fn ranked(&self, key: &str) -> Vec<&Bucket> {
        let mut scored: Vec<(u64, usize)> = self
            .buckets
            .iter()
            .enumerate()
            .map(|(i, b)| (Self::score(key, b), i))
            .collect();
        // Highest score first, earlier bucket wins ties
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        scored.into_iter().map(|(_, i)| &self.buckets[i]).collect()
    }
}

impl Chooser for RendezvousChooser {
    fn set_buckets(&mut self, buckets: &[Bucket]) -> ReshardResult<()> {
        validate_buckets(buckets)?;
        self.buckets = buckets.to_vec();
        Ok(())
    }

    fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    fn choose(&self, key: &str) -> ReshardResult<Bucket> {
        check_replica_count(1, self.buckets.len())?;
        Ok(self.ranked(key)[0].clone())
    }

    fn choose_replicas(&self, key: &str, n: usize) -> ReshardResult<Vec<Bucket>> {
        check_replica_count(n, self.buckets.len())?;
        Ok(self.ranked(key).into_iter().take(n).cloned().collect())
    }
}
