//! Ordered, duplicate-free set of shard buckets

use serde::{Deserialize, Serialize};

use crate::error::{ReshardError, ReshardResult};

/// Identifies a shard bucket
pub type Bucket = String;

/// Ordered list of bucket names.
///
/// Insertion order is preserved. It drives copy-source round-robin and
/// report ordering, never correctness.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketSet {
    buckets: Vec<Bucket>,
}

impl BucketSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from a list, rejecting duplicates
    pub fn from_buckets<I, S>(buckets: I) -> ReshardResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<Bucket>,
    {
        let mut set = Self::new();
        for bucket in buckets {
            set.add(bucket.into())?;
        }
        Ok(set)
    }

    /// Generate `{prefix}1` .. `{prefix}{count}`
    pub fn generate(prefix: &str, count: usize) -> Self {
        Self {
            buckets: (1..=count).map(|i| format!("{}{}", prefix, i)).collect(),
        }
    }

    /// Append a bucket
    pub fn add(&mut self, bucket: Bucket) -> ReshardResult<()> {
        if self.contains(&bucket) {
            return Err(ReshardError::DuplicateBucket(bucket));
        }
        self.buckets.push(bucket);
        Ok(())
    }

    /// Remove the first occurrence of `bucket`, keeping the order of the rest
    pub fn remove(&mut self, bucket: &str) -> ReshardResult<()> {
        let idx = self
            .position(bucket)
            .ok_or_else(|| ReshardError::BucketNotFound(bucket.to_string()))?;
        self.buckets.remove(idx);
        Ok(())
    }

    /// Copy of this set with `bucket` appended
    pub fn with_added(&self, bucket: &str) -> ReshardResult<Self> {
        let mut next = self.clone();
        next.add(bucket.to_string())?;
        Ok(next)
    }

    /// Copy of this set with `bucket` removed
    pub fn with_removed(&self, bucket: &str) -> ReshardResult<Self> {
        let mut next = self.clone();
        next.remove(bucket)?;
        Ok(next)
    }

    /// First `{prefix}{n}` not already in the set, counting up from `len + 1`
    pub fn next_name(&self, prefix: &str) -> Bucket {
        let mut n = self.buckets.len() + 1;
        loop {
            let candidate = format!("{}{}", prefix, n);
            if !self.contains(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn contains(&self, bucket: &str) -> bool {
        self.position(bucket).is_some()
    }

    pub fn position(&self, bucket: &str) -> Option<usize> {
        self.buckets.iter().position(|b| b == bucket)
    }

    pub fn last(&self) -> Option<&Bucket> {
        self.buckets.last()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bucket> {
        self.buckets.iter()
    }

    pub fn as_slice(&self) -> &[Bucket] {
        &self.buckets
    }
}

impl<'a> IntoIterator for &'a BucketSet {
    type Item = &'a Bucket;
    type IntoIter = std::slice::Iter<'a, Bucket>;

    fn into_iter(self) -> Self::IntoIter {
        self.buckets.iter()
    }
}

impl std::fmt::Display for BucketSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.buckets.join(","))
    }
}
