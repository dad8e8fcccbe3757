//! Common test utilities for resharding tests
//!
//! Provides shared helpers for:
//! - Generating bucket sets and hostname keys
//! - A table-driven chooser with hand-picked placements
//! - Replaying a plan against the old placement

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};

use reshard::sharding::{generate_hostnames, Bucket, BucketSet, Chooser, ReshardOp, ReshardOutcome};
use reshard::{ReshardError, ReshardResult};

pub fn hosts(n: usize) -> Vec<String> {
    generate_hostnames(n, "example.jp")
}

pub fn buckets(names: &[&str]) -> BucketSet {
    BucketSet::from_buckets(names.iter().copied()).expect("valid bucket set")
}

pub fn v(items: &[&str]) -> Vec<Bucket> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Chooser returning fixed placements per bucket set
#[derive(Default)]
pub struct TableChooser {
    tables: HashMap<String, HashMap<String, Vec<Bucket>>>,
    current: Vec<Bucket>,
}

impl TableChooser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Placement of `key` while the installed buckets are `set`
    pub fn place(mut self, set: &[&str], key: &str, replicas: &[&str]) -> Self {
        self.tables
            .entry(set.join(","))
            .or_default()
            .insert(key.to_string(), v(replicas));
        self
    }
}

impl Chooser for TableChooser {
    fn set_buckets(&mut self, buckets: &[Bucket]) -> ReshardResult<()> {
        if buckets.is_empty() {
            return Err(ReshardError::InvalidBucketSet("empty bucket list".to_string()));
        }
        self.current = buckets.to_vec();
        Ok(())
    }

    fn buckets(&self) -> &[Bucket] {
        &self.current
    }

    fn choose(&self, key: &str) -> ReshardResult<Bucket> {
        Ok(self.choose_replicas(key, 1)?.remove(0))
    }

    fn choose_replicas(&self, key: &str, n: usize) -> ReshardResult<Vec<Bucket>> {
        let placement = self
            .tables
            .get(&self.current.join(","))
            .and_then(|t| t.get(key))
            .ok_or_else(|| ReshardError::KeyNotMapped(key.to_string()))?;
        Ok(placement.iter().take(n).cloned().collect())
    }
}

/// Replay copies then deletions on the old placement, drop the removed
/// bucket, and return bucket -> keys held
pub fn replay(outcome: &ReshardOutcome) -> HashMap<Bucket, HashSet<String>> {
    let mut held: HashMap<Bucket, HashSet<String>> = HashMap::new();
    for entry in outcome.old_mapping.iter() {
        for bucket in &entry.replicas {
            held.entry(bucket.clone()).or_default().insert(entry.key.clone());
        }
    }

    for task in &outcome.plan.copy_tasks {
        for key in &task.keys {
            assert!(
                held.get(&task.source).is_some_and(|keys| keys.contains(key)),
                "copy source {} does not hold {}",
                task.source,
                key
            );
            held.entry(task.dest.clone()).or_default().insert(key.clone());
        }
    }

    for task in &outcome.plan.delete_tasks {
        for key in &task.keys {
            let removed = held.get_mut(&task.bucket).is_some_and(|keys| keys.remove(key));
            assert!(removed, "delete on {} of missing key {}", task.bucket, key);
        }
    }

    if let ReshardOp::Remove(bucket) = &outcome.op {
        held.remove(bucket);
    }
    held.retain(|_, keys| !keys.is_empty());
    held
}

/// bucket -> keys expected by the new mapping
pub fn expected_holdings(outcome: &ReshardOutcome) -> HashMap<Bucket, HashSet<String>> {
    let mut expected: HashMap<Bucket, HashSet<String>> = HashMap::new();
    for entry in outcome.new_mapping.iter() {
        for bucket in &entry.replicas {
            expected.entry(bucket.clone()).or_default().insert(entry.key.clone());
        }
    }
    expected
}
