//! Key to replica-set mapping for one bucket set snapshot

use std::collections::HashMap;

use rayon::prelude::*;
use serde::Serialize;

use super::bucket_set::{Bucket, BucketSet};
use super::chooser::Chooser;
use crate::error::{ReshardError, ReshardResult};

/// Replica placement of a single key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyReplicas {
    pub key: String,
    pub replicas: Vec<Bucket>,
}

/// Key -> ReplicaSet, in key insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Mapping {
    entries: Vec<KeyReplicas>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Mapping {
    /// Build a mapping from explicit placements.
    ///
    /// A replica set naming the same bucket twice is rejected. Repeated keys
    /// keep their first placement.
    pub fn from_entries<I, K>(entries: I) -> ReshardResult<Self>
    where
        I: IntoIterator<Item = (K, Vec<Bucket>)>,
        K: Into<String>,
    {
        let mut mapping = Self::default();
        for (key, replicas) in entries {
            let key = key.into();
            for (i, bucket) in replicas.iter().enumerate() {
                if replicas[..i].contains(bucket) {
                    return Err(ReshardError::InvalidBucketSet(format!(
                        "duplicate bucket '{}' in replicas of '{}'",
                        bucket, key
                    )));
                }
            }
            mapping.insert(key, replicas);
        }
        Ok(mapping)
    }

    fn insert(&mut self, key: String, replicas: Vec<Bucket>) {
        if self.index.contains_key(&key) {
            tracing::warn!("Duplicate key {} ignored, keeping first placement", key);
            return;
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push(KeyReplicas { key, replicas });
    }

    pub fn get(&self, key: &str) -> Option<&[Bucket]> {
        self.index
            .get(key)
            .map(|&i| self.entries[i].replicas.as_slice())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, KeyReplicas> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[KeyReplicas] {
        &self.entries
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of replicas landing on each bucket, in bucket-set order
    pub fn load_per_bucket(&self, buckets: &BucketSet) -> Vec<(Bucket, usize)> {
        let mut counts: HashMap<&str, usize> = buckets.iter().map(|b| (b.as_str(), 0)).collect();
        for entry in &self.entries {
            for bucket in &entry.replicas {
                if let Some(count) = counts.get_mut(bucket.as_str()) {
                    *count += 1;
                }
            }
        }
        buckets
            .iter()
            .map(|b| (b.clone(), counts.get(b.as_str()).copied().unwrap_or(0)))
            .collect()
    }
}

fn prepare(
    chooser: &mut dyn Chooser,
    buckets: &BucketSet,
    replica_count: usize,
) -> ReshardResult<()> {
    if replica_count == 0 {
        return Err(ReshardError::InvalidConfig(
            "replica count must be at least 1".to_string(),
        ));
    }
    chooser.set_buckets(buckets.as_slice())?;
    if replica_count > buckets.len() {
        return Err(ReshardError::InsufficientBuckets {
            requested: replica_count,
            available: buckets.len(),
        });
    }
    Ok(())
}

fn choose_for(chooser: &dyn Chooser, key: &str, replica_count: usize) -> ReshardResult<Vec<Bucket>> {
    if replica_count == 1 {
        Ok(vec![chooser.choose(key)?])
    } else {
        chooser.choose_replicas(key, replica_count)
    }
}

/// Map every key to `replica_count` distinct buckets of `buckets`
pub fn build_mapping(
    chooser: &mut dyn Chooser,
    buckets: &BucketSet,
    keys: &[String],
    replica_count: usize,
) -> ReshardResult<Mapping> {
    prepare(chooser, buckets, replica_count)?;

    let mut mapping = Mapping::default();
    for key in keys {
        let replicas = choose_for(chooser, key, replica_count)?;
        tracing::trace!("hostname={}, shards={}", key, replicas.join(","));
        mapping.insert(key.clone(), replicas);
    }

    tracing::debug!(
        "Built mapping for {} keys over {} buckets (replicas={})",
        mapping.len(),
        buckets.len(),
        replica_count
    );
    Ok(mapping)
}

/// Same result as [`build_mapping`], with the per-key choice spread over rayon
pub fn build_mapping_parallel(
    chooser: &mut dyn Chooser,
    buckets: &BucketSet,
    keys: &[String],
    replica_count: usize,
) -> ReshardResult<Mapping> {
    prepare(chooser, buckets, replica_count)?;

    let shared: &dyn Chooser = &*chooser;
    let chosen: Vec<Vec<Bucket>> = keys
        .par_iter()
        .map(|key| choose_for(shared, key, replica_count))
        .collect::<ReshardResult<Vec<_>>>()?;

    let mut mapping = Mapping::default();
    for (key, replicas) in keys.iter().zip(chosen) {
        mapping.insert(key.clone(), replicas);
    }

    tracing::debug!(
        "Built mapping for {} keys over {} buckets (replicas={}, parallel)",
        mapping.len(),
        buckets.len(),
        replica_count
    );
    Ok(mapping)
}

/// Hostname keys `0.{suffix}` .. `{count-1}.{suffix}`
pub fn generate_hostnames(count: usize, suffix: &str) -> Vec<String> {
    (0..count).map(|i| format!("{}.{}", i, suffix)).collect()
}
