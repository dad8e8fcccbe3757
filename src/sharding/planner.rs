//! Migration planning
//!
//! Turns an old and a new key -> replica-set mapping into the list of copies
//! that materialize the new mapping and the list of replicas that become
//! redundant. For every key:
//!
//! 1. `inc = new − old`, `del = old − new`.
//! 2. Source candidates are the old replicas minus the excluded source (the
//!    bucket that is going away, if any).
//! 3. The i-th bucket of `inc` is seeded from candidate `i mod len`, so copy
//!    reads are spread over every surviving replica.
//! 4. The excluded source is dropped from `del`; its data disappears with
//!    the bucket itself.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::Serialize;

use super::bucket_set::{Bucket, BucketSet};
use super::delta::{compute_delta, Delta};
use super::mapping::{KeyReplicas, Mapping};
use crate::error::{ReshardError, ReshardResult};

/// One copy of one key from `source` to `dest`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyPair {
    pub source: Bucket,
    pub dest: Bucket,
}

/// Planned changes for a single key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyMigration {
    pub key: String,
    pub old: Vec<Bucket>,
    pub new: Vec<Bucket>,
    pub delta: Delta,
    /// One entry per bucket of `delta.inc`, same order
    pub copies: Vec<CopyPair>,
    /// `delta.del` without the excluded source
    pub deletes: Vec<Bucket>,
}

impl KeyMigration {
    pub fn is_unchanged(&self) -> bool {
        self.copies.is_empty() && self.deletes.is_empty()
    }
}

/// Keys to copy from `source` to `dest`, in discovery order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyTask {
    pub source: Bucket,
    pub dest: Bucket,
    pub keys: Vec<String>,
}

/// Keys whose replica on `bucket` is redundant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteTask {
    pub bucket: Bucket,
    pub keys: Vec<String>,
}

/// All copy and delete work for one bucket-set transition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub keys: Vec<KeyMigration>,
    /// Ordered by old bucket-set position of the source, then new
    /// bucket-set position of the destination
    pub copy_tasks: Vec<CopyTask>,
    /// Ordered by old bucket-set position
    pub delete_tasks: Vec<DeleteTask>,
}

impl Plan {
    /// Total number of single-key copies
    pub fn copy_count(&self) -> usize {
        self.copy_tasks.iter().map(|t| t.keys.len()).sum()
    }

    /// Total number of single-key deletions
    pub fn delete_count(&self) -> usize {
        self.delete_tasks.iter().map(|t| t.keys.len()).sum()
    }

    /// Keys whose placement changed
    pub fn moved_keys(&self) -> usize {
        self.keys.iter().filter(|k| !k.is_unchanged()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.copy_tasks.is_empty() && self.delete_tasks.is_empty()
    }

    pub fn copy_task(&self, source: &str, dest: &str) -> Option<&CopyTask> {
        self.copy_tasks
            .iter()
            .find(|t| t.source == source && t.dest == dest)
    }

    pub fn delete_task(&self, bucket: &str) -> Option<&DeleteTask> {
        self.delete_tasks.iter().find(|t| t.bucket == bucket)
    }
}

/// Computes copy/delete plans between two mappings
#[derive(Debug, Clone, Default)]
pub struct MigrationPlanner {
    excluded_source: Option<Bucket>,
}

impl MigrationPlanner {
    /// `excluded_source` is a bucket that must never seed a copy and whose
    /// replicas are not scheduled for deletion (typically the bucket being
    /// removed).
    pub fn new(excluded_source: Option<Bucket>) -> Self {
        Self { excluded_source }
    }

    pub fn excluded_source(&self) -> Option<&str> {
        self.excluded_source.as_deref()
    }

    fn is_excluded(&self, bucket: &str) -> bool {
        self.excluded_source.as_deref() == Some(bucket)
    }

    /// Plan a single key
    pub fn plan_key(&self, key: &str, old: &[Bucket], new: &[Bucket]) -> ReshardResult<KeyMigration> {
        let delta = compute_delta(old, new);

        let candidates: Vec<&Bucket> = old.iter().filter(|b| !self.is_excluded(b)).collect();
        if candidates.is_empty() && !delta.inc.is_empty() {
            return Err(ReshardError::NoSourceCandidates {
                key: key.to_string(),
                targets: delta.inc.clone(),
            });
        }

        let copies: Vec<CopyPair> = delta
            .inc
            .iter()
            .enumerate()
            .map(|(i, dest)| CopyPair {
                source: candidates[i % candidates.len()].clone(),
                dest: dest.clone(),
            })
            .collect();

        let deletes: Vec<Bucket> = delta
            .del
            .iter()
            .filter(|b| !self.is_excluded(b))
            .cloned()
            .collect();

        tracing::debug!(
            "hostname={}, old={}, new={}, inc={}, del={}",
            key,
            old.join(","),
            new.join(","),
            copies
                .iter()
                .map(|c| format!("{}<-{}", c.dest, c.source))
                .collect::<Vec<_>>()
                .join(","),
            deletes.join(",")
        );

        Ok(KeyMigration {
            key: key.to_string(),
            old: old.to_vec(),
            new: new.to_vec(),
            delta,
            copies,
            deletes,
        })
    }

    fn plan_entry(&self, entry: &KeyReplicas, new_mapping: &Mapping) -> ReshardResult<KeyMigration> {
        let new = new_mapping
            .get(&entry.key)
            .ok_or_else(|| ReshardError::KeyNotMapped(entry.key.clone()))?;
        self.plan_key(&entry.key, &entry.replicas, new)
    }

    /// Plan every key of `old_mapping`, sequentially
    pub fn plan(
        &self,
        old_buckets: &BucketSet,
        new_buckets: &BucketSet,
        old_mapping: &Mapping,
        new_mapping: &Mapping,
    ) -> ReshardResult<Plan> {
        let migrations = old_mapping
            .iter()
            .map(|entry| self.plan_entry(entry, new_mapping))
            .collect::<ReshardResult<Vec<_>>>()?;
        Ok(self.assemble(old_buckets, new_buckets, old_mapping, new_mapping, migrations))
    }

    /// Same result as [`MigrationPlanner::plan`]; per-key work runs on rayon
    /// and is merged in key order.
    pub fn plan_parallel(
        &self,
        old_buckets: &BucketSet,
        new_buckets: &BucketSet,
        old_mapping: &Mapping,
        new_mapping: &Mapping,
    ) -> ReshardResult<Plan> {
        let migrations = old_mapping
            .entries()
            .par_iter()
            .map(|entry| self.plan_entry(entry, new_mapping))
            .collect::<ReshardResult<Vec<_>>>()?;
        Ok(self.assemble(old_buckets, new_buckets, old_mapping, new_mapping, migrations))
    }

    fn assemble(
        &self,
        old_buckets: &BucketSet,
        new_buckets: &BucketSet,
        old_mapping: &Mapping,
        new_mapping: &Mapping,
        migrations: Vec<KeyMigration>,
    ) -> Plan {
        for key in new_mapping.keys() {
            if old_mapping.get(key).is_none() {
                tracing::warn!("Key {} has no previous placement, nothing to migrate", key);
            }
        }

        let mut copy_order: Vec<(Bucket, Bucket)> = Vec::new();
        let mut copies: HashMap<(Bucket, Bucket), Vec<String>> = HashMap::new();
        let mut delete_order: Vec<Bucket> = Vec::new();
        let mut deletes: HashMap<Bucket, Vec<String>> = HashMap::new();

        for migration in &migrations {
            for pair in &migration.copies {
                let id = (pair.source.clone(), pair.dest.clone());
                copies
                    .entry(id.clone())
                    .or_insert_with(|| {
                        copy_order.push(id);
                        Vec::new()
                    })
                    .push(migration.key.clone());
            }
            for bucket in &migration.deletes {
                deletes
                    .entry(bucket.clone())
                    .or_insert_with(|| {
                        delete_order.push(bucket.clone());
                        Vec::new()
                    })
                    .push(migration.key.clone());
            }
        }

        // Buckets unknown to a set sort last, keeping discovery order
        let rank = |set: &BucketSet, b: &str| set.position(b).unwrap_or(usize::MAX);
        copy_order.sort_by_key(|(src, dst)| {
            (rank(old_buckets, src.as_str()), rank(new_buckets, dst.as_str()))
        });
        delete_order.sort_by_key(|b| rank(old_buckets, b.as_str()));

        let copy_tasks: Vec<CopyTask> = copy_order
            .into_iter()
            .map(|(source, dest)| {
                let keys = copies.remove(&(source.clone(), dest.clone())).unwrap_or_default();
                CopyTask { source, dest, keys }
            })
            .collect();

        let delete_tasks: Vec<DeleteTask> = delete_order
            .into_iter()
            .map(|bucket| {
                let keys = deletes.remove(&bucket).unwrap_or_default();
                DeleteTask { bucket, keys }
            })
            .collect();

        let plan = Plan {
            keys: migrations,
            copy_tasks,
            delete_tasks,
        };

        tracing::info!(
            "Migration plan: {} of {} keys move, {} copies in {} tasks, {} deletions in {} tasks",
            plan.moved_keys(),
            plan.keys.len(),
            plan.copy_count(),
            plan.copy_tasks.len(),
            plan.delete_count(),
            plan.delete_tasks.len()
        );

        plan
    }
}
