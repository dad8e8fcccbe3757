//! Bucket-set operations and end-to-end planning runs

use std::str::FromStr;

use serde::Serialize;

use super::bucket_set::{Bucket, BucketSet};
use super::chooser::Chooser;
use super::mapping::{build_mapping, build_mapping_parallel, Mapping};
use super::planner::{MigrationPlanner, Plan};
use crate::error::{ReshardError, ReshardResult};

/// Kind of bucket-set change, as written on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Add,
    Del,
}

impl FromStr for OpKind {
    type Err = ReshardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "add" => Ok(OpKind::Add),
            "del" => Ok(OpKind::Del),
            other => Err(ReshardError::InvalidOperation(other.to_string())),
        }
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Add => write!(f, "add"),
            OpKind::Del => write!(f, "del"),
        }
    }
}

/// A single bucket-set change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", content = "bucket", rename_all = "lowercase")]
pub enum ReshardOp {
    Add(Bucket),
    #[serde(rename = "del")]
    Remove(Bucket),
}

impl ReshardOp {
    pub fn new(kind: OpKind, bucket: Bucket) -> Self {
        match kind {
            OpKind::Add => ReshardOp::Add(bucket),
            OpKind::Del => ReshardOp::Remove(bucket),
        }
    }

    /// Parse an operation name (`add` / `del`) with its target bucket
    pub fn parse(op: &str, bucket: Bucket) -> ReshardResult<Self> {
        Ok(Self::new(op.parse()?, bucket))
    }

    pub fn kind(&self) -> OpKind {
        match self {
            ReshardOp::Add(_) => OpKind::Add,
            ReshardOp::Remove(_) => OpKind::Del,
        }
    }

    pub fn bucket(&self) -> &str {
        match self {
            ReshardOp::Add(b) | ReshardOp::Remove(b) => b,
        }
    }

    /// Apply to `buckets`, returning the new set and the bucket that must not
    /// act as a copy source
    pub fn apply(&self, buckets: &BucketSet) -> ReshardResult<(BucketSet, Option<Bucket>)> {
        match self {
            ReshardOp::Add(b) => Ok((buckets.with_added(b)?, None)),
            ReshardOp::Remove(b) => Ok((buckets.with_removed(b)?, Some(b.clone()))),
        }
    }

    /// The operation that undoes this one
    pub fn inverse(&self) -> Self {
        match self {
            ReshardOp::Add(b) => ReshardOp::Remove(b.clone()),
            ReshardOp::Remove(b) => ReshardOp::Add(b.clone()),
        }
    }
}

impl std::fmt::Display for ReshardOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind(), self.bucket())
    }
}

/// Everything produced by one planning run
#[derive(Debug, Clone, Serialize)]
pub struct ReshardOutcome {
    pub op: ReshardOp,
    pub replicas: usize,
    pub old_buckets: BucketSet,
    pub new_buckets: BucketSet,
    pub old_mapping: Mapping,
    pub new_mapping: Mapping,
    pub plan: Plan,
}

/// Runs mapping builds and migration planning for bucket-set changes
#[derive(Debug, Clone)]
pub struct Resharder {
    replicas: usize,
    parallel: bool,
}

impl Resharder {
    pub fn new(replicas: usize) -> Self {
        Self {
            replicas,
            parallel: false,
        }
    }

    /// Spread per-key work over rayon. The plan is identical either way.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    fn mapping(
        &self,
        chooser: &mut dyn Chooser,
        buckets: &BucketSet,
        keys: &[String],
    ) -> ReshardResult<Mapping> {
        if self.parallel {
            build_mapping_parallel(chooser, buckets, keys, self.replicas)
        } else {
            build_mapping(chooser, buckets, keys, self.replicas)
        }
    }

    /// Plan the migration caused by applying `op` to `buckets`
    pub fn run(
        &self,
        chooser: &mut dyn Chooser,
        buckets: &BucketSet,
        keys: &[String],
        op: &ReshardOp,
    ) -> ReshardResult<ReshardOutcome> {
        let (new_buckets, excluded) = op.apply(buckets)?;
        tracing::info!(
            "Resharding {} keys ({} replicas): {} [{}] -> [{}]",
            keys.len(),
            self.replicas,
            op,
            buckets,
            new_buckets
        );

        let old_mapping = self.mapping(chooser, buckets, keys)?;
        let new_mapping = self.mapping(chooser, &new_buckets, keys)?;

        let planner = MigrationPlanner::new(excluded);
        let plan = if self.parallel {
            planner.plan_parallel(buckets, &new_buckets, &old_mapping, &new_mapping)?
        } else {
            planner.plan(buckets, &new_buckets, &old_mapping, &new_mapping)?
        };

        Ok(ReshardOutcome {
            op: op.clone(),
            replicas: self.replicas,
            old_buckets: buckets.clone(),
            new_buckets,
            old_mapping,
            new_mapping,
            plan,
        })
    }
}

/// Old and new bucket of one key without replication
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SingleMove {
    pub key: String,
    pub old: Bucket,
    pub new: Bucket,
}

impl SingleMove {
    pub fn moved(&self) -> bool {
        self.old != self.new
    }
}

/// Non-replicated rebalance: where each key lands before and after, plus
/// per-bucket key counts for skew checks
#[derive(Debug, Clone, Serialize)]
pub struct SingleBucketReport {
    pub moves: Vec<SingleMove>,
    pub old_load: Vec<(Bucket, usize)>,
    pub new_load: Vec<(Bucket, usize)>,
}

impl SingleBucketReport {
    pub fn moved_count(&self) -> usize {
        self.moves.iter().filter(|m| m.moved()).count()
    }
}

/// Map every key to one bucket under both sets and compare
pub fn rebalance_single(
    chooser: &mut dyn Chooser,
    old_buckets: &BucketSet,
    new_buckets: &BucketSet,
    keys: &[String],
) -> ReshardResult<SingleBucketReport> {
    let old_mapping = build_mapping(chooser, old_buckets, keys, 1)?;
    let new_mapping = build_mapping(chooser, new_buckets, keys, 1)?;

    let mut moves = Vec::with_capacity(old_mapping.len());
    for entry in old_mapping.iter() {
        let new = new_mapping
            .get(&entry.key)
            .and_then(|r| r.first())
            .ok_or_else(|| ReshardError::KeyNotMapped(entry.key.clone()))?;
        moves.push(SingleMove {
            key: entry.key.clone(),
            old: entry.replicas[0].clone(),
            new: new.clone(),
        });
    }

    let report = SingleBucketReport {
        moves,
        old_load: old_mapping.load_per_bucket(old_buckets),
        new_load: new_mapping.load_per_bucket(new_buckets),
    };
    tracing::info!(
        "Single-bucket rebalance: {} of {} keys move",
        report.moved_count(),
        report.moves.len()
    );
    Ok(report)
}
