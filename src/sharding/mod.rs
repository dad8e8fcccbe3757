//! Replica placement and resharding plans
//!
//! Keys are placed on buckets by a [`Chooser`]; when the bucket set changes
//! the [`MigrationPlanner`] works out which copies and deletions bring every
//! key to its new replica set.

pub mod bucket_set;
pub mod chooser;
pub mod delta;
pub mod mapping;
pub mod planner;
pub mod report;
pub mod reshard;

pub use bucket_set::{Bucket, BucketSet};
pub use chooser::{Chooser, ChooserKind, JumpChooser, RendezvousChooser};
pub use delta::{compute_delta, Delta};
pub use mapping::{build_mapping, build_mapping_parallel, generate_hostnames, KeyReplicas, Mapping};
pub use planner::{CopyPair, CopyTask, DeleteTask, KeyMigration, MigrationPlanner, Plan};
pub use reshard::{rebalance_single, OpKind, ReshardOp, ReshardOutcome, Resharder, SingleBucketReport, SingleMove};
