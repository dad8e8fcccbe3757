pub mod config;
pub mod error;
pub mod sharding;

pub use config::{CliOverrides, OutputFormat, ReshardConfig};
pub use error::{ReshardError, ReshardResult};
pub use sharding::{
    BucketSet, Chooser, ChooserKind, Mapping, MigrationPlanner, Plan, ReshardOp, ReshardOutcome,
    Resharder,
};
