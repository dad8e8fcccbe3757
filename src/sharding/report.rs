//! Plan rendering
//!
//! Line-oriented text output for humans and JSON output for tooling. The
//! text format is informational, not a stable contract.

use std::io::Write;

use serde::Serialize;

use super::bucket_set::{Bucket, BucketSet};
use super::planner::Plan;
use super::reshard::{ReshardOutcome, SingleBucketReport};
use crate::error::ReshardResult;

/// Write the full text report for a planning run
pub fn write_plan<W: Write>(w: &mut W, outcome: &ReshardOutcome) -> std::io::Result<()> {
    writeln!(
        w,
        "op={}, replicas={}, buckets={} -> {}",
        outcome.op, outcome.replicas, outcome.old_buckets, outcome.new_buckets
    )?;
    write_key_lines(w, &outcome.plan)?;
    write_tasks(w, &outcome.plan)?;

    let old_load = outcome.old_mapping.load_per_bucket(&outcome.old_buckets);
    let new_load = outcome.new_mapping.load_per_bucket(&outcome.new_buckets);
    write_load(w, &outcome.old_buckets, &outcome.new_buckets, &old_load, &new_load)
}

/// One line per key: placements before and after, copies and deletions
pub fn write_key_lines<W: Write>(w: &mut W, plan: &Plan) -> std::io::Result<()> {
    for key in &plan.keys {
        let inc = key
            .copies
            .iter()
            .map(|c| format!("{}<-{}", c.dest, c.source))
            .collect::<Vec<_>>()
            .join(",");
        writeln!(
            w,
            "hostname={}, old={}, new={}, inc={}, del={}",
            key.key,
            key.old.join(","),
            key.new.join(","),
            inc,
            key.deletes.join(",")
        )?;
    }
    Ok(())
}

/// Grouped copy and delete task lines
pub fn write_tasks<W: Write>(w: &mut W, plan: &Plan) -> std::io::Result<()> {
    for task in &plan.copy_tasks {
        writeln!(
            w,
            "copy {} -> {}: {}",
            task.source,
            task.dest,
            task.keys.join(",")
        )?;
    }
    for task in &plan.delete_tasks {
        writeln!(w, "delete {}: {}", task.bucket, task.keys.join(","))?;
    }
    Ok(())
}

fn count_for(load: &[(Bucket, usize)], bucket: &str) -> Option<usize> {
    load.iter().find(|(b, _)| b == bucket).map(|(_, c)| *c)
}

fn fmt_count(count: Option<usize>) -> String {
    count.map_or_else(|| "-".to_string(), |c| c.to_string())
}

/// Per-bucket key counts before and after; `-` where a bucket is absent
pub fn write_load<W: Write>(
    w: &mut W,
    old_buckets: &BucketSet,
    new_buckets: &BucketSet,
    old_load: &[(Bucket, usize)],
    new_load: &[(Bucket, usize)],
) -> std::io::Result<()> {
    let added = new_buckets.iter().filter(|b| !old_buckets.contains(b));
    for bucket in old_buckets.iter().chain(added) {
        writeln!(
            w,
            "shard={}, old_count={}, new_count={}",
            bucket,
            fmt_count(count_for(old_load, bucket)),
            fmt_count(count_for(new_load, bucket))
        )?;
    }
    Ok(())
}

/// Text report for the non-replicated mode
pub fn write_single<W: Write>(
    w: &mut W,
    old_buckets: &BucketSet,
    new_buckets: &BucketSet,
    report: &SingleBucketReport,
) -> std::io::Result<()> {
    for m in &report.moves {
        writeln!(w, "hostname={}, old={}, new={}", m.key, m.old, m.new)?;
    }
    write_load(w, old_buckets, new_buckets, &report.old_load, &report.new_load)
}

/// Pretty JSON followed by a newline
pub fn write_json<W: Write, T: Serialize + ?Sized>(w: &mut W, value: &T) -> ReshardResult<()> {
    serde_json::to_writer_pretty(&mut *w, value)?;
    writeln!(w)?;
    Ok(())
}
