use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use reshard::config::{CliOverrides, OutputFormat, ReshardConfig};
use reshard::sharding::{rebalance_single, report, Resharder};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "reshard")]
#[command(about = "Plan replica copies and deletions when a shard bucket is added or removed", long_about = None)]
struct Args {
    #[command(flatten)]
    overrides: CliOverrides,

    /// Config file (defaults to ./reshard.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr, the report to stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reshard=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = ReshardConfig::load(args.config.as_deref())?;
    config.merge_cli(&args.overrides);
    config.validate()?;

    let buckets = config.buckets();
    let keys = config.hostnames();
    let op = config.reshard_op(&buckets)?;
    let mut chooser = config.chooser.build();
    tracing::info!(
        "chooser={}, shards={}, sites={}, replicas={}",
        config.chooser,
        buckets.len(),
        keys.len(),
        config.replicas
    );

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if config.single {
        let (new_buckets, _) = op.apply(&buckets)?;
        let single = rebalance_single(chooser.as_mut(), &buckets, &new_buckets, &keys)?;
        match config.format {
            OutputFormat::Text => report::write_single(&mut out, &buckets, &new_buckets, &single)?,
            OutputFormat::Json => report::write_json(&mut out, &single)?,
        }
        out.flush()?;
        eprintln!(
            "{} {} of {} keys move ({})",
            "✓".green(),
            single.moved_count(),
            single.moves.len(),
            op
        );
        return Ok(());
    }

    let outcome = Resharder::new(config.replicas)
        .parallel(config.parallel)
        .run(chooser.as_mut(), &buckets, &keys, &op)?;

    match config.format {
        OutputFormat::Text => report::write_plan(&mut out, &outcome)?,
        OutputFormat::Json => report::write_json(&mut out, &outcome)?,
    }
    out.flush()?;

    let plan = &outcome.plan;
    eprintln!(
        "{} {}: {} of {} keys move, {} copies, {} deletions",
        "✓".green(),
        op.to_string().bold(),
        plan.moved_keys(),
        plan.keys.len(),
        plan.copy_count(),
        plan.delete_count()
    );

    Ok(())
}
