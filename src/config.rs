//! Run configuration
//!
//! Settings come from, in increasing precedence:
//!
//! 1. built-in defaults,
//! 2. a `reshard.toml` file (explicit `--config` path, or the working
//!    directory when present),
//! 3. environment variables (a `.env` file is loaded first),
//! 4. command-line flags.
//!
//! ## Environment Variables
//!
//! - `RESHARD_SHARD_COUNT` - number of buckets before the operation
//! - `RESHARD_SITE_COUNT` - number of hostname keys
//! - `RESHARD_REPLICAS` - replicas per key
//! - `RESHARD_OP` - `add` or `del`
//! - `RESHARD_OP_SHARD` - target bucket of the operation
//! - `RESHARD_CHOOSER` - `jump` or `rendezvous`
//! - `RESHARD_FORMAT` - `text` or `json`
//! - `RESHARD_SINGLE` - non-replicated mode (`true`/`false`)
//! - `RESHARD_PARALLEL` - per-key work on all cores (`true`/`false`)
//!
//! A value that does not parse is an error, never silently dropped.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ReshardError, ReshardResult};
use crate::sharding::{Bucket, BucketSet, ChooserKind, OpKind, ReshardOp};

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "reshard.toml";

/// Environment variable names
pub const ENV_SHARD_COUNT: &str = "RESHARD_SHARD_COUNT";
pub const ENV_SITE_COUNT: &str = "RESHARD_SITE_COUNT";
pub const ENV_REPLICAS: &str = "RESHARD_REPLICAS";
pub const ENV_OP: &str = "RESHARD_OP";
pub const ENV_OP_SHARD: &str = "RESHARD_OP_SHARD";
pub const ENV_CHOOSER: &str = "RESHARD_CHOOSER";
pub const ENV_FORMAT: &str = "RESHARD_FORMAT";
pub const ENV_SINGLE: &str = "RESHARD_SINGLE";
pub const ENV_PARALLEL: &str = "RESHARD_PARALLEL";

/// Report format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReshardConfig {
    /// Bucket count before the operation
    #[serde(default = "default_shard_count")]
    pub shard_count: usize,
    /// Number of hostname keys to place
    #[serde(default = "default_site_count")]
    pub site_count: usize,
    /// Replicas per key
    #[serde(default = "default_replicas")]
    pub replicas: usize,
    /// `add` or `del`
    #[serde(default = "default_op")]
    pub op: String,
    /// Target bucket; derived from the bucket set when unset
    #[serde(default)]
    pub op_shard: Option<String>,
    #[serde(default)]
    pub chooser: ChooserKind,
    #[serde(default)]
    pub format: OutputFormat,
    /// Bucket names are `{bucket_prefix}{n}`
    #[serde(default = "default_bucket_prefix")]
    pub bucket_prefix: String,
    /// Keys are `{n}.{host_suffix}`
    #[serde(default = "default_host_suffix")]
    pub host_suffix: String,
    #[serde(default)]
    pub parallel: bool,
    /// Non-replicated mode: old vs new bucket per key
    #[serde(default)]
    pub single: bool,
}

/// Command-line overrides, the highest-precedence layer
#[derive(clap::Args, Debug, Clone, Default, PartialEq)]
pub struct CliOverrides {
    /// Bucket count before the operation
    #[arg(long)]
    pub shard_count: Option<usize>,

    /// Number of hostname keys
    #[arg(long)]
    pub site_count: Option<usize>,

    /// Replicas per key
    #[arg(long)]
    pub replicas: Option<usize>,

    /// Operation: add or del
    #[arg(long)]
    pub op: Option<String>,

    /// Target bucket of the operation
    #[arg(long)]
    pub op_shard: Option<String>,

    /// Bucket chooser
    #[arg(long, value_enum)]
    pub chooser: Option<ChooserKind>,

    /// Report format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Non-replicated mode: report old vs new bucket per key (`--single=false` to turn off)
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub single: Option<bool>,

    /// Spread per-key work over all cores (`--parallel=false` to turn off)
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub parallel: Option<bool>,
}

fn default_shard_count() -> usize {
    3
}

fn default_site_count() -> usize {
    10
}

fn default_replicas() -> usize {
    2
}

fn default_op() -> String {
    "del".to_string()
}

fn default_bucket_prefix() -> String {
    "met".to_string()
}

fn default_host_suffix() -> String {
    "example.jp".to_string()
}

impl Default for ReshardConfig {
    fn default() -> Self {
        Self {
            shard_count: default_shard_count(),
            site_count: default_site_count(),
            replicas: default_replicas(),
            op: default_op(),
            op_shard: None,
            chooser: ChooserKind::default(),
            format: OutputFormat::default(),
            bucket_prefix: default_bucket_prefix(),
            host_suffix: default_host_suffix(),
            parallel: false,
            single: false,
        }
    }
}

impl ReshardConfig {
    /// Load defaults, the config file and environment overrides.
    ///
    /// With `path` set the file must exist; otherwise `reshard.toml` in the
    /// working directory is used when present.
    pub fn load(path: Option<&Path>) -> ReshardResult<Self> {
        // .env is optional
        let _ = dotenvy::dotenv();
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    /// [`ReshardConfig::load`] with an explicit variable lookup
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> ReshardResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(CONFIG_FILE_NAME).exists() => {
                Self::from_file(Path::new(CONFIG_FILE_NAME))?
            }
            None => Self::default(),
        };

        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// Parse a toml config file
    pub fn from_file(path: &Path) -> ReshardResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReshardError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: ReshardConfig = toml::from_str(&content)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// [`ReshardConfig::load`]). Empty values are skipped.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ReshardResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(value) = get(ENV_SHARD_COUNT) {
            self.shard_count = parse_count(ENV_SHARD_COUNT, &value)?;
        }
        if let Some(value) = get(ENV_SITE_COUNT) {
            self.site_count = parse_count(ENV_SITE_COUNT, &value)?;
        }
        if let Some(value) = get(ENV_REPLICAS) {
            self.replicas = parse_count(ENV_REPLICAS, &value)?;
        }
        if let Some(op) = get(ENV_OP) {
            self.op = op;
        }
        if let Some(shard) = get(ENV_OP_SHARD) {
            self.op_shard = Some(shard);
        }
        if let Some(value) = get(ENV_CHOOSER) {
            self.chooser = parse_enum(ENV_CHOOSER, &value)?;
        }
        if let Some(value) = get(ENV_FORMAT) {
            self.format = parse_enum(ENV_FORMAT, &value)?;
        }
        if let Some(value) = get(ENV_SINGLE) {
            self.single = parse_flag(ENV_SINGLE, &value)?;
        }
        if let Some(value) = get(ENV_PARALLEL) {
            self.parallel = parse_flag(ENV_PARALLEL, &value)?;
        }
        Ok(())
    }

    /// Apply command-line flags over everything loaded so far
    pub fn merge_cli(&mut self, cli: &CliOverrides) {
        if let Some(n) = cli.shard_count {
            self.shard_count = n;
        }
        if let Some(n) = cli.site_count {
            self.site_count = n;
        }
        if let Some(n) = cli.replicas {
            self.replicas = n;
        }
        if let Some(op) = &cli.op {
            self.op = op.clone();
        }
        if let Some(shard) = &cli.op_shard {
            self.op_shard = Some(shard.clone());
        }
        if let Some(chooser) = cli.chooser {
            self.chooser = chooser;
        }
        if let Some(format) = cli.format {
            self.format = format;
        }
        if let Some(single) = cli.single {
            self.single = single;
        }
        if let Some(parallel) = cli.parallel {
            self.parallel = parallel;
        }
    }

    /// Reject settings no run could succeed with
    pub fn validate(&self) -> ReshardResult<()> {
        if self.shard_count == 0 {
            return Err(ReshardError::InvalidConfig(
                "shard count must be at least 1".to_string(),
            ));
        }
        if self.replicas == 0 {
            return Err(ReshardError::InvalidConfig(
                "replica count must be at least 1".to_string(),
            ));
        }
        if self.bucket_prefix.is_empty() {
            return Err(ReshardError::InvalidConfig(
                "bucket prefix must not be empty".to_string(),
            ));
        }
        self.op_kind()?;
        Ok(())
    }

    pub fn op_kind(&self) -> ReshardResult<OpKind> {
        self.op.parse()
    }

    /// Buckets before the operation
    pub fn buckets(&self) -> BucketSet {
        BucketSet::generate(&self.bucket_prefix, self.shard_count)
    }

    /// Hostname keys
    pub fn hostnames(&self) -> Vec<String> {
        crate::sharding::generate_hostnames(self.site_count, &self.host_suffix)
    }

    /// Target bucket: `op_shard` when set, else the next free name for `add`
    /// and the last bucket for `del`
    pub fn target_bucket(&self, buckets: &BucketSet) -> ReshardResult<Bucket> {
        if let Some(shard) = &self.op_shard {
            return Ok(shard.clone());
        }
        match self.op_kind()? {
            OpKind::Add => Ok(buckets.next_name(&self.bucket_prefix)),
            OpKind::Del => buckets.last().cloned().ok_or_else(|| {
                ReshardError::InvalidConfig("no bucket to remove".to_string())
            }),
        }
    }

    /// The configured operation against `buckets`
    pub fn reshard_op(&self, buckets: &BucketSet) -> ReshardResult<ReshardOp> {
        let kind = self.op_kind()?;
        Ok(ReshardOp::new(kind, self.target_bucket(buckets)?))
    }
}

fn parse_count(name: &str, value: &str) -> ReshardResult<usize> {
    value
        .parse()
        .map_err(|_| ReshardError::InvalidConfig(format!("{}={}: not a number", name, value)))
}

fn parse_enum<T: ValueEnum>(name: &str, value: &str) -> ReshardResult<T> {
    T::from_str(value, true).map_err(|_| {
        let allowed: Vec<String> = T::value_variants()
            .iter()
            .filter_map(|v| v.to_possible_value())
            .map(|v| v.get_name().to_string())
            .collect();
        ReshardError::InvalidConfig(format!(
            "{}={}: expected one of {}",
            name,
            value,
            allowed.join(", ")
        ))
    })
}

fn parse_flag(name: &str, value: &str) -> ReshardResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ReshardError::InvalidConfig(format!(
            "{}={}: expected true or false",
            name, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = ReshardConfig::default();
        assert_eq!(config.shard_count, 3);
        assert_eq!(config.site_count, 10);
        assert_eq!(config.replicas, 2);
        assert_eq!(config.op, "del");
        assert!(config.op_shard.is_none());
        assert_eq!(config.chooser, ChooserKind::Jump);
        assert_eq!(config.format, OutputFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ReshardConfig = toml::from_str("replicas = 3\nop = \"add\"\n").unwrap();
        assert_eq!(config.replicas, 3);
        assert_eq!(config.op, "add");
        assert_eq!(config.shard_count, 3);
        assert_eq!(config.bucket_prefix, "met");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            "shard_count = 5\nsite_count = 100\nop_shard = \"met2\"\nchooser = \"rendezvous\"\nformat = \"json\"\n",
        )
        .unwrap();

        let config = ReshardConfig::from_file(&path).unwrap();
        assert_eq!(config.shard_count, 5);
        assert_eq!(config.site_count, 100);
        assert_eq!(config.op_shard.as_deref(), Some("met2"));
        assert_eq!(config.chooser, ChooserKind::Rendezvous);
        assert_eq!(config.format, OutputFormat::Json);
    }

    #[test]
    fn test_from_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            ReshardConfig::from_file(&missing),
            Err(ReshardError::InvalidConfig(_))
        ));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "replicas = \"two\"\n").unwrap();
        assert!(matches!(
            ReshardConfig::from_file(&bad),
            Err(ReshardError::TomlError(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            (ENV_SHARD_COUNT, "6"),
            (ENV_REPLICAS, " 3 "),
            (ENV_OP, "add"),
            (ENV_OP_SHARD, "met9"),
            (ENV_CHOOSER, "Rendezvous"),
            (ENV_FORMAT, "json"),
            (ENV_SINGLE, "yes"),
            (ENV_PARALLEL, "1"),
        ]);
        let mut config = ReshardConfig::default();
        config.apply_overrides(|name| vars.get(name).cloned()).unwrap();

        assert_eq!(config.shard_count, 6);
        assert_eq!(config.replicas, 3);
        assert_eq!(config.site_count, 10);
        assert_eq!(config.op, "add");
        assert_eq!(config.op_shard.as_deref(), Some("met9"));
        assert_eq!(config.chooser, ChooserKind::Rendezvous);
        assert_eq!(config.format, OutputFormat::Json);
        assert!(config.single);
        assert!(config.parallel);
    }

    #[test]
    fn test_env_overrides_skip_empty_values() {
        let vars = env(&[(ENV_OP, ""), (ENV_REPLICAS, "  ")]);
        let mut config = ReshardConfig::default();
        config.apply_overrides(|name| vars.get(name).cloned()).unwrap();
        assert_eq!(config, ReshardConfig::default());
    }

    #[test]
    fn test_env_overrides_reject_bad_values() {
        for (name, value) in [
            (ENV_REPLICAS, "three"),
            (ENV_SHARD_COUNT, "-1"),
            (ENV_SITE_COUNT, "lots"),
            (ENV_CHOOSER, "ring"),
            (ENV_FORMAT, "yaml"),
            (ENV_PARALLEL, "maybe"),
        ] {
            let vars = env(&[(name, value)]);
            let mut config = ReshardConfig::default();
            let err = config
                .apply_overrides(|n| vars.get(n).cloned())
                .unwrap_err();
            match err {
                ReshardError::InvalidConfig(msg) => assert!(msg.contains(name), "{}", msg),
                other => panic!("{}={}: unexpected error {:?}", name, value, other),
            }
        }
    }

    #[test]
    fn test_load_rejects_bad_env_value() {
        let vars = env(&[(ENV_CHOOSER, "ring")]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "replicas = 3\n").unwrap();

        assert!(matches!(
            ReshardConfig::load_with(Some(&path), |n| vars.get(n).cloned()),
            Err(ReshardError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_precedence_cli_over_env_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            "shard_count = 5\nreplicas = 3\nsite_count = 50\nchooser = \"rendezvous\"\nparallel = true\n",
        )
        .unwrap();
        let vars = env(&[(ENV_REPLICAS, "4"), (ENV_SITE_COUNT, "70")]);

        let mut config = ReshardConfig::load_with(Some(&path), |n| vars.get(n).cloned()).unwrap();
        // file beats defaults
        assert_eq!(config.shard_count, 5);
        assert_eq!(config.chooser, ChooserKind::Rendezvous);
        assert_eq!(config.op, "del");
        // env beats file
        assert_eq!(config.replicas, 4);
        assert_eq!(config.site_count, 70);
        assert!(config.parallel);

        config.merge_cli(&CliOverrides {
            replicas: Some(2),
            chooser: Some(ChooserKind::Jump),
            parallel: Some(false),
            single: Some(true),
            ..Default::default()
        });
        // flags beat env and file
        assert_eq!(config.replicas, 2);
        assert_eq!(config.chooser, ChooserKind::Jump);
        assert!(!config.parallel);
        assert!(config.single);
        // untouched by flags
        assert_eq!(config.site_count, 70);
        assert_eq!(config.shard_count, 5);
    }

    #[test]
    fn test_merge_cli_empty_changes_nothing() {
        let mut config = ReshardConfig::default();
        config.parallel = true;
        let before = config.clone();
        config.merge_cli(&CliOverrides::default());
        assert_eq!(config, before);
    }

    #[test]
    fn test_bool_flags_parse_from_command_line() {
        use clap::Parser;

        #[derive(Parser)]
        struct Cmd {
            #[command(flatten)]
            overrides: CliOverrides,
        }

        let cmd = Cmd::try_parse_from(["reshard", "--parallel=false", "--single"]).unwrap();
        assert_eq!(cmd.overrides.parallel, Some(false));
        assert_eq!(cmd.overrides.single, Some(true));

        let cmd = Cmd::try_parse_from(["reshard"]).unwrap();
        assert_eq!(cmd.overrides, CliOverrides::default());
    }

    #[test]
    fn test_validate() {
        let mut config = ReshardConfig::default();
        config.op = "move".to_string();
        assert!(matches!(
            config.validate(),
            Err(ReshardError::InvalidOperation(_))
        ));

        let mut config = ReshardConfig::default();
        config.shard_count = 0;
        assert!(matches!(config.validate(), Err(ReshardError::InvalidConfig(_))));

        let mut config = ReshardConfig::default();
        config.replicas = 0;
        assert!(matches!(config.validate(), Err(ReshardError::InvalidConfig(_))));
    }

    #[test]
    fn test_target_bucket_defaults() {
        let mut config = ReshardConfig::default();
        let buckets = config.buckets();
        assert_eq!(config.target_bucket(&buckets).unwrap(), "met3");

        config.op = "add".to_string();
        assert_eq!(config.target_bucket(&buckets).unwrap(), "met4");

        config.op_shard = Some("met2".to_string());
        assert_eq!(
            config.reshard_op(&buckets).unwrap(),
            ReshardOp::Add("met2".to_string())
        );
    }

    #[test]
    fn test_hostnames() {
        let mut config = ReshardConfig::default();
        config.site_count = 2;
        assert_eq!(config.hostnames(), vec!["0.example.jp", "1.example.jp"]);
    }
}
