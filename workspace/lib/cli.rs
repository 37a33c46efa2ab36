//! Command-line arguments and logging setup common to all binaries.

use std::path::PathBuf;
use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{ fmt, prelude::*, EnvFilter };
use cce_sim::{
    cce::CceOutput,
    config::{ CceConfig, CceVariant, ProjectPaths },
};

#[derive(Clone, Debug, Parser)]
pub struct RunArgs {
    /// Configuration file, either an existing path or a name under
    /// `dat/config`
    #[arg(short, long, default_value = "cce.toml")]
    pub config: PathBuf,

    /// Override the configured number of worker ranks
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes
    /// precedence
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl RunArgs {
    /// Load and validate the configuration, applying command-line overrides.
    ///
    /// If `variant` is given and differs from the configured one, the
    /// configured value is replaced with a warning.
    pub fn load_config(&self, paths: &ProjectPaths, variant: Option<CceVariant>)
        -> anyhow::Result<CceConfig>
    {
        let file = paths.config_file(&self.config);
        let mut config
            = CceConfig::load(&file)
            .with_context(|| format!("loading {}", file.display()))?;
        if let Some(workers) = self.workers {
            config.cce.workers = workers;
        }
        if let Some(v) = variant {
            if config.cce.variant != v {
                tracing::warn!(
                    configured = ?config.cce.variant,
                    running = ?v,
                    "overriding configured CCE variant",
                );
                config.cce.variant = v;
            }
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

/// Install a formatting subscriber filtered by `RUST_LOG`, falling back to
/// `level`.
pub fn init_logging(level: &str) {
    let filter
        = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

/// Log the cumulative coherence at the final sample time for each order, and
/// every recorded instability.
pub fn log_summary(output: &CceOutput) {
    let n_time = output.time.len();
    if n_time > 0 {
        let last = output.coherence.cumulative.row(n_time - 1);
        for (k, (l, count)) in last.iter().zip(&output.counts).enumerate() {
            tracing::info!(
                order = k + 1,
                clusters = count,
                coherence = l,
                t = output.time[n_time - 1],
                "final coherence",
            );
        }
    }
    for inst in output.instabilities.iter() {
        tracing::warn!("{}", inst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_overrides() {
        let args
            = RunArgs::try_parse_from(["ensemble_cce", "-c", "run.toml", "--workers", "4"])
            .unwrap();
        assert_eq!(args.config, PathBuf::from("run.toml"));
        assert_eq!(args.workers, Some(4));
        assert_eq!(args.log_level, "info");
    }

    #[test]
    fn config_overrides_applied() {
        let dir = std::env::temp_dir().join(format!("cce-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("run.toml");
        std::fs::write(&file, "[spin_bath]\nmethod = \"lattice\"\n").unwrap();
        let args = RunArgs {
            config: file.clone(),
            workers: Some(3),
            log_level: "info".to_string(),
        };
        let paths = ProjectPaths::new(&dir);
        let config = args.load_config(&paths, Some(CceVariant::SingleSample)).unwrap();
        assert_eq!(config.cce.workers, 3);
        assert_eq!(config.cce.variant, CceVariant::SingleSample);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
