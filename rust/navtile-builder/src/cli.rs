use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing::info;

use crate::build::{convert_file, verify_file, BuildSummary, VerifyOptions, VerifyReport};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

#[derive(Parser, Debug)]
#[command(name = "navtile-builder", version, about = "Convert an exported navigation mesh into a tile-set file")]
pub struct Args {
    /// Exported navigation mesh (text or binary asset)
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Output tile-set file
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Random straight-path queries run against the written file; 0 skips verification
    #[arg(long = "verify-iterations", value_name = "N", default_value_t = 100)]
    pub verify_iterations: u32,

    /// Search node ceiling for verification queries
    #[arg(long = "max-nodes", value_name = "N", default_value_t = 2048)]
    pub max_nodes: usize,

    /// Seed for reproducible verification
    #[arg(long = "seed", value_name = "SEED")]
    pub seed: Option<u64>,

    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub build: BuildSummary,
    pub verify: Option<VerifyReport>,
}

pub fn run(args: &Args) -> Result<RunSummary> {
    info!(?args, "starting builder");
    let build = convert_file(&args.source, &args.output)?;
    if args.verify_iterations == 0 {
        return Ok(RunSummary { build, verify: None });
    }
    let opts = VerifyOptions { iterations: args.verify_iterations, max_nodes: args.max_nodes, seed: args.seed };
    let report = verify_file(&args.output, &opts)?;
    Ok(RunSummary { build, verify: Some(report) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_cli_contract() {
        let args = Args::try_parse_from(["navtile-builder", "in.asset", "out.bin"]).unwrap();
        assert_eq!(args.source, PathBuf::from("in.asset"));
        assert_eq!(args.output, PathBuf::from("out.bin"));
        assert_eq!(args.verify_iterations, 100);
        assert_eq!(args.max_nodes, 2048);
        assert_eq!(args.seed, None);
        assert_eq!(args.log_format, LogFormat::Json);
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::try_parse_from([
            "navtile-builder", "a", "b", "--verify-iterations", "0", "--max-nodes", "64", "--seed", "7", "--log-format", "text",
        ])
        .unwrap();
        assert_eq!((args.verify_iterations, args.max_nodes, args.seed), (0, 64, Some(7)));
        assert_eq!(args.log_format, LogFormat::Text);
    }

    #[test]
    fn output_is_required() {
        assert!(Args::try_parse_from(["navtile-builder", "in.asset"]).is_err());
    }
}
