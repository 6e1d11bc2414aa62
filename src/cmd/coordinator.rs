use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::CoordinatorConfig;

#[derive(Parser, Debug)]
#[command(version, about = "Run the MapReduce coordinator for one job", long_about = None)]
pub struct Args {
    /// Port for the coordinator to listen on
    #[clap(short = 'P', long, default_value_t = super::DEFAULT_PORT)]
    pub port: u16,
    /// Number of reduce tasks (and result shards)
    #[clap(short = 'r', long, default_value_t = 10)]
    pub n_reduce: u32,
    /// Time a worker may hold a task before it is reassigned, in milliseconds
    #[clap(long, default_value_t = 10_000)]
    pub lease_ms: u64,
    /// Interval between lease-expiry sweeps, in milliseconds
    #[clap(long, default_value_t = 500)]
    pub sweep_ms: u64,
    /// Shared directory for intermediate and final outputs
    #[clap(short, long, default_value = ".")]
    pub work_dir: PathBuf,
    /// Also write all result shards, merged and sorted, to this file
    #[clap(short, long)]
    pub merge: Option<PathBuf>,
    /// Delete published intermediate files once the job is done
    #[clap(long)]
    pub cleanup: bool,
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
    /// Input files or glob patterns, one map task per file
    #[clap(required = true)]
    pub inputs: Vec<String>,
}

impl Args {
    pub fn config(&self) -> CoordinatorConfig {
        CoordinatorConfig::default()
            .with_work_dir(&self.work_dir)
            .with_lease(Duration::from_millis(self.lease_ms))
            .with_sweep_interval(Duration::from_millis(self.sweep_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_job_arguments() {
        let args = Args::try_parse_from([
            "mr-coordinator",
            "--n-reduce",
            "3",
            "--lease-ms",
            "2000",
            "--cleanup",
            "data/pg-*.txt",
            "extra.txt",
        ])
        .unwrap();
        assert_eq!(args.port, 50051);
        assert_eq!(args.n_reduce, 3);
        assert!(args.cleanup);
        assert_eq!(args.inputs, vec!["data/pg-*.txt", "extra.txt"]);
        assert_eq!(args.config().lease, Duration::from_secs(2));
    }

    #[test]
    fn inputs_are_required() {
        assert!(Args::try_parse_from(["mr-coordinator"]).is_err());
    }
}
