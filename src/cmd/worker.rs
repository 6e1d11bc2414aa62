use std::path::PathBuf;

use clap::Parser;

use crate::config::{default_worker_id, WorkerConfig};
use crate::task::is_valid_worker_id;
use crate::{Error, Result};

#[derive(Parser, Debug)]
#[command(version, about = "Run a MapReduce worker", long_about = None)]
pub struct Args {
    /// Connect to a coordinator at the given IP address and port
    #[clap(short, long)]
    pub join: String,
    /// Name of the workload to run
    #[clap(short = 'W', long)]
    pub workload: String,
    /// Exit after this many tasks without reporting the last one
    #[clap(long)]
    pub max_tasks: Option<usize>,
    /// Worker identity, defaults to the process id plus a random suffix
    #[clap(long)]
    pub id: Option<String>,
    /// Shared directory for intermediate and final outputs
    #[clap(short, long, default_value = ".")]
    pub work_dir: PathBuf,
    /// Attempts to reach the coordinator before giving up
    #[clap(long, default_value_t = 10)]
    pub connect_retries: u32,
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
    /// Auxiliary arguments to pass to the MapReduce application.
    #[clap(value_parser, last = true)]
    pub args: Vec<String>,
}

impl Args {
    pub fn config(&self) -> Result<WorkerConfig> {
        let worker_id = self.id.clone().unwrap_or_else(default_worker_id);
        if !is_valid_worker_id(&worker_id) {
            return Err(Error::Config(format!(
                "worker id {worker_id:?} may only contain ASCII letters, digits, '-' and '_'"
            )));
        }
        WorkerConfig::default()
            .with_work_dir(&self.work_dir)
            .with_worker_id(worker_id)
            .with_max_tasks(self.max_tasks)
            .with_args(&self.args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_arguments_go_to_the_workload() {
        let args = Args::try_parse_from([
            "mr-worker",
            "--join",
            "127.0.0.1:50051",
            "--workload",
            "grep",
            "--max-tasks",
            "2",
            "--",
            "--term",
            "fox",
        ])
        .unwrap();
        let config = args.config().unwrap();
        assert_eq!(config.max_tasks, Some(2));
        assert_eq!(&config.aux[..], br#"["--term","fox"]"#);
    }

    #[test]
    fn worker_id_with_path_separator_is_rejected() {
        let args = Args::try_parse_from([
            "mr-worker",
            "--join",
            "127.0.0.1:50051",
            "--workload",
            "wc",
            "--id",
            "../w1",
        ])
        .unwrap();
        assert!(matches!(args.config(), Err(Error::Config(_))));
    }
}
