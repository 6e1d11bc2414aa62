use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about = "Run a MapReduce job in a single process", long_about = None)]
pub struct Args {
    /// Name of the workload
    #[arg(short = 'W', long)]
    pub workload: String,
    /// Number of reduce shards
    #[arg(short = 'r', long, default_value_t = 10)]
    pub n_reduce: u32,
    /// Directory for intermediate and per-shard outputs
    #[arg(short, long, default_value = ".")]
    pub work_dir: PathBuf,
    /// Merged, sorted output file
    #[arg(short, long)]
    pub output: PathBuf,
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
    /// Input files or glob patterns
    #[arg(required = true)]
    pub inputs: Vec<String>,
    /// Auxiliary arguments to pass to the MapReduce application.
    #[clap(value_parser, last = true)]
    pub args: Vec<String>,
}
