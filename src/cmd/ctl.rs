use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "Inspect a running MapReduce job", long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Commands,
    /// Coordinator address, defaults to 127.0.0.1:50051
    #[clap(short = 'J', long)]
    pub host: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Displays the current stage of the job and how many tasks are
    /// pending, assigned or completed in it.
    Status {
        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Block until the job is done.
    Wait {
        /// Polling interval in milliseconds
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
}
