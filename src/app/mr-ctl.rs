use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use mrlease::cmd::ctl::{Args, Commands};
use mrlease::cmd::DEFAULT_PORT;
use mrlease::rpc::GrpcTaskSource;
use mrlease::task::JobStatus;
use mrlease::Error;

fn display_status(status: &JobStatus) {
    println!("----------- JOB STATUS -----------");
    println!("Stage:\t\t{}", status.stage);
    println!("Map tasks:\t{}", status.n_map);
    println!("Reduce tasks:\t{}", status.n_reduce);
    if !status.done {
        println!("----------------------------------");
        println!("Pending:\t{}", status.pending);
        println!("Assigned:\t{}", status.assigned);
        println!("Completed:\t{}", status.completed);
    }
    println!("----------------------------------");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let host = args
        .host
        .unwrap_or_else(|| format!("127.0.0.1:{DEFAULT_PORT}"));
    let mut client = GrpcTaskSource::connect(&host, 0).await?;

    match args.command {
        Commands::Status { json } => {
            let status = client.job_status().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                display_status(&status);
            }
        }
        Commands::Wait { interval_ms } => {
            loop {
                match client.job_status().await {
                    Ok(status) if status.done => break,
                    Ok(_) => tokio::time::sleep(Duration::from_millis(interval_ms)).await,
                    // The coordinator exits shortly after the job is done.
                    Err(Error::Unavailable(_)) => break,
                    Err(e) => return Err(e.into()),
                }
            }
            println!("Job done");
        }
    }

    Ok(())
}
