use anyhow::Result;
use clap::Parser;
use mrlease::cmd::worker::Args;
use mrlease::logging::init_logging;
use mrlease::rpc::GrpcTaskSource;
use mrlease::{workload, Error, Worker};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let engine = workload::named(&args.workload)?;
    let config = args.config()?;
    let source = GrpcTaskSource::connect(&args.join, args.connect_retries).await?;
    let worker = Worker::new(source, engine, config);
    info!("worker {} joined {}", worker.id(), args.join);

    match worker.run().await {
        Ok(stats) => info!(
            "ran {} map and {} reduce tasks",
            stats.maps_run, stats.reduces_run
        ),
        // The coordinator exits once the job is done.
        Err(Error::Unavailable(reason)) => {
            info!("coordinator went away ({}), assuming the job is done", reason)
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
