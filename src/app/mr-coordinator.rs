use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;
use mrlease::cmd::coordinator::Args;
use mrlease::logging::init_logging;
use mrlease::merge::merge_outputs;
use mrlease::utils::expand_inputs;
use mrlease::{rpc, Coordinator};
use tokio::sync::oneshot;
use tracing::info;

/// How often `main` checks whether the job is done.
const DONE_POLL: Duration = Duration::from_secs(1);

/// Time left for waiting workers to receive their final reply.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let inputs = expand_inputs(&args.inputs)?;
    let n_map = inputs.len() as u32;
    let coordinator = Coordinator::new(inputs, args.n_reduce, args.config())?;
    let sweeper = coordinator.spawn_sweeper();

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, args.port));
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(rpc::serve(coordinator.clone(), addr, async move {
        let _ = stop_rx.await;
    }));

    tokio::select! {
        _ = coordinator.wait_done(DONE_POLL) => {}
        result = &mut server => {
            result??;
            return Err(anyhow!("coordinator server stopped before the job was done"));
        }
    }
    info!("job done, {} result shards published", args.n_reduce);

    let layout = coordinator.layout();
    if let Some(dest) = &args.merge {
        let lines = merge_outputs(layout, args.n_reduce, dest)?;
        println!("Merged {} lines into {}", lines, dest.display());
    }
    if args.cleanup {
        let removed = layout.remove_intermediates(n_map, args.n_reduce)?;
        info!("removed {} intermediate files", removed);
    }

    tokio::time::sleep(SHUTDOWN_GRACE).await;
    let _ = stop_tx.send(());
    server.await??;
    sweeper.await?;
    Ok(())
}
