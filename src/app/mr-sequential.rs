use anyhow::Result;
use bytes::Bytes;
use clap::Parser;
use mrlease::cmd::sequential::Args;
use mrlease::logging::init_logging;
use mrlease::merge::merge_outputs;
use mrlease::publish::OutputLayout;
use mrlease::standalone::run_sequential;
use mrlease::utils::expand_inputs;
use mrlease::workload;

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let engine = workload::named(&args.workload)?;
    let inputs = expand_inputs(&args.inputs)?;
    let aux = Bytes::from(serde_json::to_vec(&args.args)?);
    let layout = OutputLayout::new(&args.work_dir);

    run_sequential(&inputs, args.n_reduce, engine, aux, &layout)?;
    let lines = merge_outputs(&layout, args.n_reduce, &args.output)?;
    layout.remove_intermediates(inputs.len() as u32, args.n_reduce)?;

    println!("Wrote {} lines to {}", lines, args.output.display());
    Ok(())
}
