use clap::Parser;
use log::{info, LevelFilter};

mod args;
mod recon;

use crate::args::Args;

fn main() {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    // RUST_LOG still takes precedence over the default level.
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
    info!("args: {:?}", args);

    let res = recon::run_reconciliation_job(
        &args.config,
        args.output.as_deref(),
        args.out.as_deref(),
        args.reference.as_deref(),
    );

    if let Err(e) = res {
        eprintln!("An error occured: {}", e);
        std::process::exit(1);
    }
}
