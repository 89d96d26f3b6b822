mod config;
mod error;
mod gate;
mod harness;
mod hint;
mod resource;
mod stats;
mod view;
mod worker;

use std::env;

use anyhow::Context;
use clap::Parser;
use env_logger::{Env, Target};
use log::info;

use crate::config::Cli;

fn main() -> anyhow::Result<()> {
    // Use RUST_LOG to change verbosity, e.g. RUST_LOG=topmap=trace ./topmap
    // Collision lines share stdout with the report.
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Stdout)
        .init();

    let cli = Cli::parse();
    let config = cli.run_config();
    config.validate()?;

    let path = match &cli.file {
        Some(path) => path.clone(),
        None => env::current_exe().context("can't receive file name")?,
    };
    println!("FileName to map: {}", path.display());

    if cli.compare {
        let cmp = harness::compare(&config, &path).context("benchmark run failed")?;
        println!("{}", cmp.os_choice);
        println!("{}", cmp.top_down);
        println!("top-down overhead: {:+.1}%", cmp.overhead());
    } else {
        let report = harness::run(&config, &path).context("benchmark run failed")?;
        println!("{}", report);
    }

    info!("done");
    Ok(())
}
