#![allow(dead_code, non_snake_case, non_upper_case_globals)]

use clap::Parser;
use itertools::Itertools;
use cce_sim::{
    config::ProjectPaths,
    partition::Partition,
};
use lib::{
    cli::{ RunArgs, init_logging },
    systems::nv_bath::NvSystem,
};

fn main() -> anyhow::Result<()> {
    let args = RunArgs::parse();
    init_logging(&args.log_level);

    let paths = ProjectPaths::from_env()?;
    let config = args.load_config(&paths, None)?;
    let system = NvSystem::from_config(&config, &paths)?;
    println!("{}", system.space);

    let partition = Partition::new(&system.space.counts(), config.cce.workers)?;
    println!("partition over {} workers:", partition.workers());
    for order in 0..partition.max_order() {
        let ranges
            = partition.slices(order)
            .map(|s| format!("[{}, {})", s.lo, s.hi))
            .join(" ");
        println!("  order {}: {}", order + 1, ranges);
    }
    Ok(())
}
