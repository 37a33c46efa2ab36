#![allow(dead_code, non_snake_case, non_upper_case_globals)]

use clap::Parser;
use cce_sim::{
    config::{ CceVariant, ProjectPaths },
    output::{ NpzSink, ResultSink },
    run_threads,
};
use lib::{
    cli::{ RunArgs, init_logging, log_summary },
    systems::nv_bath::NvSystem,
};

fn main() -> anyhow::Result<()> {
    let args = RunArgs::parse();
    init_logging(&args.log_level);

    let paths = ProjectPaths::from_env()?;
    let config = args.load_config(&paths, Some(CceVariant::Ensemble))?;
    let system = NvSystem::from_config(&config, &paths)?;
    let model = system.ensemble(&config)?;

    let output
        = run_threads(
            &system.space,
            &model,
            model.time(),
            config.cce.workers,
            config.cce.tolerance,
        )?;
    log_summary(&output);

    let mut sink = NpzSink::new(paths.output_file(&config.data.output_file));
    sink.export(&output)?;
    println!("{}", sink.path().display());
    Ok(())
}
