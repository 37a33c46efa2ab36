#![allow(dead_code, non_snake_case, non_upper_case_globals)]

use clap::Parser;
use ndarray as nd;
use cce_sim::{
    mkdir,
    write_npz,
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
    let config = args.load_config(&paths, Some(CceVariant::SingleSample))?;
    let system = NvSystem::from_config(&config, &paths)?;
    let model = system.single_sample(&config)?;

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

    // sampled bath configuration, for reproducing the run
    let coords: nd::Array2<f64>
        = nd::Array2::from_shape_fn(
            (system.bath.len(), 3), |(i, a)| system.bath[i].coord[a]);
    let states: nd::Array1<u64>
        = model.states().iter().map(|s| *s as u64).collect();
    let seed: nd::Array1<u64> = nd::array![config.spin_bath.bath_state_seed];
    let outdir = paths.output.clone();
    mkdir!(outdir)?;
    let bath_file = outdir.join("bath_states.npz");
    write_npz!(
        &bath_file,
        arrays: {
            "coords" => &coords,
            "states" => &states,
            "seed" => &seed,
        }
    )?;
    println!("{}", sink.path().display());
    println!("{}", bath_file.display());
    Ok(())
}
