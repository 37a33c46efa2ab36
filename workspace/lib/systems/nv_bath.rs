use cce_sim::{
    bath::{ FaceCenteredLattice2D, SpinCollection, SpinFile, SpinSource },
    cluster::{
        ClusterGrouping,
        ClusterSpace,
        DepthFirstPathTracing,
        UniformBathOnLattice,
    },
    config::{ BathMethod, CceConfig, ProjectPaths },
    error::{ CceError, CceResult },
    physics::{ CenterSpin, EnsembleCce, SingleSampleCce },
    spin::Isotope,
};

/// Bath spin source selected by `spin_bath.method`.
pub fn bath_source(config: &CceConfig, paths: &ProjectPaths)
    -> CceResult<Box<dyn SpinSource>>
{
    match config.spin_bath.method {
        BathMethod::File => {
            let name
                = config.data.input_file.as_ref()
                .ok_or_else(|| CceError::config("data.input_file is not set"))?;
            Ok(Box::new(SpinFile::new(paths.input_file(name))))
        },
        BathMethod::Lattice => {
            let isotope
                = Isotope::lookup(&config.lattice.isotope)
                .ok_or_else(|| CceError::config(format!(
                    "unknown isotope '{}'", config.lattice.isotope)))?;
            Ok(Box::new(FaceCenteredLattice2D::new(
                config.lattice.lattice_const,
                isotope,
                config.lattice.full_range,
            )))
        },
    }
}

/// Cluster grouping strategy matching the bath source.
pub fn grouping(config: &CceConfig) -> Box<dyn ClusterGrouping> {
    let cutoff = config.spin_bath.cut_off_dist;
    match config.spin_bath.method {
        BathMethod::File => Box::new(DepthFirstPathTracing::new(cutoff)),
        BathMethod::Lattice => {
            Box::new(UniformBathOnLattice::new(cutoff, config.lattice.root_range))
        },
    }
}

/// A central spin with its bath and enumerated clusters.
#[derive(Clone, Debug)]
pub struct NvSystem {
    pub center: CenterSpin,
    pub bath: SpinCollection,
    pub space: ClusterSpace,
}

impl NvSystem {
    pub fn from_config(config: &CceConfig, paths: &ProjectPaths) -> CceResult<Self> {
        let center = config.center_spin()?;
        let bath = SpinCollection::from_source(bath_source(config, paths)?.as_ref())?;
        let space
            = ClusterSpace::build(grouping(config).as_ref(), &bath, config.cce.max_order)?;
        tracing::info!(
            center = %center.name,
            num_spins = bath.len(),
            counts = ?space.counts(),
            "built cluster space",
        );
        Ok(Self { center, bath, space })
    }

    pub fn ensemble(&self, config: &CceConfig) -> CceResult<EnsembleCce> {
        EnsembleCce::new(self.bath.clone(), self.center.clone(), config.dynamics()?)
    }

    pub fn single_sample(&self, config: &CceConfig) -> CceResult<SingleSampleCce> {
        SingleSampleCce::new(
            self.bath.clone(),
            self.center.clone(),
            config.dynamics()?,
            config.spin_bath.bath_state_seed,
        )
    }
}
