//! Coherence models for ensemble-averaged and single-sample CCE.

use ndarray as nd;
use num_complex::Complex64 as C64;
use rand::{ rngs::StdRng, Rng, SeedableRng };
use crate::{
    bath::{ dist, SpinCollection },
    cluster::ClusterIndex,
    error::{ CceError, CceResult },
    physics::{
        BranchEvolution,
        CenterSpin,
        HBuilderCluster,
        KernelMethod,
        MeanField,
        PulseSequence,
        hamiltonian::kron_all,
        time_list,
    },
    runner::CoherenceModel,
};

/// Experimental conditions shared by every cluster.
#[derive(Clone, Debug, PartialEq)]
pub struct Dynamics {
    /// Static magnetic field, in gauss.
    pub magnetic_field: [f64; 3],
    pub sequence: PulseSequence,
    pub method: KernelMethod,
    /// Total evolution times, in milliseconds.
    pub time: nd::Array1<f64>,
}

impl Dynamics {
    pub fn new(
        magnetic_field: [f64; 3],
        sequence: PulseSequence,
        method: KernelMethod,
        t0: f64,
        t1: f64,
        n_time: usize,
    ) -> CceResult<Self>
    {
        if n_time == 0 {
            return Err(CceError::config("n_time must be positive"));
        }
        if !(t0.is_finite() && t1.is_finite()) || t1 < t0 || t0 < 0.0 {
            return Err(CceError::config(format!(
                "invalid time range [{}, {}]", t0, t1)));
        }
        if !method.available() {
            return Err(CceError::config(format!(
                "kernel {:?} is not available in this build", method)));
        }
        let time = time_list(t0, t1, n_time);
        Ok(Self { magnetic_field, sequence, method, time })
    }
}

fn check_center(bath: &SpinCollection, center: &CenterSpin) -> CceResult<()> {
    center.projections()?;
    if let Some(s) = bath.iter().find(|s| dist(&s.coord, &center.coord) < 1e-9) {
        return Err(CceError::config(format!(
            "bath spin {} coincides with center spin {}", s.id, center.name)));
    }
    Ok(())
}

fn evolution_error(cluster: &ClusterIndex, reason: String) -> CceError {
    CceError::Evolution { order: cluster.len(), spins: cluster.to_vec(), reason }
}

/// Ensemble CCE: the bath starts in a product of (possibly polarized) mixed
/// states and the coherence is
/// ```math
/// L(t) = \text{Re}\, \text{Tr}\left[ U_0(t) \rho\, U_1^\dagger(t) \right]
/// ```
/// with the two branches evolving under opposite Hamiltonian riffles for every
/// pulse count, as in [`SingleSampleCce`].
#[derive(Clone, Debug)]
pub struct EnsembleCce {
    bath: SpinCollection,
    center: CenterSpin,
    dynamics: Dynamics,
    polarization: [f64; 3],
}

impl EnsembleCce {
    pub fn new(bath: SpinCollection, center: CenterSpin, dynamics: Dynamics)
        -> CceResult<Self>
    {
        check_center(&bath, &center)?;
        Ok(Self { bath, center, dynamics, polarization: [0.0; 3] })
    }

    /// Set the mean spin vector `⟨I⟩` of every bath spin. Zero by default.
    pub fn with_polarization(mut self, polarization: [f64; 3]) -> Self {
        self.polarization = polarization;
        self
    }

    pub fn bath(&self) -> &SpinCollection { &self.bath }

    pub fn time(&self) -> &nd::Array1<f64> { &self.dynamics.time }

    /// `ρ = (1 + 3 / (j (j + 1)) p·I) / (2j + 1)` for a single spin.
    fn single_state(&self, k: usize) -> nd::Array2<C64> {
        let spin = self.bath[k].isotope.spin;
        let j = spin.f();
        let d = spin.dim() as f64;
        let ops = spin.operators();
        let p = self.polarization.map(|x| x * 3.0 / (j * (j + 1.0)));
        let rho: nd::Array2<C64> = nd::Array2::eye(spin.dim()) + ops.dot(&p);
        rho / C64::from(d)
    }
}

impl CoherenceModel for EnsembleCce {
    fn n_time(&self) -> usize { self.dynamics.time.len() }

    fn coherence(&self, cluster: &ClusterIndex) -> CceResult<nd::Array1<f64>> {
        let hb = HBuilderCluster::new(
            &self.bath, &self.center, self.dynamics.magnetic_field);
        let [h0, h1] = hb.build_branches(cluster)?;
        let evol
            = BranchEvolution::new(&h0, &h1, self.dynamics.sequence, self.dynamics.method)
            .map_err(|r| evolution_error(cluster, r))?;
        let states: Vec<nd::Array2<C64>>
            = cluster.iter().map(|k| self.single_state(*k)).collect();
        let rho = kron_all(states.iter());
        self.dynamics.time.iter()
            .map(|&t| {
                let (u0, u1)
                    = evol.propagators(t)
                    .map_err(|r| evolution_error(cluster, r))?;
                let tr: C64 = (u0.dot(&rho) * u1.mapv(|x| x.conj())).sum();
                Ok(tr.re)
            })
            .collect::<CceResult<Vec<f64>>>()
            .map(nd::Array1::from)
    }
}

/// Single-sample CCE: every bath spin is frozen into a random projection
/// eigenstate drawn once from a seeded generator, and the coherence is
/// ```math
/// L(t) = \text{Re} \langle U_0(t) \psi | U_1(t) \psi \rangle
/// ```
/// where `ψ` is the product state of the cluster's spins. Spins outside the
/// cluster act through their static mean field.
#[derive(Clone, Debug)]
pub struct SingleSampleCce {
    bath: SpinCollection,
    center: CenterSpin,
    dynamics: Dynamics,
    states: Vec<usize>,
    mean_field: MeanField,
}

impl SingleSampleCce {
    pub fn new(
        bath: SpinCollection,
        center: CenterSpin,
        dynamics: Dynamics,
        seed: u64,
    ) -> CceResult<Self>
    {
        check_center(&bath, &center)?;
        let mut rng = StdRng::seed_from_u64(seed);
        let states: Vec<usize>
            = bath.iter()
            .map(|s| rng.gen_range(0..s.isotope.spin.dim()))
            .collect();
        Self::with_states(bath, center, dynamics, states)
    }

    /// Use explicit projection indices (ascending order) for each bath spin.
    pub fn with_states(
        bath: SpinCollection,
        center: CenterSpin,
        dynamics: Dynamics,
        states: Vec<usize>,
    ) -> CceResult<Self>
    {
        check_center(&bath, &center)?;
        if states.len() != bath.len() {
            return Err(CceError::config(format!(
                "{} bath states given for {} bath spins", states.len(), bath.len())));
        }
        let projections: Vec<f64>
            = bath.iter().zip(&states)
            .map(|(s, k)| {
                s.isotope.spin.projection(*k)
                    .map(|m| m.f())
                    .ok_or_else(|| CceError::config(format!(
                        "bath spin {} has no state index {}", s.id, k)))
            })
            .collect::<CceResult<_>>()?;
        let mean_field = MeanField::new(&bath, projections);
        tracing::debug!(num_spins = bath.len(), "sampled bath state");
        Ok(Self { bath, center, dynamics, states, mean_field })
    }

    pub fn bath(&self) -> &SpinCollection { &self.bath }

    pub fn time(&self) -> &nd::Array1<f64> { &self.dynamics.time }

    /// Sampled projection index of each bath spin.
    pub fn states(&self) -> &[usize] { &self.states }

    // index of the cluster's product state in the tensor-product basis
    fn state_index(&self, cluster: &ClusterIndex) -> usize {
        cluster.iter()
            .fold(0, |acc, k| acc * self.bath[*k].isotope.spin.dim() + self.states[*k])
    }
}

impl CoherenceModel for SingleSampleCce {
    fn n_time(&self) -> usize { self.dynamics.time.len() }

    fn coherence(&self, cluster: &ClusterIndex) -> CceResult<nd::Array1<f64>> {
        let hb
            = HBuilderCluster::new(&self.bath, &self.center, self.dynamics.magnetic_field)
            .with_mean_field(&self.mean_field);
        let [h0, h1] = hb.build_branches(cluster)?;
        let evol
            = BranchEvolution::new(&h0, &h1, self.dynamics.sequence, self.dynamics.method)
            .map_err(|r| evolution_error(cluster, r))?;
        let p = self.state_index(cluster);
        self.dynamics.time.iter()
            .map(|&t| {
                let (u0, u1)
                    = evol.propagators(t)
                    .map_err(|r| evolution_error(cluster, r))?;
                let overlap: C64
                    = u0.column(p).iter().zip(u1.column(p))
                    .map(|(a, b)| a.conj() * b)
                    .sum();
                Ok(overlap.re)
            })
            .collect::<CceResult<Vec<f64>>>()
            .map(nd::Array1::from)
    }
}
