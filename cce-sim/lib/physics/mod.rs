//! Cluster Hamiltonians, propagation, and coherence models.
//!
//! Units are angstroms for lengths, gauss for magnetic fields, milliseconds for
//! times, and rad ms<sup>-1</sup> for energies, so gyromagnetic ratios are in
//! rad ms<sup>-1</sup> G<sup>-1</sup>.

use crate::{
    bath::dist,
    error::{ CceError, CceResult },
    spin::{ GAMMA_E, SpinTotal },
};

pub mod expm;

pub mod kernel;
pub use kernel::{ BranchEvolution, KernelMethod, PulseSequence, riffle, time_list };

pub mod hamiltonian;
pub use hamiltonian::{ HBuilderCluster, MeanField };

pub mod models;
pub use models::{ Dynamics, EnsembleCce, SingleSampleCce };

/// `μ0 ħ / 4π` in rad ms<sup>-1</sup> Å<sup>3</sup> per
/// (rad ms<sup>-1</sup> G<sup>-1</sup>)<sup>2</sup>.
pub const DIPOLAR_PREFACTOR: f64 = 1.0546;

/// Dipolar coupling tensor between two spins,
/// `T_ab = D γ1 γ2 / r^3 (δ_ab - 3 n_a n_b)`, where `n` is the unit vector
/// joining them.
///
/// Returns the zero tensor for coincident positions.
pub fn dipolar_tensor(gamma1: f64, gamma2: f64, r1: &[f64; 3], r2: &[f64; 3])
    -> [[f64; 3]; 3]
{
    let r = dist(r1, r2);
    let mut t = [[0.0; 3]; 3];
    if r < f64::EPSILON { return t; }
    let n: [f64; 3] = [(r2[0] - r1[0]) / r, (r2[1] - r1[1]) / r, (r2[2] - r1[2]) / r];
    let coeff = DIPOLAR_PREFACTOR * gamma1 * gamma2 / r.powi(3);
    for a in 0..3 {
        for b in 0..3 {
            let delta = if a == b { 1.0 } else { 0.0 };
            t[a][b] = coeff * (delta - 3.0 * n[a] * n[b]);
        }
    }
    t
}

/// The central (defect) spin.
///
/// The central spin is treated as a fixed eigenstate of its own Hamiltonian in
/// each of two branches, selected by `states` as indices into its projections
/// in ascending order.
#[derive(Clone, Debug, PartialEq)]
pub struct CenterSpin {
    pub name: String,
    pub coord: [f64; 3],
    pub spin: SpinTotal,
    pub gamma: f64,
    pub states: [usize; 2],
}

impl CenterSpin {
    pub fn new(
        name: &str,
        coord: [f64; 3],
        spin: SpinTotal,
        gamma: f64,
        states: [usize; 2],
    ) -> Self
    {
        Self { name: name.to_string(), coord, spin, gamma, states }
    }

    /// Electronic spin-1 center with electron gyromagnetic ratio, in the
    /// `m = 0` and `m = +1` branches.
    pub fn spin_one(name: &str, coord: [f64; 3]) -> Self {
        Self::new(name, coord, SpinTotal::ONE, GAMMA_E, [1, 2])
    }

    /// Spin projections of the two branches.
    pub fn projections(&self) -> CceResult<[f64; 2]> {
        let proj = |k: usize| {
            self.spin.projection(k)
                .map(|m| m.f())
                .ok_or_else(|| CceError::config(format!(
                    "center spin {} has no state index {}; dimension is {}",
                    self.name, k, self.spin.dim(),
                )))
        };
        Ok([proj(self.states[0])?, proj(self.states[1])?])
    }
}
