//! Piecewise-constant propagation of the two central-spin branches under a
//! dynamical decoupling sequence.

use std::{ fmt, str::FromStr };
use ndarray as nd;
use num_complex::Complex64 as C64;
use rustc_hash::FxHashMap as HashMap;
use serde::{ Deserialize, Serialize };
use crate::{
    error::{ CceError, CceResult },
    physics::expm,
};

/// Method used to compute segment propagators.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelMethod {
    /// Scaling-and-squaring Padé exponential at every time step.
    #[default]
    Pade,
    /// Hermitian eigendecomposition once per Hamiltonian. Requires the
    /// `openblas` feature.
    Eigen,
}

impl KernelMethod {
    /// Return `true` if this method is available in the current build.
    pub fn available(self) -> bool {
        match self {
            Self::Pade => true,
            Self::Eigen => cfg!(feature = "openblas"),
        }
    }
}

/// Dynamical decoupling sequence acting on the central spin.
///
/// Each π pulse swaps the two central-spin states, so the bath sees the two
/// branch Hamiltonians alternately over segments whose lengths are fixed
/// fractions of the total evolution time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PulseSequence {
    /// Free induction decay; no pulses.
    Fid,
    /// A single refocusing pulse at the midpoint.
    Hahn,
    /// Carr-Purcell-Meiboom-Gill with `n` equally spaced pulses.
    Cpmg(usize),
}

impl PulseSequence {
    /// Build a sequence from a pulse name and, for CPMG, the pulse count.
    pub fn from_name(name: &str, pulse_number: usize) -> CceResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "fid" => Ok(Self::Fid),
            "hahn" | "echo" => Ok(Self::Hahn),
            "cpmg" if pulse_number > 0 => Ok(Self::Cpmg(pulse_number)),
            "cpmg" => Err(CceError::config("CPMG requires a positive pulse_number")),
            other => Err(CceError::config(format!("unknown pulse sequence '{}'", other))),
        }
    }

    /// Number of π pulses.
    pub fn num_pulses(self) -> usize {
        match self {
            Self::Fid => 0,
            Self::Hahn => 1,
            Self::Cpmg(n) => n,
        }
    }

    /// Lengths of the free-evolution segments as fractions of the total time.
    ///
    /// The fractions are positive and sum to one.
    pub fn intervals(self) -> Vec<f64> {
        let n = self.num_pulses();
        if n == 0 { return vec![1.0]; }
        let half = 1.0 / (2 * n) as f64;
        let full = 1.0 / n as f64;
        let mut fracs = Vec::with_capacity(n + 1);
        fracs.push(half);
        fracs.extend(std::iter::repeat(full).take(n - 1));
        fracs.push(half);
        fracs
    }
}

impl fmt::Display for PulseSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fid => write!(f, "FID"),
            Self::Hahn => write!(f, "Hahn"),
            Self::Cpmg(n) => write!(f, "CPMG-{}", n),
        }
    }
}

impl FromStr for PulseSequence {
    type Err = CceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('-') {
            Some((name, n)) => {
                let n: usize
                    = n.parse()
                    .map_err(|_| CceError::config(format!("bad pulse count in '{}'", s)))?;
                Self::from_name(name, n)
            },
            None => Self::from_name(s, 0),
        }
    }
}

/// Interleave `a` and `b`, starting with `a`, for `n` items.
pub fn riffle<T: Clone>(a: T, b: T, n: usize) -> Vec<T> {
    (0..n).map(|k| if k % 2 == 0 { a.clone() } else { b.clone() }).collect()
}

/// Computes `exp(-i H dt)` for a fixed Hamiltonian and arbitrary `dt`.
#[derive(Clone, Debug)]
enum Exponentiator {
    Pade(nd::Array2<C64>),
    #[cfg(feature = "openblas")]
    Eigen { values: nd::Array1<f64>, vectors: nd::Array2<C64> },
}

impl Exponentiator {
    fn new(h: &nd::Array2<C64>, method: KernelMethod) -> Result<Self, String> {
        match method {
            KernelMethod::Pade => Ok(Self::Pade(h.clone())),
            #[cfg(feature = "openblas")]
            KernelMethod::Eigen => {
                use ndarray_linalg::{ Eigh, UPLO };
                let (values, vectors)
                    = h.eigh(UPLO::Lower)
                    .map_err(|e| format!("diagonalization error: {}", e))?;
                Ok(Self::Eigen { values, vectors })
            },
            #[cfg(not(feature = "openblas"))]
            KernelMethod::Eigen => {
                Err("eigen kernel requires the `openblas` feature".to_string())
            },
        }
    }

    fn propagate(&self, dt: f64) -> Result<nd::Array2<C64>, String> {
        match self {
            Self::Pade(h) => {
                expm::unitary_exp(h, dt)
                    .ok_or_else(|| "singular Padé denominator".to_string())
            },
            #[cfg(feature = "openblas")]
            Self::Eigen { values, vectors } => {
                let phases = values.mapv(|e| (-C64::i() * e * dt).exp());
                let scaled = vectors * &phases.insert_axis(nd::Axis(0));
                Ok(scaled.dot(&vectors.t().mapv(|x| x.conj())))
            },
        }
    }
}

/// Time evolution of both central-spin branches for a single cluster.
///
/// Branch 0 starts under `h0` and branch 1 under `h1`; the Hamiltonians swap at
/// every pulse.
#[derive(Clone, Debug)]
pub struct BranchEvolution {
    sequence: PulseSequence,
    exps: [Exponentiator; 2],
}

impl BranchEvolution {
    pub fn new(
        h0: &nd::Array2<C64>,
        h1: &nd::Array2<C64>,
        sequence: PulseSequence,
        method: KernelMethod,
    ) -> Result<Self, String>
    {
        let exps = [Exponentiator::new(h0, method)?, Exponentiator::new(h1, method)?];
        Ok(Self { sequence, exps })
    }

    /// Propagators `(U0, U1)` of the two branches over total time `t`.
    pub fn propagators(&self, t: f64)
        -> Result<(nd::Array2<C64>, nd::Array2<C64>), String>
    {
        let fracs = self.sequence.intervals();
        // branch 1 always sees the opposite riffle, whatever the pulse
        // parity; pairing equal riffles for odd pulse counts would make both
        // branches identical and pin L(t) to 1
        let order0 = riffle(0_usize, 1, fracs.len());
        let order1 = riffle(1_usize, 0, fracs.len());
        let mut cache: HashMap<(usize, u64), nd::Array2<C64>> = HashMap::default();
        let mut segment = |h: usize, f: f64| -> Result<nd::Array2<C64>, String> {
            if let Some(u) = cache.get(&(h, f.to_bits())) { return Ok(u.clone()); }
            let u = self.exps[h].propagate(f * t)?;
            cache.insert((h, f.to_bits()), u.clone());
            Ok(u)
        };
        let mut u0: Option<nd::Array2<C64>> = None;
        let mut u1: Option<nd::Array2<C64>> = None;
        for ((&f, &h0), &h1) in fracs.iter().zip(&order0).zip(&order1) {
            let p0 = segment(h0, f)?;
            let p1 = segment(h1, f)?;
            u0 = Some(match u0 { Some(u) => p0.dot(&u), None => p0 });
            u1 = Some(match u1 { Some(u) => p1.dot(&u), None => p1 });
        }
        match (u0, u1) {
            (Some(u0), Some(u1)) => Ok((u0, u1)),
            _ => Err("pulse sequence has no segments".to_string()),
        }
    }
}

/// Evenly spaced sample times from `t0` to `t1` inclusive.
pub fn time_list(t0: f64, t1: f64, n_time: usize) -> nd::Array1<f64> {
    nd::Array1::linspace(t0, t1, n_time)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intervals_sum_to_one() {
        for seq in [
            PulseSequence::Fid,
            PulseSequence::Hahn,
            PulseSequence::Cpmg(1),
            PulseSequence::Cpmg(4),
            PulseSequence::Cpmg(7),
        ] {
            let fracs = seq.intervals();
            assert_eq!(fracs.len(), seq.num_pulses() + 1);
            assert!((fracs.iter().sum::<f64>() - 1.0).abs() < 1e-14);
        }
        assert_eq!(PulseSequence::Cpmg(2).intervals(), vec![0.25, 0.5, 0.25]);
        assert_eq!(PulseSequence::Hahn.intervals(), PulseSequence::Cpmg(1).intervals());
    }

    #[test]
    fn parse_names() {
        assert_eq!("FID".parse::<PulseSequence>().unwrap(), PulseSequence::Fid);
        assert_eq!("hahn".parse::<PulseSequence>().unwrap(), PulseSequence::Hahn);
        assert_eq!("CPMG-8".parse::<PulseSequence>().unwrap(), PulseSequence::Cpmg(8));
        assert!("cpmg".parse::<PulseSequence>().is_err());
        assert!("ramsey".parse::<PulseSequence>().is_err());
    }

    #[test]
    fn riffle_alternates() {
        assert_eq!(riffle('a', 'b', 5), vec!['a', 'b', 'a', 'b', 'a']);
        assert!(riffle(0, 1, 0).is_empty());
    }

    #[test]
    fn echo_refocuses_static_difference() {
        // commuting branch Hamiltonians: a Hahn echo exactly cancels the
        // relative phase, so U1^† U0 = 1
        let h0 = nd::Array2::from_diag(&nd::array![C64::from(0.3), C64::from(-0.3)]);
        let h1 = nd::Array2::from_diag(&nd::array![C64::from(-1.1), C64::from(1.1)]);
        let evol
            = BranchEvolution::new(&h0, &h1, PulseSequence::Hahn, KernelMethod::Pade)
            .unwrap();
        let (u0, u1) = evol.propagators(5.0).unwrap();
        let overlap = u1.t().mapv(|x| x.conj()).dot(&u0);
        let dev
            = (&overlap - &nd::Array2::<C64>::eye(2))
            .iter().map(|x| x.norm()).fold(0.0, f64::max);
        assert!(dev < 1e-10);
    }

    #[cfg(not(feature = "openblas"))]
    #[test]
    fn eigen_unavailable_without_blas() {
        assert!(!KernelMethod::Eigen.available());
        let h = nd::Array2::<C64>::eye(2);
        assert!(BranchEvolution::new(&h, &h, PulseSequence::Fid, KernelMethod::Eigen).is_err());
    }
}
