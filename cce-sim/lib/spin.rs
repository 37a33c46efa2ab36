//! Spin quantum numbers, spin-*j* operator matrices, and nuclear isotope data.

use std::hash::Hash;
use ndarray as nd;
use num_complex::Complex64 as C64;
use num_traits::Zero;

/// A single spin-projection quantum number.
///
/// This type is backed by a single `i32` representing the number of halves.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpinProj(i32);

impl SpinProj {
    /// Create a new spin projection from a number of halves.
    pub fn new(m: i32) -> Self { Self(m) }

    /// Return `self` as a bare number of halves.
    pub fn halves(self) -> i32 { self.0 }

    /// Return `self` as an `f64`.
    ///
    /// This reflects the "true" value of the projection quantum number; i.e.
    /// there is a relative factor of 2 between this and [`Self::halves`].
    pub fn f(self) -> f64 { f64::from(self.0) / 2.0 }

    /// Create a new spin-projection quantum number from a `f64` value, rounding
    /// to the nearest half-integer.
    pub fn from_f64(f: f64) -> Self { Self((2.0 * f).round() as i32) }
}

impl From<SpinProj> for f64 {
    fn from(m: SpinProj) -> Self { m.f() }
}

/// A single total-spin quantum number.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpinTotal(u32);

impl SpinTotal {
    /// Spin-1/2.
    pub const HALF: Self = Self(1);

    /// Spin-1.
    pub const ONE: Self = Self(2);

    /// Create a new total spin from a number of halves.
    pub fn new(j: u32) -> Self { Self(j) }

    /// Return `self` as a bare number of halves.
    pub fn halves(self) -> u32 { self.0 }

    /// Return `self` as an `f64`.
    pub fn f(self) -> f64 { f64::from(self.0) / 2.0 }

    /// Create a new total-spin quantum number from a `f64` value, rounding
    /// to the nearest half-integer.
    ///
    /// Negative inputs are passed through [`f64::abs`] before rounding.
    pub fn from_f64(f: f64) -> Self { Self((2.0 * f.abs()).round() as u32) }

    /// Dimension of the associated Hilbert space, `2j + 1`.
    pub fn dim(self) -> usize { self.0 as usize + 1 }

    /// Return an iterator over available projections in ascending order.
    pub fn projections(self) -> SpinProjections {
        SpinProjections { total: self, next: -(self.0 as i32) }
    }

    /// Return the `k`-th projection in ascending order, if it exists.
    pub fn projection(self, k: usize) -> Option<SpinProj> {
        self.projections().nth(k)
    }

    /// Compute the `(S_x, S_y, S_z)` matrices in the basis of ascending
    /// projections.
    pub fn operators(self) -> SpinOperators {
        let n = self.dim();
        let j = self.f();
        let m: Vec<f64> = self.projections().map(|m| m.f()).collect();
        let mut sz: nd::Array2<C64> = nd::Array2::zeros((n, n));
        let mut sp: nd::Array2<C64> = nd::Array2::zeros((n, n));
        for (k, mk) in m.iter().enumerate() {
            sz[[k, k]] = C64::from(*mk);
            // <m + 1| S+ |m> = sqrt(j(j + 1) - m(m + 1))
            if k + 1 < n {
                sp[[k + 1, k]]
                    = C64::from((j * (j + 1.0) - mk * (mk + 1.0)).sqrt());
            }
        }
        let sm = sp.t().mapv(|a| a.conj());
        let sx = (&sp + &sm).mapv(|a| a / 2.0);
        let sy = (&sp - &sm).mapv(|a| a / (2.0 * C64::i()));
        SpinOperators { x: sx, y: sy, z: sz }
    }
}

impl From<SpinTotal> for f64 {
    fn from(j: SpinTotal) -> Self { j.f() }
}

/// Iterator over spin projections for a fixed total spin, in ascending order.
#[derive(Copy, Clone, Debug)]
pub struct SpinProjections {
    total: SpinTotal,
    next: i32,
}

impl Iterator for SpinProjections {
    type Item = SpinProj;

    fn next(&mut self) -> Option<Self::Item> {
        if i64::from(self.next) > i64::from(self.total.0) { return None; }
        let m = SpinProj(self.next);
        self.next += 2;
        Some(m)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n
            = ((i64::from(self.total.0) - i64::from(self.next)) / 2 + 1)
            .max(0) as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for SpinProjections { }

/// Cartesian spin operator matrices for a single spin.
#[derive(Clone, Debug, PartialEq)]
pub struct SpinOperators {
    pub x: nd::Array2<C64>,
    pub y: nd::Array2<C64>,
    pub z: nd::Array2<C64>,
}

impl SpinOperators {
    /// Return the operators as an array indexed by Cartesian axis.
    pub fn xyz(&self) -> [&nd::Array2<C64>; 3] { [&self.x, &self.y, &self.z] }

    /// Compute `v · S` for a real vector `v`.
    pub fn dot(&self, v: &[f64; 3]) -> nd::Array2<C64> {
        let mut acc: nd::Array2<C64> = nd::Array2::zeros(self.z.raw_dim());
        for (vk, sk) in v.iter().zip(self.xyz()) {
            if vk.is_zero() { continue; }
            acc.scaled_add(C64::from(*vk), sk);
        }
        acc
    }
}

/// Gyromagnetic ratio of the free electron, in rad ms^-1 G^-1.
pub const GAMMA_E: f64 = -17608.597;

/// A spin-carrying isotope.
#[derive(Clone, Debug, PartialEq)]
pub struct Isotope {
    /// Isotope label, e.g. `"13C"`.
    pub name: String,
    /// Nuclear spin.
    pub spin: SpinTotal,
    /// Gyromagnetic ratio, in rad ms^-1 G^-1.
    pub gamma: f64,
}

impl Isotope {
    /// Look up a known isotope by label.
    pub fn lookup(name: &str) -> Option<Self> {
        let (spin, gamma)
            = match name {
                "1H" => (SpinTotal::HALF, 26.752_219),
                "13C" => (SpinTotal::HALF, 6.728_284),
                "14N" => (SpinTotal::ONE, 1.933_779),
                "15N" => (SpinTotal::HALF, -2.712_618),
                "29Si" => (SpinTotal::HALF, -5.319_0),
                "E" => (SpinTotal::HALF, GAMMA_E),
                _ => { return None; },
            };
        Some(Self { name: name.to_string(), spin, gamma })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commutator(a: &nd::Array2<C64>, b: &nd::Array2<C64>) -> nd::Array2<C64> {
        a.dot(b) - b.dot(a)
    }

    #[test]
    fn projections_ascend() {
        let m: Vec<i32>
            = SpinTotal::ONE.projections().map(|m| m.halves()).collect();
        assert_eq!(m, vec![-2, 0, 2]);
        assert_eq!(SpinTotal::ONE.projections().len(), 3);
        assert_eq!(SpinTotal::HALF.projection(1), Some(SpinProj::new(1)));
        assert_eq!(SpinTotal::HALF.projection(2), None);
    }

    #[test]
    fn operators_satisfy_commutation() {
        for j in [SpinTotal::HALF, SpinTotal::ONE, SpinTotal::new(3)] {
            let s = j.operators();
            let lhs = commutator(&s.x, &s.y);
            let rhs = s.z.mapv(|a| C64::i() * a);
            assert!((&lhs - &rhs).iter().all(|d| d.norm() < 1e-12));
            let casimir = s.x.dot(&s.x) + s.y.dot(&s.y) + s.z.dot(&s.z);
            let jj = j.f() * (j.f() + 1.0);
            for k in 0..j.dim() {
                assert!((casimir[[k, k]] - C64::from(jj)).norm() < 1e-12);
            }
        }
    }

    #[test]
    fn isotope_table() {
        let c13 = Isotope::lookup("13C").unwrap();
        assert_eq!(c13.spin, SpinTotal::HALF);
        assert!(Isotope::lookup("12C").is_none());
    }
}
