//! Hamiltonian of a bath cluster conditioned on the central-spin state.

use ndarray::{ self as nd, linalg::kron };
use num_complex::Complex64 as C64;
use crate::{
    bath::SpinCollection,
    cluster::ClusterIndex,
    error::{ CceError, CceResult },
    physics::{ CenterSpin, dipolar_tensor },
    spin::SpinOperators,
};

/// Embed a single-spin operator acting on the `k`-th factor of a tensor product
/// with factor dimensions `dims`.
pub(crate) fn embed(dims: &[usize], k: usize, op: &nd::Array2<C64>) -> nd::Array2<C64> {
    let eyesize1: usize = dims[..k].iter().product();
    let eyesize2: usize = dims[k + 1..].iter().product();
    kron(&kron(&nd::Array2::eye(eyesize1), op), &nd::Array2::eye(eyesize2))
}

/// Embed `a ⊗ b` acting on factors `i < j`.
pub(crate) fn embed_pair(
    dims: &[usize],
    i: usize,
    a: &nd::Array2<C64>,
    j: usize,
    b: &nd::Array2<C64>,
) -> nd::Array2<C64>
{
    let eyesize1: usize = dims[..i].iter().product();
    let eyesize2: usize = dims[i + 1..j].iter().product();
    let eyesize3: usize = dims[j + 1..].iter().product();
    let left = kron(&kron(&nd::Array2::eye(eyesize1), a), &nd::Array2::eye(eyesize2));
    kron(&kron(&left, b), &nd::Array2::eye(eyesize3))
}

/// Tensor product of single-factor arrays, first factor outermost.
pub(crate) fn kron_all<'a, I>(factors: I) -> nd::Array2<C64>
where I: IntoIterator<Item = &'a nd::Array2<C64>>
{
    factors.into_iter()
        .fold(nd::Array2::ones((1, 1)), |acc, f| kron(&acc, f))
}

/// Static field on each bath spin due to the frozen states of every other
/// bath spin, for a single sampled bath configuration.
///
/// Each spin `k` is taken to sit in a projection eigenstate `m_k` along the
/// *z*-axis, contributing a field `T_ik ẑ m_k` on spin `i`.
#[derive(Clone, Debug, PartialEq)]
pub struct MeanField {
    projections: Vec<f64>,
    fields: Vec<[f64; 3]>,
}

impl MeanField {
    /// Sum the field on each spin from all other spins.
    ///
    /// *Panics* if `projections` and `bath` differ in length.
    pub fn new(bath: &SpinCollection, projections: Vec<f64>) -> Self {
        assert_eq!(bath.len(), projections.len(), "MeanField::new: length mismatch");
        let mut fields: Vec<[f64; 3]> = vec![[0.0; 3]; bath.len()];
        for (i, si) in bath.iter().enumerate() {
            for (k, sk) in bath.iter().enumerate().skip(i + 1) {
                let t = dipolar_tensor(
                    si.isotope.gamma, sk.isotope.gamma, &si.coord, &sk.coord);
                for a in 0..3 {
                    fields[i][a] += t[a][2] * projections[k];
                    fields[k][a] += t[a][2] * projections[i];
                }
            }
        }
        Self { projections, fields }
    }

    /// Sampled *z*-projection of each bath spin.
    pub fn projections(&self) -> &[f64] { &self.projections }

    /// Field on spin `i` due to every bath spin outside `cluster`.
    pub fn field_excluding(&self, bath: &SpinCollection, i: usize, cluster: &ClusterIndex)
        -> [f64; 3]
    {
        let mut field = self.fields[i];
        for &k in cluster.iter().filter(|k| **k != i) {
            let t = dipolar_tensor(
                bath[i].isotope.gamma, bath[k].isotope.gamma,
                &bath[i].coord, &bath[k].coord,
            );
            for (a, fa) in field.iter_mut().enumerate() {
                *fa -= t[a][2] * self.projections[k];
            }
        }
        field
    }
}

/// Builds the Hamiltonian of a cluster of bath spins for a fixed central-spin
/// projection `m`:
/// ```math
/// H_m = \sum_{i < j} \mathbf{I}_i^T T_{ij} \mathbf{I}_j
///     + \sum_i \left(
///         -\gamma_i \mathbf{B}
///         + m\, T_{ci}^T \hat{z}
///         + \mathbf{b}_i
///     \right) \cdot \mathbf{I}_i
/// ```
/// where `T` is the dipolar tensor, `T_ci` couples the central spin to bath
/// spin `i`, and `b_i` is the optional mean field of the rest of the bath.
///
/// The basis is the tensor product of each spin's projection basis in ascending
/// order, with cluster spins in ascending index order.
#[derive(Clone, Debug)]
pub struct HBuilderCluster<'a> {
    bath: &'a SpinCollection,
    center: &'a CenterSpin,
    magnetic_field: [f64; 3],
    mean_field: Option<&'a MeanField>,
}

impl<'a> HBuilderCluster<'a> {
    pub fn new(
        bath: &'a SpinCollection,
        center: &'a CenterSpin,
        magnetic_field: [f64; 3],
    ) -> Self
    {
        Self { bath, center, magnetic_field, mean_field: None }
    }

    /// Include the static field of all bath spins outside the cluster.
    pub fn with_mean_field(mut self, mean_field: &'a MeanField) -> Self {
        self.mean_field = Some(mean_field);
        self
    }

    /// Hilbert space factor dimensions for a cluster.
    pub fn dims(&self, cluster: &ClusterIndex) -> Vec<usize> {
        cluster.iter().map(|k| self.bath[*k].isotope.spin.dim()).collect()
    }

    /// Total field acting on a single bath spin, excluding intra-cluster
    /// couplings.
    pub fn local_field(&self, cluster: &ClusterIndex, k: usize, m: f64) -> [f64; 3] {
        let spin = &self.bath[k];
        let t_c = dipolar_tensor(
            self.center.gamma, spin.isotope.gamma, &self.center.coord, &spin.coord);
        let b_mf
            = self.mean_field
            .map(|mf| mf.field_excluding(self.bath, k, cluster))
            .unwrap_or([0.0; 3]);
        let mut field = [0.0; 3];
        for (a, fa) in field.iter_mut().enumerate() {
            *fa = -spin.isotope.gamma * self.magnetic_field[a]
                + m * t_c[2][a]
                + b_mf[a];
        }
        field
    }

    /// Build the cluster Hamiltonian for central-spin projection `m`.
    pub fn build(&self, cluster: &ClusterIndex, m: f64) -> nd::Array2<C64> {
        let dims = self.dims(cluster);
        let size: usize = dims.iter().product();
        let ops: Vec<SpinOperators>
            = cluster.iter()
            .map(|k| self.bath[*k].isotope.spin.operators())
            .collect();
        let mut H: nd::Array2<C64> = nd::Array2::zeros((size, size));
        for (i, &k) in cluster.iter().enumerate() {
            let h_i = ops[i].dot(&self.local_field(cluster, k, m));
            H += &embed(&dims, i, &h_i);
        }
        for (i, &ki) in cluster.iter().enumerate() {
            for (j, &kj) in cluster.iter().enumerate().skip(i + 1) {
                let si = &self.bath[ki];
                let sj = &self.bath[kj];
                let t = dipolar_tensor(
                    si.isotope.gamma, sj.isotope.gamma, &si.coord, &sj.coord);
                for (a, op_a) in ops[i].xyz().into_iter().enumerate() {
                    let coupled = ops[j].dot(&t[a]);
                    H += &embed_pair(&dims, i, op_a, j, &coupled);
                }
            }
        }
        H
    }

    /// Build the Hamiltonians of both central-spin branches.
    pub fn build_branches(&self, cluster: &ClusterIndex)
        -> CceResult<[nd::Array2<C64>; 2]>
    {
        if let Some(k) = cluster.iter().find(|k| **k >= self.bath.len()) {
            return Err(CceError::Evolution {
                order: cluster.len(),
                spins: cluster.to_vec(),
                reason: format!("spin {} outside a bath of {} spins", k, self.bath.len()),
            });
        }
        let [m0, m1] = self.center.projections()?;
        Ok([self.build(cluster, m0), self.build(cluster, m1)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ bath::SpinList, spin::{ Isotope, SpinTotal } };

    fn bath(coords: &[[f64; 3]]) -> SpinCollection {
        let c13 = Isotope::lookup("13C").unwrap();
        SpinList::uniform(&c13, coords.iter().copied()).0.into_iter().collect()
    }

    fn hermitian(h: &nd::Array2<C64>) -> bool {
        let ht = h.t().mapv(|x| x.conj());
        (h - &ht).iter().all(|x| x.norm() < 1e-12)
    }

    #[test]
    fn embedding_dimensions() {
        let ops = SpinTotal::ONE.operators();
        let e = embed(&[2, 3, 2], 1, &ops.z);
        assert_eq!(e.dim(), (12, 12));
        let p = embed_pair(&[2, 3, 2], 0, &SpinTotal::HALF.operators().z, 2, &nd::Array2::eye(2));
        assert_eq!(p.dim(), (12, 12));
        assert_eq!(kron_all([&nd::Array2::eye(2), &nd::Array2::eye(3)]).dim(), (6, 6));
    }

    #[test]
    fn cluster_hamiltonian_hermitian() {
        let bath = bath(&[[3.0, 0.0, 1.0], [4.0, 1.5, 0.0], [2.0, -1.0, 2.5]]);
        let center = CenterSpin::spin_one("NV", [0.0; 3]);
        let hb = HBuilderCluster::new(&bath, &center, [0.0, 0.0, 100.0]);
        let cluster = ClusterIndex::new([0, 1, 2]);
        let [h0, h1] = hb.build_branches(&cluster).unwrap();
        assert_eq!(h0.dim(), (8, 8));
        assert!(hermitian(&h0) && hermitian(&h1));
        assert!((&h1 - &h0).iter().any(|x| x.norm() > 1e-6));
    }

    #[test]
    fn spin_outside_bath_rejected() {
        let bath = bath(&[[3.0, 0.0, 1.0], [4.0, 1.5, 0.0]]);
        let center = CenterSpin::spin_one("NV", [0.0; 3]);
        let hb = HBuilderCluster::new(&bath, &center, [0.0, 0.0, 100.0]);
        let res = hb.build_branches(&ClusterIndex::new([1, 2]));
        assert!(matches!(
            res,
            Err(CceError::Evolution { order: 2, ref spins, .. }) if spins == &vec![1, 2]
        ));
    }

    #[test]
    fn single_spin_zeeman() {
        let bath = bath(&[[10.0, 0.0, 0.0]]);
        // zero-projection branch: no hyperfine field
        let center = CenterSpin::spin_one("NV", [0.0; 3]);
        let hb = HBuilderCluster::new(&bath, &center, [0.0, 0.0, 50.0]);
        let h = hb.build(&ClusterIndex::new([0]), 0.0);
        let g = bath[0].isotope.gamma;
        assert!((h[[0, 0]].re - g * 50.0 / 2.0).abs() < 1e-12);
        assert!((h[[1, 1]].re + g * 50.0 / 2.0).abs() < 1e-12);
    }

    #[test]
    fn mean_field_excludes_cluster_members() {
        let bath = bath(&[[0.0; 3], [3.0, 0.0, 0.0], [0.0, 4.0, 1.0]]);
        let mf = MeanField::new(&bath, vec![0.5, -0.5, 0.5]);
        let alone = ClusterIndex::new([0]);
        let with_1 = ClusterIndex::new([0, 1]);
        let everything = ClusterIndex::new([0, 1, 2]);
        let f_all = mf.field_excluding(&bath, 0, &everything);
        assert!(f_all.iter().all(|x| x.abs() < 1e-12));
        let f0 = mf.field_excluding(&bath, 0, &alone);
        let f01 = mf.field_excluding(&bath, 0, &with_1);
        let t = dipolar_tensor(
            bath[0].isotope.gamma, bath[1].isotope.gamma, &bath[0].coord, &bath[1].coord);
        for a in 0..3 {
            assert!((f0[a] - f01[a] - t[a][2] * -0.5).abs() < 1e-12);
        }
    }
}
