//! Per-cluster coherence evolution over a worker's slice.

use ndarray as nd;
use rayon::prelude::*;
use crate::{
    cluster::ClusterIndex,
    dispatch::AssignedCluster,
    error::{ CceError, CceResult },
};

/// A physical model producing the coherence time series of a single cluster.
///
/// Implementors must be deterministic in the cluster's spins so that results do
/// not depend on which rank evolves the cluster.
pub trait CoherenceModel: Sync {
    /// Number of time samples in every coherence series.
    fn n_time(&self) -> usize;

    /// Coherence of the central spin interacting with `cluster` alone.
    fn coherence(&self, cluster: &ClusterIndex) -> CceResult<nd::Array1<f64>>;
}

impl<M> CoherenceModel for &M
where M: CoherenceModel + ?Sized
{
    fn n_time(&self) -> usize { (**self).n_time() }

    fn coherence(&self, cluster: &ClusterIndex) -> CceResult<nd::Array1<f64>> {
        (**self).coherence(cluster)
    }
}

/// Drives a [`CoherenceModel`] over batches of clusters.
pub struct ClusterEvolutionRunner<'a, M: ?Sized> {
    model: &'a M,
}

impl<'a, M> ClusterEvolutionRunner<'a, M>
where M: CoherenceModel + ?Sized
{
    pub fn new(model: &'a M) -> Self { Self { model } }

    pub fn n_time(&self) -> usize { self.model.n_time() }

    /// Evolve a single cluster, checking that the model returns a full series.
    pub fn evolve(&self, cluster: &ClusterIndex, order: usize)
        -> CceResult<nd::Array1<f64>>
    {
        let n_time = self.model.n_time();
        let col
            = self.model.coherence(cluster)
            .map_err(|err| match err {
                CceError::Evolution { .. } => err,
                other => CceError::Evolution {
                    order: order + 1,
                    spins: cluster.to_vec(),
                    reason: other.to_string(),
                },
            })?;
        if col.len() != n_time {
            return Err(CceError::Evolution {
                order: order + 1,
                spins: cluster.to_vec(),
                reason: format!(
                    "model returned {} time samples; expected {}", col.len(), n_time),
            });
        }
        Ok(col)
    }

    /// Evolve every cluster of a slice in parallel, returning an
    /// `n_time × clusters.len()` matrix with columns in slice order.
    pub fn evolve_slice(&self, order: usize, clusters: &[AssignedCluster])
        -> CceResult<nd::Array2<f64>>
    {
        let n_time = self.model.n_time();
        let cols: Vec<nd::Array1<f64>>
            = clusters.par_iter()
            .map(|a| {
                let col = self.evolve(&a.spins, order)?;
                tracing::trace!(cluster = %a.id, spins = %a.spins, "evolved");
                Ok(col)
            })
            .collect::<CceResult<_>>()?;
        let mut data: nd::Array2<f64> = nd::Array2::zeros((n_time, clusters.len()));
        data.axis_iter_mut(nd::Axis(1))
            .zip(cols.iter())
            .for_each(|(mut dst, src)| dst.assign(src));
        Ok(data)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cluster::ClusterPosition;

    /// Deterministic synthetic model: the coherence of a cluster at time step
    /// `t` is `1 / (1 + (t + 1) * sum(spins + 1) / 100)`.
    #[derive(Copy, Clone, Debug)]
    pub(crate) struct Synthetic(pub usize);

    impl CoherenceModel for Synthetic {
        fn n_time(&self) -> usize { self.0 }

        fn coherence(&self, cluster: &ClusterIndex) -> CceResult<nd::Array1<f64>> {
            let w: f64 = cluster.iter().map(|s| (*s + 1) as f64).sum();
            Ok(nd::Array1::from_iter(
                (0..self.0).map(|t| 1.0 / (1.0 + (t + 1) as f64 * w / 100.0))
            ))
        }
    }

    struct Truncated;

    impl CoherenceModel for Truncated {
        fn n_time(&self) -> usize { 4 }

        fn coherence(&self, _: &ClusterIndex) -> CceResult<nd::Array1<f64>> {
            Ok(nd::Array1::ones(3))
        }
    }

    fn assigned(order: usize, list: &[&[usize]]) -> Vec<AssignedCluster> {
        list.iter().enumerate()
            .map(|(index, s)| AssignedCluster {
                id: ClusterPosition::new(order, index),
                spins: ClusterIndex::new(s.iter().copied()),
            })
            .collect()
    }

    #[test]
    fn slice_columns_in_order() {
        let model = Synthetic(5);
        let runner = ClusterEvolutionRunner::new(&model);
        let clusters = assigned(1, &[&[0, 1], &[2, 3], &[1, 4]]);
        let data = runner.evolve_slice(1, &clusters).unwrap();
        assert_eq!(data.dim(), (5, 3));
        for (k, a) in clusters.iter().enumerate() {
            assert_eq!(data.column(k), model.coherence(&a.spins).unwrap());
        }
    }

    #[test]
    fn empty_slice() {
        let runner = ClusterEvolutionRunner::new(&Synthetic(3));
        assert_eq!(runner.evolve_slice(0, &[]).unwrap().dim(), (3, 0));
    }

    #[test]
    fn short_series_is_an_evolution_error() {
        let runner = ClusterEvolutionRunner::new(&Truncated);
        match runner.evolve_slice(0, &assigned(0, &[&[7]])) {
            Err(CceError::Evolution { order, spins, .. }) => {
                assert_eq!(order, 1);
                assert_eq!(spins, vec![7]);
            },
            other => panic!("unexpected {:?}", other),
        }
    }
}
