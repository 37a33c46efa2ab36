//! Cutoff-distance depth-first path tracing.

use crate::{
    bath::SpinCollection,
    cluster::{ ClusterGrouping, ClusterIndex, grow_clusters },
    error::{ CceError, CceResult },
};

/// Groups every connected set of up to `max_order` spins, where two spins are
/// connected if they lie within `cutoff` of each other.
///
/// Order-1 clusters are the single spins in bath order.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DepthFirstPathTracing {
    /// Connection cutoff, in angstroms.
    pub cutoff: f64,
}

impl DepthFirstPathTracing {
    pub fn new(cutoff: f64) -> Self { Self { cutoff } }
}

impl ClusterGrouping for DepthFirstPathTracing {
    fn enumerate(&self, bath: &SpinCollection, max_order: usize)
        -> CceResult<Vec<Vec<ClusterIndex>>>
    {
        if self.cutoff <= 0.0 {
            return Err(CceError::config("cut_off_dist must be positive"));
        }
        let graph = bath.connection_graph(self.cutoff);
        tracing::debug!(
            cutoff = self.cutoff,
            edges = graph.num_edges(),
            "tracing connected clusters",
        );
        let singles: Vec<ClusterIndex>
            = (0..bath.len()).map(|k| ClusterIndex::new([k])).collect();
        Ok(grow_clusters(singles, max_order, |k| graph.neighbors(k)))
    }
}
