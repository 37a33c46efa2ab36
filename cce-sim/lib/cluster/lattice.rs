//! Lattice-aware uniform-bath sampling around root spins.

use std::collections::VecDeque;
use indexmap::IndexSet;
use crate::{
    bath::{ ConnectionGraph, FaceCenteredLattice2D, SpinCollection },
    cluster::{ ClusterGrouping, ClusterIndex, grow_clusters },
    error::{ CceError, CceResult },
};

/// For a translationally uniform bath, clusters need only be rooted at spins
/// near the origin. Growth is seeded by the spins whose lattice site lies
/// within `root_range` unit cells of the origin and extends by
/// `cutoff`-connected spins anywhere on the lattice.
///
/// The result is then closed under connected subsets: every connected subset
/// of a grown cluster is itself listed at its order, so order 1 holds every
/// spin appearing in any cluster, in bath order. Higher orders list grown
/// clusters first, followed by the added subsets.
///
/// Every spin in the bath must carry a lattice site.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct UniformBathOnLattice {
    /// Connection cutoff, in angstroms.
    pub cutoff: f64,
    /// Root region half-width, in unit cells.
    pub root_range: i64,
}

impl UniformBathOnLattice {
    pub fn new(cutoff: f64, root_range: i64) -> Self {
        Self { cutoff, root_range }
    }
}

// true if the spins of `cluster` form a single component of `graph`
fn is_connected(cluster: &[usize], graph: &ConnectionGraph) -> bool {
    let Some(&first) = cluster.first() else { return false; };
    let mut seen: Vec<bool> = vec![false; cluster.len()];
    seen[0] = true;
    let mut queue: VecDeque<usize> = VecDeque::from([first]);
    while let Some(a) = queue.pop_front() {
        for (j, &b) in cluster.iter().enumerate() {
            if !seen[j] && graph.connected(a, b) {
                seen[j] = true;
                queue.push_back(b);
            }
        }
    }
    seen.into_iter().all(|s| s)
}

/// Add every connected one-smaller subset of each cluster to the order below,
/// working downward so that added subsets are closed in turn.
fn close_under_subsets(grown: Vec<Vec<ClusterIndex>>, graph: &ConnectionGraph)
    -> Vec<Vec<ClusterIndex>>
{
    let mut levels: Vec<IndexSet<ClusterIndex>>
        = grown.into_iter().map(|clst| clst.into_iter().collect()).collect();
    for k in (1..levels.len()).rev() {
        let (lower, upper) = levels.split_at_mut(k);
        let below = &mut lower[k - 1];
        for cluster in upper[0].iter() {
            for &drop in cluster.iter() {
                let sub: Vec<usize>
                    = cluster.iter().copied().filter(|s| *s != drop).collect();
                if is_connected(&sub, graph) {
                    below.insert(ClusterIndex::new(sub));
                }
            }
        }
    }
    let mut clusters: Vec<Vec<ClusterIndex>>
        = levels.into_iter().map(|lvl| lvl.into_iter().collect()).collect();
    if let Some(singles) = clusters.first_mut() {
        singles.sort();
    }
    clusters
}

impl ClusterGrouping for UniformBathOnLattice {
    fn enumerate(&self, bath: &SpinCollection, max_order: usize)
        -> CceResult<Vec<Vec<ClusterIndex>>>
    {
        if self.cutoff <= 0.0 {
            return Err(CceError::config("cut_off_dist must be positive"));
        }
        if self.root_range < 0 {
            return Err(CceError::config("root_range must be non-negative"));
        }
        let mut roots: Vec<ClusterIndex> = Vec::new();
        for spin in bath.iter() {
            let site
                = spin.site.as_ref()
                .ok_or_else(|| CceError::config(format!(
                    "spin {} has no lattice site; uniform lattice sampling \
                    requires a lattice bath",
                    spin.id,
                )))?;
            if FaceCenteredLattice2D::is_root(site, self.root_range) {
                roots.push(ClusterIndex::new([spin.id]));
            }
        }
        tracing::debug!(
            num_roots = roots.len(),
            root_range = self.root_range,
            "selected lattice root spins",
        );
        let graph = bath.connection_graph(self.cutoff);
        let grown = grow_clusters(roots, max_order, |k| graph.neighbors(k));
        Ok(close_under_subsets(grown, &graph))
    }
}
