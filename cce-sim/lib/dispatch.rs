//! Delivery of each worker's share of the cluster space.
//!
//! The coordinator is the only rank that enumerates clusters. It sends every
//! other rank its per-order slice counts, then one slice per order carrying
//! both the clusters' global indices and their spins, and keeps its own slice
//! locally. Receivers check that what arrives is the contiguous block their
//! counts announced, and that every spin lies inside the announced bath.

use itertools::Itertools;
use crate::{
    cluster::{ ClusterIndex, ClusterPosition, ClusterSpace },
    error::{ CceError, CceResult },
    partition::Partition,
    transport::{ Communicator, COORDINATOR, Payload, PayloadKind, Rank },
};

/// A single cluster as held by a worker: its global position and its spins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssignedCluster {
    pub id: ClusterPosition,
    pub spins: ClusterIndex,
}

/// The clusters assigned to one rank, grouped by order index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkerClusters {
    clusters: Vec<Vec<AssignedCluster>>,
}

impl WorkerClusters {
    /// Take the slices assigned to `rank` directly from a cluster space.
    pub fn from_space(space: &ClusterSpace, partition: &Partition, rank: Rank)
        -> Self
    {
        let clusters
            = (0..space.max_order())
            .map(|order| {
                let slice = partition.slice(rank, order);
                space.clusters(order)[slice.range()].iter()
                    .zip(slice.range())
                    .map(|(c, index)| AssignedCluster {
                        id: ClusterPosition::new(order, index),
                        spins: c.clone(),
                    })
                    .collect()
            })
            .collect();
        Self { clusters }
    }

    /// Number of orders.
    pub fn max_order(&self) -> usize { self.clusters.len() }

    /// Assigned clusters at an order index.
    pub fn order(&self, order: usize) -> &[AssignedCluster] {
        self.clusters.get(order).map(|c| c.as_slice()).unwrap_or(&[])
    }

    /// Number of assigned clusters at each order index.
    pub fn counts(&self) -> Vec<usize> {
        self.clusters.iter().map(|c| c.len()).collect()
    }

    /// Total number of assigned clusters.
    pub fn total(&self) -> usize { self.clusters.iter().map(|c| c.len()).sum() }
}

/// Send every non-coordinator rank its slices and return the coordinator's own.
pub fn dispatch<C>(comm: &C, space: &ClusterSpace, partition: &Partition)
    -> CceResult<WorkerClusters>
where C: Communicator + ?Sized
{
    if partition.workers() != comm.size() {
        return Err(CceError::config(format!(
            "partition has {} workers but communicator has {} ranks",
            partition.workers(), comm.size(),
        )));
    }
    for dest in (0..comm.size()).filter(|r| *r != COORDINATOR) {
        let assigned = WorkerClusters::from_space(space, partition, dest);
        let counts = Payload::SliceCounts {
            counts: assigned.counts(),
            num_spins: space.num_spins(),
        };
        comm.send(dest, 0, counts)?;
        for (order, clst) in assigned.clusters.into_iter().enumerate() {
            let ids: Vec<usize> = clst.iter().map(|a| a.id.index).collect();
            let spins: Vec<usize>
                = clst.iter().flat_map(|a| a.spins.iter().copied()).collect();
            comm.send(dest, order, Payload::SliceData { ids, spins })?;
        }
        tracing::debug!(dest, counts = ?partition.worker_counts(dest), "dispatched slices");
    }
    Ok(WorkerClusters::from_space(space, partition, COORDINATOR))
}

/// Receive this rank's slices from the coordinator.
pub fn receive<C>(comm: &C) -> CceResult<WorkerClusters>
where C: Communicator + ?Sized
{
    let me = comm.rank();
    let bad = |reason: String| CceError::transport(COORDINATOR, me, reason);
    let (counts, num_spins)
        = match comm.recv(COORDINATOR, PayloadKind::SliceCounts, 0)?.payload {
            Payload::SliceCounts { counts, num_spins } => (counts, num_spins),
            other => return Err(bad(format!(
                "expected slice-counts payload, got {}", other.kind()))),
        };
    let mut clusters: Vec<Vec<AssignedCluster>> = Vec::with_capacity(counts.len());
    for (order, &count) in counts.iter().enumerate() {
        let env = comm.recv(COORDINATOR, PayloadKind::SliceData, order)?;
        let (ids, spins)
            = match env.payload {
                Payload::SliceData { ids, spins } => (ids, spins),
                other => return Err(bad(format!(
                    "expected slice-data payload, got {}", other.kind()))),
            };
        let size = order + 1;
        if ids.len() != count || spins.len() != count * size {
            return Err(bad(format!(
                "order {} slice carries {} ids and {} spin indices; expected {} and {}",
                order + 1, ids.len(), spins.len(), count, count * size,
            )));
        }
        if !ids.iter().tuple_windows().all(|(a, b)| *b == *a + 1) {
            return Err(bad(format!(
                "order {} slice ids are not a contiguous block", order + 1)));
        }
        if let Some(s) = spins.iter().find(|s| **s >= num_spins) {
            return Err(bad(format!(
                "order {} slice refers to spin {} in a bath of {}",
                order + 1, s, num_spins,
            )));
        }
        let assigned: Vec<AssignedCluster>
            = ids.iter()
            .zip(spins.chunks_exact(size))
            .map(|(&index, s)| AssignedCluster {
                id: ClusterPosition::new(order, index),
                spins: ClusterIndex::new(s.iter().copied()),
            })
            .collect();
        if let Some(a) = assigned.iter().find(|a| a.spins.len() != size) {
            return Err(bad(format!(
                "cluster {} has repeated spins {}", a.id, a.spins)));
        }
        clusters.push(assigned);
    }
    tracing::debug!(rank = me, ?counts, num_spins, "received slices");
    Ok(WorkerClusters { clusters })
}

/// Distribute the cluster space across all ranks.
///
/// The coordinator must pass `Some(space)`; every other rank passes `None` and
/// blocks until its slices arrive. Each rank returns only its own clusters.
pub fn distribute<C>(comm: &C, space: Option<&ClusterSpace>)
    -> CceResult<WorkerClusters>
where C: Communicator + ?Sized
{
    if comm.is_coordinator() {
        let space
            = space.ok_or_else(|| {
                CceError::config("coordinator requires the cluster space")
            })?;
        let partition = Partition::new(&space.counts(), comm.size())?;
        dispatch(comm, space, &partition)
    } else {
        receive(comm)
    }
}
