//! Per-rank driver and in-process multi-worker launcher.
//!
//! Every rank runs the same loop: receive its clusters, then for each order
//! evolve its slice and hand the block to the coordinator. The coordinator
//! additionally enumerates, partitions, gathers, and reduces, so each order's
//! gather acts as a barrier before that order's reduction.

use ndarray as nd;
use crate::{
    cluster::ClusterSpace,
    dispatch::distribute,
    error::{ CceError, CceResult, NumericInstability },
    gather::{ SliceResult, gather },
    partition::Partition,
    reduce::{ CoherenceReducer, FinalCoherence },
    runner::{ ClusterEvolutionRunner, CoherenceModel },
    transport::{ ChannelComm, Communicator },
};

/// Everything produced by a completed run, held by the coordinator.
#[derive(Clone, Debug, PartialEq)]
pub struct CceOutput {
    /// Sample times.
    pub time: nd::Array1<f64>,
    /// Cluster count at each order.
    pub counts: Vec<usize>,
    /// Raw `n_time × count` coherence of each order.
    pub raw: Vec<nd::Array2<f64>>,
    /// Tilde values, shaped like `raw`.
    pub tilde: Vec<nd::Array2<f64>>,
    pub coherence: FinalCoherence,
    /// Clusters excluded from the final coherence.
    pub instabilities: Vec<NumericInstability>,
}

impl CceOutput {
    pub fn max_order(&self) -> usize { self.counts.len() }
}

fn run_rank_inner<C, M>(
    comm: &C,
    space: Option<&ClusterSpace>,
    model: &M,
    time: &nd::Array1<f64>,
    tolerance: f64,
) -> CceResult<Option<CceOutput>>
where
    C: Communicator + ?Sized,
    M: CoherenceModel + ?Sized,
{
    let n_time = model.n_time();
    if time.len() != n_time {
        return Err(CceError::config(format!(
            "{} sample times given for a model with {}", time.len(), n_time)));
    }
    let partition: Option<Partition>
        = match space {
            Some(sp) if comm.is_coordinator() => {
                Some(Partition::new(&sp.counts(), comm.size())?)
            },
            _ => None,
        };
    let assigned = distribute(comm, space)?;
    tracing::info!(
        rank = comm.rank(),
        clusters = assigned.total(),
        counts = ?assigned.counts(),
        "received work",
    );

    let runner = ClusterEvolutionRunner::new(model);
    let mut reducer
        = match (space, &partition) {
            (Some(sp), Some(_)) => {
                Some(CoherenceReducer::with_tolerance(sp, n_time, tolerance))
            },
            _ => None,
        };
    let mut raw: Vec<nd::Array2<f64>> = Vec::with_capacity(assigned.max_order());
    for order in 0..assigned.max_order() {
        let clusters = assigned.order(order);
        let data = runner.evolve_slice(order, clusters)?;
        tracing::info!(
            rank = comm.rank(),
            order = order + 1,
            clusters = clusters.len(),
            "evolved slice",
        );
        let local = SliceResult::new(order, clusters, data);
        if let Some(full) = gather(comm, partition.as_ref(), n_time, local)? {
            if let Some(reducer) = reducer.as_mut() {
                reducer.reduce_order(order, &full)?;
            }
            raw.push(full);
        }
    }

    match (space, reducer) {
        (Some(sp), Some(reducer)) => {
            let reduced = reducer.finalize()?;
            tracing::info!(
                instabilities = reduced.instabilities.len(),
                "finished coherence reduction",
            );
            Ok(Some(CceOutput {
                time: time.clone(),
                counts: sp.counts(),
                raw,
                tilde: reduced.tilde,
                coherence: reduced.coherence,
                instabilities: reduced.instabilities,
            }))
        },
        _ => Ok(None),
    }
}

/// Run one rank of a CCE calculation.
///
/// The coordinator passes `Some(space)` and receives `Some(output)`; every
/// other rank passes `None` and receives `None`. On failure the rank notifies
/// all peers before returning the error, so that no rank blocks forever.
pub fn run_rank<C, M>(
    comm: &C,
    space: Option<&ClusterSpace>,
    model: &M,
    time: &nd::Array1<f64>,
    tolerance: f64,
) -> CceResult<Option<CceOutput>>
where
    C: Communicator + ?Sized,
    M: CoherenceModel + ?Sized,
{
    let result = run_rank_inner(comm, space, model, time, tolerance);
    if let Err(err) = &result {
        tracing::error!(rank = comm.rank(), "{}", err);
        comm.abort(&err.to_string());
    }
    result
}

/// Run a full calculation with `workers` ranks on scoped threads, connected by
/// in-process channels.
///
/// If several ranks fail, the error of a rank that failed on its own is
/// returned in preference to those of ranks that were aborted by a peer.
pub fn run_threads<M>(
    space: &ClusterSpace,
    model: &M,
    time: &nd::Array1<f64>,
    workers: usize,
    tolerance: f64,
) -> CceResult<CceOutput>
where M: CoherenceModel + ?Sized
{
    if workers == 0 {
        return Err(CceError::config("worker count must be positive"));
    }
    let world = ChannelComm::world(workers);
    let results: Vec<CceResult<Option<CceOutput>>>
        = std::thread::scope(|s| {
            let handles: Vec<_>
                = world.into_iter()
                .map(|comm| {
                    s.spawn(move || {
                        let sp = comm.is_coordinator().then_some(space);
                        run_rank(&comm, sp, model, time, tolerance)
                    })
                })
                .collect();
            handles.into_iter().enumerate()
                .map(|(rank, h)| {
                    h.join().unwrap_or_else(|_| {
                        Err(CceError::transport(rank, rank, "worker thread panicked"))
                    })
                })
                .collect()
        });
    let mut output: Option<CceOutput> = None;
    let mut errors: Vec<CceError> = Vec::new();
    for res in results {
        match res {
            Ok(Some(out)) => { output = Some(out); },
            Ok(None) => { },
            Err(err) => { errors.push(err); },
        }
    }
    if !errors.is_empty() {
        let k = errors.iter()
            .position(|e| !matches!(e, CceError::Transport { .. }))
            .unwrap_or(0);
        return Err(errors.swap_remove(k));
    }
    output.ok_or_else(|| CceError::config("coordinator produced no output"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cluster::{ ClusterIndex, DepthFirstPathTracing, tests::line_bath },
        runner::tests::Synthetic,
    };

    struct Failing;

    impl CoherenceModel for Failing {
        fn n_time(&self) -> usize { 2 }

        fn coherence(&self, cluster: &ClusterIndex) -> CceResult<nd::Array1<f64>> {
            if cluster.contains(&3) {
                Err(CceError::Evolution {
                    order: cluster.len(),
                    spins: cluster.to_vec(),
                    reason: "kernel failure".to_string(),
                })
            } else {
                Ok(nd::Array1::ones(2))
            }
        }
    }

    fn space() -> ClusterSpace {
        let bath = line_bath(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.5]);
        ClusterSpace::build(&DepthFirstPathTracing::new(1.1), &bath, 3).unwrap()
    }

    #[test]
    fn worker_count_does_not_change_results() {
        let space = space();
        let model = Synthetic(4);
        let time = nd::Array1::linspace(0.0, 1.0, 4);
        let single = run_threads(&space, &model, &time, 1, 1e-12).unwrap();
        for workers in [2, 3, 5, 8] {
            let multi = run_threads(&space, &model, &time, workers, 1e-12).unwrap();
            assert_eq!(multi, single);
        }
        assert_eq!(single.counts, vec![7, 5, 4]);
        assert_eq!(single.coherence.cumulative.dim(), (4, 3));
    }

    #[test]
    fn worker_failure_aborts_run() {
        let space = space();
        let time = nd::Array1::linspace(0.0, 1.0, 2);
        match run_threads(&space, &Failing, &time, 3, 1e-12) {
            Err(CceError::Evolution { reason, .. }) => {
                assert_eq!(reason, "kernel failure");
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn time_length_mismatch_rejected() {
        let space = space();
        let time = nd::Array1::linspace(0.0, 1.0, 3);
        assert!(matches!(
            run_threads(&space, &Synthetic(4), &time, 2, 1e-12),
            Err(CceError::Config(_)),
        ));
    }
}
