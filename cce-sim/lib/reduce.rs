//! Hierarchical coherence reduction.
//!
//! The tilde value of a cluster is its raw coherence divided by the tilde
//! values of every one of its sub-clusters at all lower orders. Orders are
//! reduced strictly in sequence; the final coherence is the product of every
//! order's tilde columns, accumulated across orders.

use ndarray as nd;
use rustc_hash::FxHashMap as HashMap;
use crate::{
    cluster::{ ClusterPosition, ClusterSpace },
    error::{ CceError, CceResult, NumericInstability },
};

/// Default magnitude at or below which a divisor is treated as zero.
pub const DEFAULT_TOLERANCE: f64 = 1e-12;

/// Per-order and cumulative coherence, both `n_time × max_order`.
#[derive(Clone, Debug, PartialEq)]
pub struct FinalCoherence {
    /// Column `k` is the product of every order-`k` tilde column.
    pub each_order: nd::Array2<f64>,
    /// Column `k` is the product of columns `0..=k` of `each_order`.
    pub cumulative: nd::Array2<f64>,
}

impl FinalCoherence {
    /// The coherence curve including every order.
    pub fn result(&self) -> nd::ArrayView1<'_, f64> {
        self.cumulative.column(self.cumulative.ncols() - 1)
    }
}

/// Everything produced by a completed reduction.
#[derive(Clone, Debug, PartialEq)]
pub struct ReducedCoherence {
    /// Tilde matrix of each order, shaped like the matching raw matrix.
    pub tilde: Vec<nd::Array2<f64>>,
    pub coherence: FinalCoherence,
    /// Clusters whose tilde column was replaced by the neutral value.
    pub instabilities: Vec<NumericInstability>,
}

/// Coordinator-side accumulator of tilde values.
#[derive(Clone, Debug)]
pub struct CoherenceReducer<'a> {
    space: &'a ClusterSpace,
    n_time: usize,
    tolerance: f64,
    values: HashMap<ClusterPosition, nd::Array1<f64>>,
    tilde: Vec<nd::Array2<f64>>,
    instabilities: Vec<NumericInstability>,
}

impl<'a> CoherenceReducer<'a> {
    pub fn new(space: &'a ClusterSpace, n_time: usize) -> Self {
        Self::with_tolerance(space, n_time, DEFAULT_TOLERANCE)
    }

    /// Use a custom divisor tolerance. Negative or NaN values are taken as
    /// zero, which still flags exact zeros and non-finite divisors.
    pub fn with_tolerance(space: &'a ClusterSpace, n_time: usize, tolerance: f64)
        -> Self
    {
        Self {
            space,
            n_time,
            tolerance: tolerance.max(0.0),
            values: HashMap::default(),
            tilde: Vec::with_capacity(space.max_order()),
            instabilities: Vec::new(),
        }
    }

    /// Number of orders reduced so far.
    pub fn reduced(&self) -> usize { self.tilde.len() }

    /// Tilde value of a single, already reduced cluster.
    pub fn tilde_value(&self, pos: ClusterPosition) -> Option<&nd::Array1<f64>> {
        self.values.get(&pos)
    }

    /// Instabilities recorded so far.
    pub fn instabilities(&self) -> &[NumericInstability] { &self.instabilities }

    /// Reduce the raw results of the next order, returning its tilde matrix.
    ///
    /// Fails with [`CceError::ReductionOrder`] if `order` is not the next
    /// unreduced order, and with [`CceError::Config`] if `raw` is not
    /// `n_time × count`. A sub-cluster divisor at or below tolerance, or one
    /// that is not finite, does not fail; the cluster's tilde column is set to
    /// ones and the event is recorded.
    pub fn reduce_order(&mut self, order: usize, raw: &nd::Array2<f64>)
        -> CceResult<&nd::Array2<f64>>
    {
        if order != self.reduced() || order >= self.space.max_order() {
            return Err(CceError::ReductionOrder {
                expected: self.reduced() + 1,
                got: order + 1,
            });
        }
        let count = self.space.clusters(order).len();
        if raw.dim() != (self.n_time, count) {
            return Err(CceError::config(format!(
                "order {} raw results have shape {:?}; expected {:?}",
                order + 1, raw.dim(), (self.n_time, count),
            )));
        }
        let mut tilde = raw.clone();
        for (index, mut col) in tilde.axis_iter_mut(nd::Axis(1)).enumerate() {
            let pos = ClusterPosition::new(order, index);
            let subs
                = self.space.sub_clusters(pos)
                .map(|s| s.iter())
                .into_iter()
                .flatten();
            for sub in subs {
                let denom
                    = self.values.get(sub)
                    .ok_or(CceError::ReductionOrder {
                        expected: sub.order + 1,
                        got: order + 1,
                    })?;
                let small
                    = denom.iter().enumerate()
                    .find(|(_, x)| x.abs() <= self.tolerance || !x.is_finite());
                if let Some((time_index, value)) = small {
                    let spins
                        = self.space.get(pos)
                        .map(|c| c.to_vec())
                        .unwrap_or_default();
                    let record = NumericInstability {
                        order,
                        index,
                        spins,
                        sub_order: sub.order,
                        sub_index: sub.index,
                        time_index,
                        value: *value,
                    };
                    tracing::warn!("{}", record);
                    self.instabilities.push(record);
                    col.fill(1.0);
                    break;
                }
                col.zip_mut_with(denom, |x, d| *x /= *d);
            }
            self.values.insert(pos, col.to_owned());
        }
        tracing::debug!(order = order + 1, clusters = count, "reduced order");
        self.tilde.push(tilde);
        Ok(&self.tilde[order])
    }

    /// Form the per-order and cumulative products once every order has been
    /// reduced.
    pub fn finalize(self) -> CceResult<ReducedCoherence> {
        let max_order = self.space.max_order();
        if self.reduced() != max_order {
            return Err(CceError::ReductionOrder {
                expected: self.reduced() + 1,
                got: max_order + 1,
            });
        }
        let mut each_order: nd::Array2<f64> = nd::Array2::ones((self.n_time, max_order));
        for (mut col, tilde) in each_order.axis_iter_mut(nd::Axis(1)).zip(&self.tilde) {
            for t in tilde.axis_iter(nd::Axis(1)) {
                col *= &t;
            }
        }
        let mut cumulative = each_order.clone();
        for k in 1..max_order {
            let (prev, mut rest)
                = cumulative.multi_slice_mut((nd::s![.., k - 1], nd::s![.., k]));
            rest *= &prev;
        }
        if !self.instabilities.is_empty() {
            tracing::warn!(
                count = self.instabilities.len(),
                "clusters excluded from the final coherence by near-singular division",
            );
        }
        Ok(ReducedCoherence {
            tilde: self.tilde,
            coherence: FinalCoherence { each_order, cumulative },
            instabilities: self.instabilities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ DepthFirstPathTracing, tests::line_bath };

    fn pair_space() -> ClusterSpace {
        let bath = line_bath(&[0.0, 1.0]);
        ClusterSpace::build(&DepthFirstPathTracing::new(1.5), &bath, 2).unwrap()
    }

    #[test]
    fn two_spin_reduction() {
        let space = pair_space();
        let v = nd::array![[0.9], [0.5], [0.25]];
        let order1 = nd::array![[1.0, 1.0], [1.0, 1.0], [1.0, 1.0]];
        let mut reducer = CoherenceReducer::new(&space, 3);
        reducer.reduce_order(0, &order1).unwrap();
        let t2 = reducer.reduce_order(1, &v).unwrap().clone();
        assert_eq!(t2, v);
        let res = reducer.finalize().unwrap();
        assert!(res.instabilities.is_empty());
        let c = &res.coherence.cumulative;
        assert_eq!(c.dim(), (3, 2));
        assert_eq!(c.column(1), &c.column(0) * &t2.column(0));
    }

    #[test]
    fn divides_by_every_sub_cluster() {
        let space = pair_space();
        let order1 = nd::array![[0.5, 0.8], [0.25, 0.4]];
        let raw2 = nd::array![[0.2], [0.05]];
        let mut reducer = CoherenceReducer::new(&space, 2);
        reducer.reduce_order(0, &order1).unwrap();
        let t2 = reducer.reduce_order(1, &raw2).unwrap();
        let expected = nd::array![[0.2 / 0.5 / 0.8], [0.05 / 0.25 / 0.4]];
        assert!((t2 - &expected).iter().all(|x| x.abs() < 1e-15));
        let res = reducer.finalize().unwrap();
        let expected_each
            = nd::array![[0.4, 0.2 / 0.4], [0.1, 0.05 / 0.1]];
        assert!((&res.coherence.each_order - &expected_each).iter().all(|x| x.abs() < 1e-15));
        assert!((res.coherence.result().to_owned() - nd::array![0.2, 0.05])
            .iter().all(|x| x.abs() < 1e-15));
    }

    #[test]
    fn near_zero_divisor_isolated() {
        // 0-1-2 chain with pairs (0 1), (1 2)
        let bath = line_bath(&[0.0, 1.0, 2.0]);
        let space
            = ClusterSpace::build(&DepthFirstPathTracing::new(1.1), &bath, 2).unwrap();
        let order1 = nd::array![[1.0, 0.5, 0.0], [1.0, 0.5, 0.5]];
        let raw2 = nd::array![[0.25, 0.1], [0.25, 0.1]];
        let mut reducer = CoherenceReducer::new(&space, 2);
        reducer.reduce_order(0, &order1).unwrap();
        let t2 = reducer.reduce_order(1, &raw2).unwrap();
        assert_eq!(t2.column(0), nd::array![0.5, 0.5]);
        assert_eq!(t2.column(1), nd::array![1.0, 1.0]);
        assert!(t2.iter().all(|x| x.is_finite()));
        let res = reducer.finalize().unwrap();
        assert_eq!(res.instabilities.len(), 1);
        let rec = &res.instabilities[0];
        assert_eq!((rec.order, rec.index), (1, 1));
        assert_eq!(rec.spins, vec![1, 2]);
        assert_eq!((rec.sub_order, rec.sub_index, rec.time_index), (0, 2, 0));
        assert!(res.coherence.cumulative.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn exact_zero_flagged_without_tolerance() {
        let space = pair_space();
        let order1 = nd::array![[0.0, 1.0], [1.0, 1.0]];
        let raw2 = nd::array![[0.5], [0.5]];
        let mut reducer = CoherenceReducer::with_tolerance(&space, 2, 0.0);
        reducer.reduce_order(0, &order1).unwrap();
        let t2 = reducer.reduce_order(1, &raw2).unwrap();
        assert_eq!(t2.column(0), nd::array![1.0, 1.0]);
        let res = reducer.finalize().unwrap();
        assert_eq!(res.instabilities.len(), 1);
        assert_eq!(res.instabilities[0].value, 0.0);
        assert!(res.coherence.cumulative.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn non_finite_divisor_flagged() {
        let space = pair_space();
        let order1 = nd::array![[1.0, f64::NAN]];
        let mut reducer = CoherenceReducer::with_tolerance(&space, 1, -1.0);
        reducer.reduce_order(0, &order1).unwrap();
        reducer.reduce_order(1, &nd::array![[0.5]]).unwrap();
        let res = reducer.finalize().unwrap();
        assert_eq!(res.instabilities.len(), 1);
        assert_eq!(res.instabilities[0].sub_index, 1);
        assert_eq!(res.tilde[1][[0, 0]], 1.0);
    }

    #[test]
    fn out_of_sequence_rejected() {
        let space = pair_space();
        let mut reducer = CoherenceReducer::new(&space, 1);
        assert!(matches!(
            reducer.reduce_order(1, &nd::array![[1.0]]),
            Err(CceError::ReductionOrder { expected: 1, got: 2 }),
        ));
        reducer.reduce_order(0, &nd::array![[1.0, 1.0]]).unwrap();
        assert!(matches!(
            reducer.reduce_order(0, &nd::array![[1.0, 1.0]]),
            Err(CceError::ReductionOrder { expected: 2, got: 1 }),
        ));
        assert!(reducer.finalize().is_err());
    }

    #[test]
    fn empty_order_contributes_ones() {
        let bath = line_bath(&[0.0, 5.0]);
        let space
            = ClusterSpace::build(&DepthFirstPathTracing::new(1.0), &bath, 2).unwrap();
        let mut reducer = CoherenceReducer::new(&space, 2);
        reducer.reduce_order(0, &nd::array![[0.5, 0.5], [0.25, 1.0]]).unwrap();
        reducer.reduce_order(1, &nd::Array2::zeros((2, 0))).unwrap();
        let res = reducer.finalize().unwrap();
        assert_eq!(res.coherence.each_order.column(1), nd::array![1.0, 1.0]);
        assert_eq!(res.coherence.cumulative.column(1), nd::array![0.25, 0.25]);
    }
}
