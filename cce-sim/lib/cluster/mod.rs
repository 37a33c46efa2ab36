//! Enumeration of bath-spin clusters and the sub-cluster containment relation.
//!
//! Orders are indexed from zero throughout: order index `k` holds clusters of
//! `k + 1` spins.

use std::{
    collections::BTreeSet,
    fmt,
    ops::Deref,
};
use indexmap::IndexSet;
use itertools::Itertools;
use rustc_hash::FxHashMap as HashMap;
use crate::{
    bath::SpinCollection,
    error::{ CceError, CceResult },
};

pub mod dfpt;
pub use dfpt::DepthFirstPathTracing;

pub mod lattice;
pub use lattice::UniformBathOnLattice;

/// Sorted tuple of bath-spin indices forming a single cluster.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusterIndex(Vec<usize>);

impl ClusterIndex {
    /// Create a new cluster index, sorting and deduplicating `spins`.
    pub fn new<I>(spins: I) -> Self
    where I: IntoIterator<Item = usize>
    {
        let mut spins: Vec<usize> = spins.into_iter().collect();
        spins.sort_unstable();
        spins.dedup();
        Self(spins)
    }

    /// Return a copy of `self` extended by one spin, or `None` if the spin is
    /// already a member.
    pub fn extended(&self, spin: usize) -> Option<Self> {
        match self.0.binary_search(&spin) {
            Ok(_) => None,
            Err(pos) => {
                let mut spins = self.0.clone();
                spins.insert(pos, spin);
                Some(Self(spins))
            },
        }
    }

    /// Order index of the cluster (number of spins less one).
    ///
    /// *Panics* if the cluster is empty.
    pub fn order(&self) -> usize { self.0.len() - 1 }

    /// Return `true` if every spin of `self` belongs to `other`.
    pub fn is_subset(&self, other: &Self) -> bool {
        self.0.iter().all(|s| other.0.binary_search(s).is_ok())
    }

    /// Return the underlying spin indices.
    pub fn spins(&self) -> &[usize] { &self.0 }
}

impl Deref for ClusterIndex {
    type Target = [usize];

    fn deref(&self) -> &Self::Target { &self.0 }
}

impl fmt::Display for ClusterIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.0.iter().join(", "))
    }
}

/// `(order, index)` address of a single cluster.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusterPosition {
    pub order: usize,
    pub index: usize,
}

impl ClusterPosition {
    pub fn new(order: usize, index: usize) -> Self { Self { order, index } }
}

impl fmt::Display for ClusterPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.order, self.index)
    }
}

/// A strategy for grouping bath spins into clusters.
///
/// Implementors must return exactly `max_order` lists, one per order index,
/// free of duplicate spin sets within each order, and must be deterministic
/// in their inputs.
pub trait ClusterGrouping {
    fn enumerate(&self, bath: &SpinCollection, max_order: usize)
        -> CceResult<Vec<Vec<ClusterIndex>>>;
}

/// Grow clusters order by order: every cluster of order `k` is extended by each
/// spin adjacent (per `neighbors`) to one of its members, in member order then
/// neighbor order, rejecting duplicates.
pub(crate) fn grow_clusters<'a, N>(
    order0: Vec<ClusterIndex>,
    max_order: usize,
    neighbors: N,
) -> Vec<Vec<ClusterIndex>>
where N: Fn(usize) -> &'a [usize]
{
    let mut clusters: Vec<Vec<ClusterIndex>> = Vec::with_capacity(max_order);
    if max_order == 0 { return clusters; }
    clusters.push(order0);
    for _ in 1..max_order {
        let prev = clusters.last().map(|c| c.as_slice()).unwrap_or(&[]);
        let mut next: IndexSet<ClusterIndex> = IndexSet::new();
        for cluster in prev.iter() {
            for &member in cluster.iter() {
                for &n in neighbors(member) {
                    if let Some(ext) = cluster.extended(n) {
                        next.insert(ext);
                    }
                }
            }
        }
        clusters.push(next.into_iter().collect());
    }
    clusters
}

/// All clusters up to a maximum order together with their sub-cluster
/// containment relation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterSpace {
    clusters: Vec<Vec<ClusterIndex>>,
    sub_clusters: Vec<Vec<BTreeSet<ClusterPosition>>>,
    num_spins: usize,
}

impl ClusterSpace {
    /// Enumerate clusters with `grouping` and compute the sub-cluster relation.
    ///
    /// Fails with [`CceError::EmptyBath`] if the bath holds no spins, and with
    /// [`CceError::EmptyEnumeration`] if the strategy finds no single-spin
    /// clusters.
    pub fn build<G>(grouping: &G, bath: &SpinCollection, max_order: usize)
        -> CceResult<Self>
    where G: ClusterGrouping + ?Sized
    {
        if max_order == 0 {
            return Err(CceError::config("max_order must be positive"));
        }
        if bath.is_empty() { return Err(CceError::EmptyBath); }
        let clusters = grouping.enumerate(bath, max_order)?;
        if clusters.len() != max_order {
            return Err(CceError::config(format!(
                "grouping returned {} orders, expected {}",
                clusters.len(), max_order,
            )));
        }
        if clusters[0].is_empty() {
            return Err(CceError::EmptyEnumeration { order: 1 });
        }
        for (k, clst) in clusters.iter().enumerate() {
            if clst.is_empty() {
                tracing::warn!(order = k + 1, "no clusters at this order");
            }
            if let Some(bad) = clst.iter().find(|c| c.len() != k + 1) {
                return Err(CceError::config(format!(
                    "cluster {} listed at order {}", bad, k + 1,
                )));
            }
            if let Some(bad) = clst.iter().find(|c| c.iter().any(|s| *s >= bath.len())) {
                return Err(CceError::config(format!(
                    "cluster {} refers to a spin outside the bath of {}", bad, bath.len(),
                )));
            }
        }
        let sub_clusters = Self::index_sub_clusters(&clusters);
        let space = Self { clusters, sub_clusters, num_spins: bath.len() };
        tracing::info!(counts = ?space.counts(), "built cluster space");
        Ok(space)
    }

    fn index_sub_clusters(clusters: &[Vec<ClusterIndex>])
        -> Vec<Vec<BTreeSet<ClusterPosition>>>
    {
        let lookup: HashMap<&ClusterIndex, ClusterPosition>
            = clusters.iter().enumerate()
            .flat_map(|(order, clst)| {
                clst.iter().enumerate()
                    .map(move |(index, c)| (c, ClusterPosition::new(order, index)))
            })
            .collect();
        clusters.iter()
            .map(|clst| {
                clst.iter()
                    .map(|c| {
                        (1..c.len())
                            .flat_map(|size| c.iter().copied().combinations(size))
                            .filter_map(|sub| {
                                lookup.get(&ClusterIndex(sub)).copied()
                            })
                            .collect()
                    })
                    .collect()
            })
            .collect()
    }

    /// Number of orders.
    pub fn max_order(&self) -> usize { self.clusters.len() }

    /// Number of spins in the bath the clusters were drawn from.
    pub fn num_spins(&self) -> usize { self.num_spins }

    /// Number of clusters at each order index.
    pub fn counts(&self) -> Vec<usize> {
        self.clusters.iter().map(|c| c.len()).collect()
    }

    /// All clusters at an order index.
    pub fn clusters(&self, order: usize) -> &[ClusterIndex] {
        self.clusters.get(order).map(|c| c.as_slice()).unwrap_or(&[])
    }

    /// Like [`Self::clusters`], but fails with
    /// [`CceError::EmptyEnumeration`] if there are none.
    pub fn clusters_nonempty(&self, order: usize) -> CceResult<&[ClusterIndex]> {
        let clst = self.clusters(order);
        if clst.is_empty() {
            Err(CceError::EmptyEnumeration { order: order + 1 })
        } else {
            Ok(clst)
        }
    }

    /// Get a single cluster.
    pub fn get(&self, pos: ClusterPosition) -> Option<&ClusterIndex> {
        self.clusters.get(pos.order).and_then(|c| c.get(pos.index))
    }

    /// Every cluster at a lower order contained in the cluster at `pos`.
    pub fn sub_clusters(&self, pos: ClusterPosition)
        -> Option<&BTreeSet<ClusterPosition>>
    {
        self.sub_clusters.get(pos.order).and_then(|s| s.get(pos.index))
    }

    /// Iterate over every `(position, cluster)` pair by ascending position.
    pub fn iter(&self) -> impl Iterator<Item = (ClusterPosition, &ClusterIndex)> + '_ {
        self.clusters.iter().enumerate()
            .flat_map(|(order, clst)| {
                clst.iter().enumerate()
                    .map(move |(index, c)| (ClusterPosition::new(order, index), c))
            })
    }
}

impl fmt::Display for ClusterSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (order, clst) in self.clusters.iter().enumerate() {
            writeln!(f, "order {} ({} clusters):", order + 1, clst.len())?;
            for (index, c) in clst.iter().enumerate() {
                let subs = &self.sub_clusters[order][index];
                if subs.is_empty() {
                    writeln!(f, "  {:>6} {}", index, c)?;
                } else {
                    writeln!(f, "  {:>6} {} <- [{}]", index, c, subs.iter().join(" "))?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{ bath::SpinList, spin::Isotope };

    pub(crate) fn line_bath(xs: &[f64]) -> SpinCollection {
        let c13 = Isotope::lookup("13C").unwrap();
        SpinList::uniform(&c13, xs.iter().map(|x| [*x, 0.0, 0.0]))
            .0
            .into_iter()
            .collect()
    }

    #[test]
    fn extended_keeps_sorted() {
        let c = ClusterIndex::new([4, 1]);
        assert_eq!(c.extended(2).unwrap().spins(), &[1, 2, 4]);
        assert!(c.extended(4).is_none());
        assert_eq!(c.order(), 1);
    }

    #[test]
    fn sub_clusters_are_strict_subsets_and_closed() {
        // chain 0-1-2-3 with unit spacing
        let bath = line_bath(&[0.0, 1.0, 2.0, 3.0]);
        let space
            = ClusterSpace::build(&DepthFirstPathTracing::new(1.1), &bath, 4)
            .unwrap();
        assert_eq!(space.counts(), vec![4, 3, 2, 1]);
        for (pos, c) in space.iter() {
            let subs = space.sub_clusters(pos).unwrap();
            if pos.order > 0 { assert!(!subs.is_empty()); }
            for sub in subs.iter() {
                assert!(sub.order < pos.order);
                let s = space.get(*sub).unwrap();
                assert!(s.is_subset(c) && s != c);
                // transitive closure
                for subsub in space.sub_clusters(*sub).unwrap() {
                    assert!(subs.contains(subsub));
                }
            }
        }
        let top = ClusterPosition::new(3, 0);
        // (0 1 2 3) contains 4 singles, 3 pairs and 2 triples
        assert_eq!(space.sub_clusters(top).unwrap().len(), 9);
    }

    #[test]
    fn enumeration_is_idempotent() {
        let bath = line_bath(&[0.0, 0.7, 1.9, 2.2, 3.0, 5.5]);
        let strategy = DepthFirstPathTracing::new(1.5);
        let a = ClusterSpace::build(&strategy, &bath, 3).unwrap();
        let b = ClusterSpace::build(&strategy, &bath, 3).unwrap();
        assert_eq!(a, b);
        assert_eq!(format!("{}", a), format!("{}", b));
    }

    #[test]
    fn empty_bath_fails() {
        let bath = SpinCollection::default();
        assert!(matches!(
            ClusterSpace::build(&DepthFirstPathTracing::new(1.0), &bath, 2),
            Err(CceError::EmptyBath),
        ));
    }

    #[test]
    fn disconnected_bath_gives_empty_higher_orders() {
        let bath = line_bath(&[0.0, 10.0, 20.0]);
        let space
            = ClusterSpace::build(&DepthFirstPathTracing::new(1.0), &bath, 3)
            .unwrap();
        assert_eq!(space.counts(), vec![3, 0, 0]);
        assert!(matches!(
            space.clusters_nonempty(1),
            Err(CceError::EmptyEnumeration { order: 2 }),
        ));
    }

    struct Listed(Vec<Vec<ClusterIndex>>);

    impl ClusterGrouping for Listed {
        fn enumerate(&self, _bath: &SpinCollection, _max_order: usize)
            -> CceResult<Vec<Vec<ClusterIndex>>>
        {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn spins_outside_bath_rejected() {
        let bath = line_bath(&[0.0, 1.0]);
        let listed = Listed(vec![vec![ClusterIndex::new([0]), ClusterIndex::new([2])]]);
        assert!(matches!(
            ClusterSpace::build(&listed, &bath, 1),
            Err(CceError::Config(_)),
        ));
        let space = ClusterSpace::build(&DepthFirstPathTracing::new(1.1), &bath, 2).unwrap();
        assert_eq!(space.num_spins(), 2);
    }
}
