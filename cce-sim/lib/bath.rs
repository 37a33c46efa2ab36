//! Bath spins, their sources, and the cutoff-distance connectivity graph.

use std::{
    fs,
    ops::Deref,
    path::{ Path, PathBuf },
};
use regex::Regex;
use crate::{
    error::{ CceError, CceResult },
    spin::Isotope,
};

/// Position of a site on a two-dimensional lattice with a basis.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LatticeSite {
    /// Unit cell coordinates.
    pub cell: (i64, i64),
    /// Index of the site within the unit cell.
    pub basis: usize,
}

/// A single bath spin.
#[derive(Clone, Debug, PartialEq)]
pub struct BathSpin {
    /// Index of the spin within its collection.
    pub id: usize,
    pub isotope: Isotope,
    /// Position, in angstroms.
    pub coord: [f64; 3],
    /// Lattice site, if the spin was generated on a lattice.
    pub site: Option<LatticeSite>,
}

impl BathSpin {
    /// Euclidean distance to another spin.
    pub fn dist(&self, other: &Self) -> f64 { dist(&self.coord, &other.coord) }
}

pub(crate) fn dist(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a.iter().zip(b).map(|(ak, bk)| (ak - bk).powi(2)).sum::<f64>().sqrt()
}

/// Anything that can produce an ordered list of bath spins.
pub trait SpinSource {
    /// Generate the spin list. Spin `id`s need not be set; they are
    /// overwritten by enumeration order in [`SpinCollection::from_source`].
    fn spin_list(&self) -> CceResult<Vec<BathSpin>>;
}

/// Sparse symmetric connectivity between bath spins closer than a cutoff.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionGraph {
    neighbors: Vec<Vec<usize>>,
}

impl ConnectionGraph {
    /// Neighbors of spin `k`, in ascending index order.
    pub fn neighbors(&self, k: usize) -> &[usize] {
        self.neighbors.get(k).map(|n| n.as_slice()).unwrap_or(&[])
    }

    /// Return `true` if spins `a` and `b` are connected.
    pub fn connected(&self, a: usize, b: usize) -> bool {
        self.neighbors(a).binary_search(&b).is_ok()
    }

    /// Number of vertices.
    pub fn len(&self) -> usize { self.neighbors.len() }

    pub fn is_empty(&self) -> bool { self.neighbors.is_empty() }

    /// Total number of (undirected) edges.
    pub fn num_edges(&self) -> usize {
        self.neighbors.iter().map(|n| n.len()).sum::<usize>() / 2
    }
}

/// The full, immutable list of bath spins.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct SpinCollection {
    spins: Vec<BathSpin>,
}

impl Deref for SpinCollection {
    type Target = [BathSpin];

    fn deref(&self) -> &Self::Target { &self.spins }
}

impl FromIterator<BathSpin> for SpinCollection {
    fn from_iter<I>(iter: I) -> Self
    where I: IntoIterator<Item = BathSpin>
    {
        let spins
            = iter.into_iter().enumerate()
            .map(|(id, mut s)| { s.id = id; s })
            .collect();
        Self { spins }
    }
}

impl SpinCollection {
    /// Create a new collection by generating spins from a source.
    pub fn from_source<S>(source: &S) -> CceResult<Self>
    where S: SpinSource + ?Sized
    {
        let spins: Self = source.spin_list()?.into_iter().collect();
        tracing::info!(num_spins = spins.len(), "created bath spin collection");
        Ok(spins)
    }

    /// Return the spin list.
    pub fn spin_list(&self) -> &[BathSpin] { &self.spins }

    /// Connect every pair of spins separated by at most `cutoff`.
    pub fn connection_graph(&self, cutoff: f64) -> ConnectionGraph {
        let n = self.spins.len();
        let mut neighbors: Vec<Vec<usize>> = vec![Vec::new(); n];
        for i in 0..n {
            for j in i + 1..n {
                if self.spins[i].dist(&self.spins[j]) <= cutoff {
                    neighbors[i].push(j);
                    neighbors[j].push(i);
                }
            }
        }
        // pushes to `neighbors[j]` arrive in ascending `i`, so each list is
        // already sorted
        ConnectionGraph { neighbors }
    }
}

/// An explicit list of spins.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct SpinList(pub Vec<BathSpin>);

impl SpinList {
    /// Create a list of spins of a single isotope at the given coordinates.
    pub fn uniform<I>(isotope: &Isotope, coords: I) -> Self
    where I: IntoIterator<Item = [f64; 3]>
    {
        let spins
            = coords.into_iter()
            .map(|coord| BathSpin {
                id: 0,
                isotope: isotope.clone(),
                coord,
                site: None,
            })
            .collect();
        Self(spins)
    }
}

impl SpinSource for SpinList {
    fn spin_list(&self) -> CceResult<Vec<BathSpin>> { Ok(self.0.clone()) }
}

/// Spin coordinates read from a text file.
///
/// The file may begin with a line holding only the number of spins. Every other
/// non-empty line not starting with `#` must read `ISOTOPE x y z`, with
/// coordinates in angstroms.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpinFile {
    pub path: PathBuf,
}

impl SpinFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    fn parse(&self, content: &str) -> CceResult<Vec<BathSpin>> {
        let float = r"([-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?)";
        let line_pat
            = Regex::new(&format!(
                r"^\s*(\d*[A-Za-z]+)\s+{float}\s+{float}\s+{float}\s*$"
            ))
            .expect("bad spin file regex");
        let count_pat = Regex::new(r"^\s*(\d+)\s*$").expect("bad count regex");
        let err = |line: usize, reason: String| -> CceError {
            CceError::BathFile { path: self.path.clone(), line, reason }
        };

        let mut expected: Option<usize> = None;
        let mut spins: Vec<BathSpin> = Vec::new();
        for (k, line) in content.lines().enumerate() {
            let lineno = k + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') { continue; }
            if spins.is_empty() && expected.is_none() {
                if let Some(cap) = count_pat.captures(trimmed) {
                    expected = cap[1].parse().ok();
                    continue;
                }
            }
            let cap
                = line_pat.captures(trimmed)
                .ok_or_else(|| err(lineno, format!("malformed line {:?}", line)))?;
            let isotope
                = Isotope::lookup(&cap[1])
                .ok_or_else(|| err(lineno, format!("unknown isotope {:?}", &cap[1])))?;
            let mut coord = [0.0; 3];
            for (c, s) in coord.iter_mut().zip([&cap[2], &cap[3], &cap[4]]) {
                *c = s.parse()
                    .map_err(|e| err(lineno, format!("bad coordinate {:?}: {}", s, e)))?;
            }
            spins.push(BathSpin { id: spins.len(), isotope, coord, site: None });
        }
        if let Some(n) = expected {
            if n != spins.len() {
                return Err(err(0, format!("header declares {} spins, found {}", n, spins.len())));
            }
        }
        Ok(spins)
    }
}

impl SpinSource for SpinFile {
    fn spin_list(&self) -> CceResult<Vec<BathSpin>> {
        let content = fs::read_to_string(&self.path)?;
        self.parse(&content)
    }
}

/// Two-dimensional face-centered square lattice fully occupied by a single
/// isotope.
///
/// Each unit cell contributes a corner site (basis 0) at `a (i, j, 0)` and a
/// centered site (basis 1) at `a (i + 1/2, j + 1/2, 0)`. Corner sites span
/// `-range..=range` in both directions and centered sites `-range..range`.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceCenteredLattice2D {
    /// Lattice constant, in angstroms.
    pub lattice_const: f64,
    pub isotope: Isotope,
    pub range: i64,
}

impl FaceCenteredLattice2D {
    pub fn new(lattice_const: f64, isotope: Isotope, range: i64) -> Self {
        Self { lattice_const, isotope, range }
    }

    /// Return `true` if `site` lies within `root_range` cells of the origin.
    pub fn is_root(site: &LatticeSite, root_range: i64) -> bool {
        let (i, j) = site.cell;
        match site.basis {
            0 => i.abs() <= root_range && j.abs() <= root_range,
            _ => (-root_range..root_range).contains(&i)
                && (-root_range..root_range).contains(&j),
        }
    }

    fn site_coord(&self, site: &LatticeSite) -> [f64; 3] {
        let off = if site.basis == 0 { 0.0 } else { 0.5 };
        [
            self.lattice_const * (site.cell.0 as f64 + off),
            self.lattice_const * (site.cell.1 as f64 + off),
            0.0,
        ]
    }
}

impl SpinSource for FaceCenteredLattice2D {
    fn spin_list(&self) -> CceResult<Vec<BathSpin>> {
        let r = self.range;
        let corners
            = (-r..=r).flat_map(|i| (-r..=r).map(move |j| (i, j, 0)));
        let centers
            = (-r..r).flat_map(|i| (-r..r).map(move |j| (i, j, 1)));
        let spins
            = corners.chain(centers)
            .map(|(i, j, basis)| LatticeSite { cell: (i, j), basis })
            .enumerate()
            .map(|(id, site)| BathSpin {
                id,
                isotope: self.isotope.clone(),
                coord: self.site_coord(&site),
                site: Some(site),
            })
            .collect();
        Ok(spins)
    }
}
