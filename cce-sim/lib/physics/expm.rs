//! Matrix exponential by scaling and squaring with a Padé(13) approximant.
//!
//! See Higham, "The Scaling and Squaring Method for the Matrix Exponential
//! Revisited", SIAM J. Matrix Anal. Appl. 26(4) (2005).

use ndarray::{ self as nd, s };
use num_complex::Complex64 as C64;

// theta_13 from Higham's table
const THETA_13: f64 = 5.371_920_351_148_152;

const PADE_COEFFS: [f64; 14] = [
    1.0,
    0.5,
    0.12,
    1.833_333_333_333_333_4e-2,
    1.992_753_623_188_405_8e-3,
    1.630_434_782_608_696e-4,
    1.035_196_687_401_6e-5,
    5.175_983_437_008_01e-7,
    2.043_151_356_652_5e-8,
    6.306_022_705_717_593e-10,
    1.483_770_048_404_14e-11,
    2.529_153_491_597_966e-13,
    2.810_170_546_219_962_4e-15,
    1.544_049_750_670_309e-17,
];

/// Compute `exp(a)` for a square matrix.
///
/// Returns `None` if `a` is not square or the Padé denominator is singular.
pub fn matrix_exp(a: &nd::Array2<C64>) -> Option<nd::Array2<C64>> {
    let n = a.nrows();
    if n != a.ncols() { return None; }
    match n {
        0 => { return Some(nd::Array2::zeros((0, 0))); },
        1 => { return Some(nd::array![[a[[0, 0]].exp()]]); },
        _ => { },
    }
    let norm = norm_1(a);
    let scale: u32
        = if norm > THETA_13 {
            (norm / THETA_13).log2().ceil() as u32
        } else {
            0
        };
    let a_scaled = a.mapv(|x| x / 2.0_f64.powi(scale as i32));
    let mut result = pade13(&a_scaled)?;
    for _ in 0..scale {
        result = result.dot(&result);
    }
    Some(result)
}

/// Compute the unitary `exp(-i h dt)` for a Hermitian `h`.
pub fn unitary_exp(h: &nd::Array2<C64>, dt: f64) -> Option<nd::Array2<C64>> {
    matrix_exp(&h.mapv(|x| -C64::i() * x * dt))
}

// maximum absolute column sum
fn norm_1(a: &nd::Array2<C64>) -> f64 {
    a.axis_iter(nd::Axis(1))
        .map(|col| col.iter().map(|x| x.norm()).sum::<f64>())
        .fold(0.0, f64::max)
}

fn pade13(a: &nd::Array2<C64>) -> Option<nd::Array2<C64>> {
    let b = |k: usize| C64::from(PADE_COEFFS[k]);
    let eye: nd::Array2<C64> = nd::Array2::eye(a.nrows());
    let a2 = a.dot(a);
    let a4 = a2.dot(&a2);
    let a6 = a2.dot(&a4);

    let w1 = &a6 * b(13) + &a4 * b(11) + &a2 * b(9);
    let w2
        = w1.dot(&a6)
        + &a6 * b(7) + &a4 * b(5) + &a2 * b(3) + &eye * b(1);
    let u = a.dot(&w2);

    let v1 = &a6 * b(12) + &a4 * b(10) + &a2 * b(8);
    let v
        = v1.dot(&a6)
        + &a6 * b(6) + &a4 * b(4) + &a2 * b(2) + &eye * b(0);

    solve(&v - &u, &v + &u)
}

/// Solve `a x = rhs` with LAPACK's LU factorization.
#[cfg(feature = "openblas")]
fn solve(a: nd::Array2<C64>, rhs: nd::Array2<C64>) -> Option<nd::Array2<C64>> {
    use ndarray_linalg::{ Factorize, Solve };
    let lu = a.factorize_into().ok()?;
    let mut x: nd::Array2<C64> = nd::Array2::zeros(rhs.raw_dim());
    for (mut xj, bj) in x.axis_iter_mut(nd::Axis(1)).zip(rhs.axis_iter(nd::Axis(1))) {
        xj.assign(&lu.solve(&bj).ok()?);
    }
    Some(x)
}

/// Solve `a x = rhs` by Gaussian elimination with partial pivoting.
#[cfg(not(feature = "openblas"))]
fn solve(a: nd::Array2<C64>, rhs: nd::Array2<C64>) -> Option<nd::Array2<C64>> {
    let n = a.nrows();
    let m = rhs.ncols();
    let mut aug: nd::Array2<C64> = nd::Array2::zeros((n, n + m));
    aug.slice_mut(s![.., ..n]).assign(&a);
    aug.slice_mut(s![.., n..]).assign(&rhs);

    for col in 0..n {
        let pivot_row
            = (col..n)
            .max_by(|&i, &j| {
                aug[[i, col]].norm().total_cmp(&aug[[j, col]].norm())
            })?;
        if pivot_row != col {
            for j in 0..n + m {
                aug.swap([col, j], [pivot_row, j]);
            }
        }
        let pivot = aug[[col, col]];
        if pivot.norm() < 1e-15 { return None; }
        for row in col + 1..n {
            let factor = aug[[row, col]] / pivot;
            if factor == C64::from(0.0) { continue; }
            for j in col..n + m {
                let v = aug[[col, j]];
                aug[[row, j]] -= factor * v;
            }
        }
    }

    let mut x: nd::Array2<C64> = nd::Array2::zeros((n, m));
    for row in (0..n).rev() {
        let pivot = aug[[row, row]];
        for j in 0..m {
            let mut acc = aug[[row, n + j]];
            for k in row + 1..n {
                acc -= aug[[row, k]] * x[[k, j]];
            }
            x[[row, j]] = acc / pivot;
        }
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn max_dev(a: &nd::Array2<C64>, b: &nd::Array2<C64>) -> f64 {
        (a - b).iter().map(|x| x.norm()).fold(0.0, f64::max)
    }

    #[test]
    fn solve_recovers_known_system() {
        let a: nd::Array2<C64>
            = nd::array![[0.0, 2.0, 1.0], [1.0, 1.0, 0.0], [3.0, 0.0, 1.0]]
            .mapv(C64::from);
        let x: nd::Array2<C64>
            = nd::array![[1.0, -1.0], [2.0, 0.5], [-3.0, 4.0]]
            .mapv(C64::from)
            + nd::array![[0.5, 0.0], [0.0, -1.0], [1.0, 2.0]].mapv(|v| C64::new(0.0, v));
        let rhs = a.dot(&x);
        let sol = solve(a, rhs).unwrap();
        assert!(max_dev(&sol, &x) < 1e-12);
        let singular: nd::Array2<C64> = nd::Array2::zeros((2, 2));
        assert!(solve(singular, nd::Array2::eye(2)).is_none());
    }

    #[test]
    fn diagonal() {
        let a = nd::Array2::from_diag(&nd::array![
            C64::new(1.0, 0.0), C64::new(-2.0, 0.5), C64::new(0.0, 3.0),
        ]);
        let e = matrix_exp(&a).unwrap();
        let expected = nd::Array2::from_diag(&a.diag().mapv(|x| x.exp()));
        assert!(max_dev(&e, &expected) < 1e-12);
    }

    #[test]
    fn pauli_rotation() {
        // exp(-i sx theta / 2) for large theta exercises the squaring branch
        let theta = 40.0_f64;
        let sx = nd::array![
            [C64::from(0.0), C64::from(0.5)],
            [C64::from(0.5), C64::from(0.0)],
        ];
        let u = unitary_exp(&sx, theta).unwrap();
        let c = C64::from((theta / 2.0).cos());
        let s = -C64::i() * (theta / 2.0).sin();
        let expected = nd::array![[c, s], [s, c]];
        assert!(max_dev(&u, &expected) < 1e-10);
    }

    #[test]
    fn hermitian_generator_gives_unitary() {
        let h = nd::Array2::from_shape_fn((4, 4), |(i, j)| {
            let re = ((i + 2 * j) as f64).sin();
            let im = if i == j { 0.0 } else { (i as f64 - j as f64) * 0.3 };
            C64::new(re + ((j + 2 * i) as f64).sin(), im)
        });
        let u = unitary_exp(&h, 3.7).unwrap();
        let uu = u.t().mapv(|x| x.conj()).dot(&u);
        assert!(max_dev(&uu, &nd::Array2::eye(4)) < 1e-10);
    }

    #[test]
    fn non_square_rejected() {
        assert!(matrix_exp(&nd::Array2::zeros((2, 3))).is_none());
    }
}
