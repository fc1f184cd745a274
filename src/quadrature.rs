//! Gauss-Legendre rules on the reference interval [-1, 1].
//!
//! `weights` and `points` return matching abscissa/weight sets in ascending
//! abscissa order. `ordered_points` arranges the tensor grid corner first
//! (bottom-left, bottom-right, top-right, top-left), then edge midpoints
//! (bottom, right, top, left), then the centre, which is the same traversal
//! the quadrilateral node numbering uses. Stress recovery relies on that
//! alignment when extrapolating Gauss point values to nodes.

use nalgebra::DMatrix;

use crate::error::{QuadfemError, Result};

/// Largest rule `points` supports
pub const MAX_POINTS_ORDER: usize = 4;

/// Gauss weights for an `n` point rule, n in 1..=5
pub fn weights(n: usize) -> Result<Vec<f64>> {
    match n {
        1 => Ok(vec![2.0]),
        2 => Ok(vec![1.0, 1.0]),
        3 => Ok(vec![5.0 / 9.0, 8.0 / 9.0, 5.0 / 9.0]),
        4 => Ok(vec![
            0.347854845137453857,
            0.652145154862546142,
            0.652145154862546142,
            0.347854845137453857,
        ]),
        5 => Ok(vec![
            0.236926885056189087,
            0.478628670499366468,
            0.568888888888888888,
            0.478628670499366468,
            0.236926885056189087,
        ]),
        _ => Err(QuadfemError::UnsupportedOrder(n)),
    }
}

/// Gauss abscissae for an `n` point rule, n in 1..=4
pub fn points(n: usize) -> Result<Vec<f64>> {
    match n {
        1 => Ok(vec![0.0]),
        2 => {
            let p = 1.0 / 3.0_f64.sqrt();
            Ok(vec![-p, p])
        }
        3 => {
            let p = 0.2 * 15.0_f64.sqrt();
            Ok(vec![-p, 0.0, p])
        }
        4 => Ok(vec![
            -0.861136311594052575,
            -0.339981043584856264,
            0.339981043584856264,
            0.861136311594052575,
        ]),
        _ => Err(QuadfemError::UnsupportedOrder(n)),
    }
}

/// Tensor-product Gauss points as (ξ, η) pairs in node-consistent order.
pub fn ordered_points(n: usize) -> Result<Vec<(f64, f64)>> {
    match n {
        1 => Ok(vec![(0.0, 0.0)]),
        2 => {
            let p = points(2)?[1];
            Ok(vec![(-p, -p), (p, -p), (p, p), (-p, p)])
        }
        3 => {
            let p = points(3)?[2];
            Ok(vec![
                (-p, -p),
                (p, -p),
                (p, p),
                (-p, p),
                (0.0, -p),
                (p, 0.0),
                (0.0, p),
                (-p, 0.0),
                (0.0, 0.0),
            ])
        }
        _ => Err(QuadfemError::UnsupportedOrder(n)),
    }
}

/// 1D Lagrange basis polynomial `a` through `abscissae`, evaluated at `x`
fn lagrange(abscissae: &[f64], a: usize, x: f64) -> f64 {
    abscissae
        .iter()
        .enumerate()
        .filter(|(b, _)| *b != a)
        .map(|(_, xb)| (x - xb) / (abscissae[a] - xb))
        .product()
}

fn abscissa_index(abscissae: &[f64], value: f64) -> usize {
    abscissae
        .iter()
        .position(|p| (p - value).abs() < 1e-12)
        .unwrap_or_else(|| panic!("{value} is not an abscissa of the {} point rule", abscissae.len()))
}

/// Extrapolation matrix from the `n`x`n` ordered Gauss grid to the given
/// natural coordinates.
///
/// Row `i` holds the tensor Lagrange interpolant through the Gauss grid
/// evaluated at `targets[i]`, so multiplying by a column of Gauss point
/// values yields the fitted field at each target. Rows sum to one.
pub fn extrapolation_matrix(n: usize, targets: &[(f64, f64)]) -> Result<DMatrix<f64>> {
    let abscissae = points(n)?;
    let grid = ordered_points(n)?;

    let mut matrix = DMatrix::zeros(targets.len(), grid.len());
    for (k, (xi_k, eta_k)) in grid.iter().enumerate() {
        let a = abscissa_index(&abscissae, *xi_k);
        let b = abscissa_index(&abscissae, *eta_k);
        for (i, (xi, eta)) in targets.iter().enumerate() {
            matrix[(i, k)] = lagrange(&abscissae, a, *xi) * lagrange(&abscissae, b, *eta);
        }
    }

    Ok(matrix)
}
