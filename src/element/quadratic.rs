//! 8-node serendipity quadrilateral (Quad8).
//!
//! Corner nodes (i = 0..3):
//! ```text
//! N_i = (1/4)(1 + ξ_i ξ)(1 + η_i η)(ξ_i ξ + η_i η - 1)
//! ```
//!
//! Mid-side nodes on ξ = 0 (4, 6) and on η = 0 (5, 7):
//! ```text
//! N_i = (1/2)(1 - ξ²)(1 + η_i η)
//! N_i = (1/2)(1 + ξ_i ξ)(1 - η²)
//! ```
//!
//! Full integration uses a 3x3 grid, reduced integration 2x2. Gauss point
//! values are extrapolated with the Lagrange fit through the grid that was
//! used for recovery, biquadratic for 3x3 and bilinear for 2x2.

use nalgebra::{DMatrix, DVector};

use super::Formulation;
use crate::datatypes::IntegrationOrder;
use crate::error::{QuadfemError, Result};
use crate::quadrature;

const NODE_COORDS: [(f64, f64); 8] = [
    (-1.0, -1.0),
    (1.0, -1.0),
    (1.0, 1.0),
    (-1.0, 1.0),
    (0.0, -1.0),
    (1.0, 0.0),
    (0.0, 1.0),
    (-1.0, 0.0),
];

#[derive(Debug, Clone, Copy)]
pub struct Quad8;

impl Formulation for Quad8 {
    fn name(&self) -> &'static str {
        "Quadratic Quadrilateral Element"
    }

    fn max_node_count(&self) -> usize {
        8
    }

    fn points_per_direction(&self, order: IntegrationOrder) -> usize {
        match order {
            IntegrationOrder::Full => 3,
            IntegrationOrder::Reduced => 2,
        }
    }

    fn shape_functions(&self, xi: f64, eta: f64) -> DVector<f64> {
        let xi2 = xi * xi;
        let eta2 = eta * eta;

        DVector::from_vec(vec![
            0.25 * (1.0 - xi) * (1.0 - eta) * (-xi - eta - 1.0),
            0.25 * (1.0 + xi) * (1.0 - eta) * (xi - eta - 1.0),
            0.25 * (1.0 + xi) * (1.0 + eta) * (xi + eta - 1.0),
            0.25 * (1.0 - xi) * (1.0 + eta) * (-xi + eta - 1.0),
            0.5 * (1.0 - xi2) * (1.0 - eta),
            0.5 * (1.0 + xi) * (1.0 - eta2),
            0.5 * (1.0 - xi2) * (1.0 + eta),
            0.5 * (1.0 - xi) * (1.0 - eta2),
        ])
    }

    fn shape_function_derivatives(&self, xi: f64, eta: f64) -> DMatrix<f64> {
        let d_xi = [
            0.25 * (1.0 - eta) * (2.0 * xi + eta),
            0.25 * (1.0 - eta) * (2.0 * xi - eta),
            0.25 * (1.0 + eta) * (2.0 * xi + eta),
            0.25 * (1.0 + eta) * (2.0 * xi - eta),
            -xi * (1.0 - eta),
            0.5 * (1.0 - eta * eta),
            -xi * (1.0 + eta),
            -0.5 * (1.0 - eta * eta),
        ];
        let d_eta = [
            0.25 * (1.0 - xi) * (xi + 2.0 * eta),
            0.25 * (1.0 + xi) * (-xi + 2.0 * eta),
            0.25 * (1.0 + xi) * (xi + 2.0 * eta),
            0.25 * (1.0 - xi) * (-xi + 2.0 * eta),
            -0.5 * (1.0 - xi * xi),
            -(1.0 + xi) * eta,
            0.5 * (1.0 - xi * xi),
            -(1.0 - xi) * eta,
        ];

        DMatrix::from_fn(2, 8, |r, c| if r == 0 { d_xi[c] } else { d_eta[c] })
    }

    fn extrapolation_matrix(&self, points_per_direction: usize) -> Result<DMatrix<f64>> {
        match points_per_direction {
            1..=3 => quadrature::extrapolation_matrix(points_per_direction, &NODE_COORDS),
            n => Err(QuadfemError::NotImplemented(format!(
                "{} extrapolation from {} gauss points",
                self.name(),
                n * n
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn partition_of_unity() {
        let steps = [-1.0, -0.7, -0.2, 0.0, 0.45, 0.9, 1.0];
        for xi in steps {
            for eta in steps {
                assert_relative_eq!(Quad8.shape_functions(xi, eta).sum(), 1.0, epsilon = 1e-14);
            }
        }
    }

    #[test]
    fn shape_functions_are_nodal() {
        for (i, (xi, eta)) in NODE_COORDS.iter().enumerate() {
            let n = Quad8.shape_functions(*xi, *eta);
            for j in 0..8 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(n[j], expected, epsilon = 1e-14);
            }
        }
    }

    #[test]
    fn derivatives_match_finite_differences() {
        let (xi, eta, h) = (-0.33, 0.58, 1e-6);
        let derivatives = Quad8.shape_function_derivatives(xi, eta);
        let d_xi = (Quad8.shape_functions(xi + h, eta) - Quad8.shape_functions(xi - h, eta)) / (2.0 * h);
        let d_eta = (Quad8.shape_functions(xi, eta + h) - Quad8.shape_functions(xi, eta - h)) / (2.0 * h);
        for i in 0..8 {
            assert_relative_eq!(derivatives[(0, i)], d_xi[i], epsilon = 1e-8);
            assert_relative_eq!(derivatives[(1, i)], d_eta[i], epsilon = 1e-8);
        }
    }

    #[test]
    fn biquadratic_fit_recovers_quadratic_field_at_nodes() {
        // f = 1 + 2ξ - η + 0.5ξη + 3ξ² - η²
        let f = |xi: f64, eta: f64| 1.0 + 2.0 * xi - eta + 0.5 * xi * eta + 3.0 * xi * xi - eta * eta;
        let grid = quadrature::ordered_points(3).unwrap();
        let values = DVector::from_iterator(grid.len(), grid.iter().map(|(x, e)| f(*x, *e)));

        let nodal = Quad8.extrapolation_matrix(3).unwrap() * values;
        for (i, (xi, eta)) in NODE_COORDS.iter().enumerate() {
            assert_relative_eq!(nodal[i], f(*xi, *eta), epsilon = 1e-12);
        }
    }

    #[test]
    fn reduced_extrapolation_is_bilinear() {
        let m = Quad8.extrapolation_matrix(2).unwrap();
        assert_eq!(m.shape(), (8, 4));
        // Mid-side node 4 at (0, -1) weighs both columns of the grid equally
        let s = 3.0_f64.sqrt();
        assert_relative_eq!(m[(4, 0)], 0.25 * (1.0 + s), epsilon = 1e-12);
        assert_relative_eq!(m[(4, 1)], m[(4, 0)], epsilon = 1e-12);
        assert_relative_eq!(m[(4, 2)], 0.25 * (1.0 - s), epsilon = 1e-12);
        assert_relative_eq!(m[(4, 3)], m[(4, 2)], epsilon = 1e-12);
    }
}
