//! 4-node bilinear quadrilateral (Quad4).
//!
//! Shape functions `N_i = (1/4)(1 + ξ_i ξ)(1 + η_i η)`. Full integration
//! uses a 2x2 Gauss grid, reduced integration a single centroid point.

use nalgebra::{DMatrix, DVector};

use super::Formulation;
use crate::datatypes::IntegrationOrder;
use crate::error::{QuadfemError, Result};

const NODE_COORDS: [(f64, f64); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

#[derive(Debug, Clone, Copy)]
pub struct Quad4;

impl Quad4 {
    /// Extrapolation from the 2x2 grid. Each corner at (±1, ±1) sits at
    /// (±√3, ±√3) in the frame where the Gauss points are the corners, so
    /// the bilinear functions evaluated there give the nodal weights.
    fn extrapolation_matrix_2gp(&self) -> DMatrix<f64> {
        let scale = 3.0_f64.sqrt();
        let mut extrapolation = DMatrix::zeros(NODE_COORDS.len(), NODE_COORDS.len());
        for (i, (xi, eta)) in NODE_COORDS.iter().enumerate() {
            let shape_funcs = self.shape_functions(xi * scale, eta * scale);
            extrapolation.set_row(i, &shape_funcs.transpose());
        }
        extrapolation
    }
}

impl Formulation for Quad4 {
    fn name(&self) -> &'static str {
        "Bilinear Quadrilateral Element"
    }

    fn max_node_count(&self) -> usize {
        4
    }

    fn points_per_direction(&self, order: IntegrationOrder) -> usize {
        match order {
            IntegrationOrder::Full => 2,
            IntegrationOrder::Reduced => 1,
        }
    }

    fn shape_functions(&self, xi: f64, eta: f64) -> DVector<f64> {
        DVector::from_vec(vec![
            0.25 * (1.0 - xi) * (1.0 - eta), // bottom left
            0.25 * (1.0 + xi) * (1.0 - eta), // bottom right
            0.25 * (1.0 + xi) * (1.0 + eta), // top right
            0.25 * (1.0 - xi) * (1.0 + eta), // top left
        ])
    }

    fn shape_function_derivatives(&self, xi: f64, eta: f64) -> DMatrix<f64> {
        DMatrix::from_row_slice(
            2,
            4,
            &[
                -0.25 * (1.0 - eta),
                0.25 * (1.0 - eta),
                0.25 * (1.0 + eta),
                -0.25 * (1.0 + eta),
                -0.25 * (1.0 - xi),
                -0.25 * (1.0 + xi),
                0.25 * (1.0 + xi),
                0.25 * (1.0 - xi),
            ],
        )
    }

    fn extrapolation_matrix(&self, points_per_direction: usize) -> Result<DMatrix<f64>> {
        match points_per_direction {
            1 => Ok(DMatrix::from_element(NODE_COORDS.len(), 1, 1.0)),
            2 => Ok(self.extrapolation_matrix_2gp()),
            n => Err(QuadfemError::NotImplemented(format!(
                "{} extrapolation from {} gauss points",
                self.name(),
                n * n
            ))),
        }
    }
}
