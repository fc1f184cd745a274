//! Isoparametric quadrilateral elements.
//!
//! An [`Element`] holds the indices of its nodes in the geometry arena, a
//! shared material, and the Gauss point results of the latest stress
//! recovery. The formulas that differ between element variants live behind
//! the [`Formulation`] trait; everything built on top of them (Jacobian, B
//! matrix, stiffness integration, recovery, extrapolation) is shared.
//!
//! # Node Numbering
//!
//! ```text
//!  3----6----2
//!  |         |
//!  7         5
//!  |         |
//!  0----4----1
//! ```
//!
//! Corners come first counter-clockwise from the bottom-left, followed by
//! mid-side nodes for the quadratic variant. Local DOF `2i` is the x
//! component of node `i`, `2i + 1` the y component.

pub mod bilinear;
pub mod quadratic;

use std::fmt::Debug;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector, Matrix2, Vector3};

use crate::datatypes::{ElementId, IntegrationOrder, Node, NodeId};
use crate::error::{QuadfemError, Result};
use crate::material::{Material, StressState};
use crate::quadrature;

pub use bilinear::Quad4;
pub use quadratic::Quad8;

/// Interpolation formulas of an element variant.
pub trait Formulation: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn max_node_count(&self) -> usize;

    /// Gauss points per direction used for the given integration order
    fn points_per_direction(&self, order: IntegrationOrder) -> usize;

    /// Column vector of N_i at (ξ, η)
    fn shape_functions(&self, xi: f64, eta: f64) -> DVector<f64>;

    /// 2 x k matrix, row 0 holds ∂N_i/∂ξ and row 1 holds ∂N_i/∂η
    fn shape_function_derivatives(&self, xi: f64, eta: f64) -> DMatrix<f64>;

    /// Matrix mapping values at `quadrature::ordered_points(n)` to nodal
    /// values, one row per node
    fn extrapolation_matrix(&self, points_per_direction: usize) -> Result<DMatrix<f64>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Bilinear,
    Quadratic,
}

impl ElementKind {
    /// Picks the variant matching a connectivity list length
    pub fn from_node_count(count: usize) -> Result<ElementKind> {
        match count {
            4 => Ok(ElementKind::Bilinear),
            8 => Ok(ElementKind::Quadratic),
            _ => Err(QuadfemError::UnsupportedElement(count)),
        }
    }

    pub fn formulation(&self) -> &'static dyn Formulation {
        match self {
            ElementKind::Bilinear => &Quad4,
            ElementKind::Quadratic => &Quad8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Element {
    pub id: ElementId,
    pub kind: ElementKind,
    nodes: Vec<NodeId>,
    material: Option<Arc<dyn Material>>,
    stress_state: StressState,
    dof_count: usize,
    gauss_stress: Vec<Vector3<f64>>,
    gauss_strain: Vec<Vector3<f64>>,
}

impl Element {
    pub fn new(id: ElementId, kind: ElementKind) -> Element {
        Element {
            id,
            kind,
            nodes: Vec::with_capacity(kind.formulation().max_node_count()),
            material: None,
            stress_state: StressState::default(),
            dof_count: 0,
            gauss_stress: Vec::new(),
            gauss_strain: Vec::new(),
        }
    }

    pub fn formulation(&self) -> &'static dyn Formulation {
        self.kind.formulation()
    }

    /// Appends a node to the connectivity
    ///
    /// # Arguments
    /// * `node` - Handle of a node in the owning geometry
    pub fn add_node(&mut self, node: NodeId) -> Result<()> {
        let formulation = self.formulation();
        if self.nodes.len() >= formulation.max_node_count() {
            return Err(QuadfemError::ElementFull {
                kind: formulation.name(),
                max: formulation.max_node_count(),
            });
        }
        self.nodes.push(node);
        self.dof_count = self.nodes.len() * 2;
        Ok(())
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn set_material(&mut self, material: Arc<dyn Material>) {
        self.material = Some(material);
    }

    pub fn material(&self) -> Result<&Arc<dyn Material>> {
        self.material
            .as_ref()
            .ok_or(QuadfemError::MissingMaterial(self.id))
    }

    pub fn set_stress_state(&mut self, stress_state: StressState) {
        self.stress_state = stress_state;
    }

    pub fn count_dofs(&self) -> usize {
        self.dof_count
    }

    pub fn shape_functions(&self, xi: f64, eta: f64) -> DVector<f64> {
        self.formulation().shape_functions(xi, eta)
    }

    pub fn shape_function_derivatives(&self, xi: f64, eta: f64) -> DMatrix<f64> {
        self.formulation().shape_function_derivatives(xi, eta)
    }

    /// k x 2 matrix of nodal coordinates, one row per local node
    fn coordinates(&self, nodes: &[Node]) -> DMatrix<f64> {
        let mut coords = DMatrix::zeros(self.nodes.len(), 2);
        for (i, node_id) in self.nodes.iter().enumerate() {
            let vertex = &nodes[node_id.0].vertex;
            coords[(i, 0)] = vertex.x;
            coords[(i, 1)] = vertex.y;
        }
        coords
    }

    /// Computes the Jacobian matrix from natural derivatives
    ///
    /// # Arguments
    /// * `nodes` - The geometry's node arena
    /// * `derivatives` - 2 x k natural derivative matrix
    ///
    /// # Returns
    /// `[[∂x/∂ξ, ∂y/∂ξ], [∂x/∂η, ∂y/∂η]]`
    pub fn jacobian(&self, nodes: &[Node], derivatives: &DMatrix<f64>) -> Matrix2<f64> {
        let product = derivatives * self.coordinates(nodes);
        Matrix2::new(
            product[(0, 0)],
            product[(0, 1)],
            product[(1, 0)],
            product[(1, 1)],
        )
    }

    pub fn jacobian_determinant(jacobian: &Matrix2<f64>) -> f64 {
        jacobian.determinant()
    }

    /// Inverts the Jacobian, rejecting inverted or collapsed mappings
    pub fn inverse_jacobian(&self, jacobian: &Matrix2<f64>) -> Result<Matrix2<f64>> {
        let det = Self::jacobian_determinant(jacobian);
        if det <= 0.0 {
            return Err(QuadfemError::DegenerateElement {
                element: self.id,
                det,
            });
        }
        jacobian
            .try_inverse()
            .ok_or(QuadfemError::DegenerateElement {
                element: self.id,
                det,
            })
    }

    /// Shape function derivatives with respect to x and y at (ξ, η)
    ///
    /// # Returns
    /// The 2 x k physical derivative matrix and the Jacobian determinant
    fn physical_derivatives(
        &self,
        nodes: &[Node],
        xi: f64,
        eta: f64,
    ) -> Result<(DMatrix<f64>, f64)> {
        let natural = self.shape_function_derivatives(xi, eta);
        let jacobian = self.jacobian(nodes, &natural);
        let inverse = self.inverse_jacobian(&jacobian)?;
        let det = Self::jacobian_determinant(&jacobian);
        let inverse = DMatrix::from_column_slice(2, 2, inverse.as_slice());

        Ok((inverse * natural, det))
    }

    /// Builds the 3 x 2k strain-displacement matrix
    ///
    /// # Arguments
    /// * `derivatives` - 2 x k derivative matrix in physical coordinates
    pub fn assemble_b(&self, derivatives: &DMatrix<f64>) -> DMatrix<f64> {
        let mut b = DMatrix::zeros(3, self.dof_count);
        for i in 0..self.nodes.len() {
            let col = 2 * i;
            b[(0, col)] = derivatives[(0, i)]; // εxx = ∂u/∂x
            b[(1, col + 1)] = derivatives[(1, i)]; // εyy = ∂v/∂y
            b[(2, col)] = derivatives[(1, i)]; // γxy = ∂u/∂y + ∂v/∂x
            b[(2, col + 1)] = derivatives[(0, i)];
        }
        b
    }

    fn thickness(&self) -> Result<f64> {
        let material = self.material()?;
        material.thickness().ok_or_else(|| {
            QuadfemError::MaterialMismatch(format!(
                "{} on element {} has no thickness for {}",
                material.name(),
                self.id,
                self.formulation().name()
            ))
        })
    }

    fn elastic_matrix(&self) -> Result<DMatrix<f64>> {
        let d = self
            .material()?
            .elastic_matrix(self.stress_state.is_plane_stress())?;
        Ok(DMatrix::from_column_slice(3, 3, d.as_slice()))
    }

    fn check_complete(&self) -> Result<()> {
        let formulation = self.formulation();
        if self.nodes.len() != formulation.max_node_count() {
            return Err(QuadfemError::UnsupportedElement(self.nodes.len()));
        }
        Ok(())
    }

    /// Integrates the element stiffness matrix over the tensor Gauss grid
    ///
    /// # Arguments
    /// * `nodes` - The geometry's node arena
    /// * `order` - Full or reduced integration
    ///
    /// # Returns
    /// A symmetric 2k x 2k matrix
    pub fn stiffness_matrix(&self, nodes: &[Node], order: IntegrationOrder) -> Result<DMatrix<f64>> {
        self.check_complete()?;
        let number_gp = self.formulation().points_per_direction(order);
        let weights = quadrature::weights(number_gp)?;
        let points = quadrature::points(number_gp)?;

        let elastic_matrix = self.elastic_matrix()?;
        let thickness = self.thickness()?;

        let mut stiffness = DMatrix::zeros(self.dof_count, self.dof_count);
        for (i, wi) in weights.iter().enumerate() {
            for (j, wj) in weights.iter().enumerate() {
                let (derivatives, det) = self.physical_derivatives(nodes, points[i], points[j])?;
                let b = self.assemble_b(&derivatives);

                stiffness += b.transpose() * &elastic_matrix * &b * (det * thickness * wi * wj);
            }
        }

        // B^T D B is only symmetric up to round-off
        let symmetric = (&stiffness + stiffness.transpose()) * 0.5;
        Ok(symmetric)
    }

    /// Per-local-DOF free index, `None` where the component is constrained
    pub fn steering_vector(&self, nodes: &[Node]) -> Vec<Option<usize>> {
        let mut steering = Vec::with_capacity(self.dof_count);
        for node_id in &self.nodes {
            let node = &nodes[node_id.0];
            steering.push(node.global_index_x);
            steering.push(node.global_index_y);
        }
        steering
    }

    /// Gathers the element's local displacement vector from the full
    /// per-node displacement vector `[u0x, u0y, u1x, u1y, ...]`
    pub fn local_displacements(&self, global_displacement: &DVector<f64>) -> DVector<f64> {
        let mut local = DVector::zeros(self.dof_count);
        for (i, node_id) in self.nodes.iter().enumerate() {
            local[2 * i] = global_displacement[2 * node_id.0];
            local[2 * i + 1] = global_displacement[2 * node_id.0 + 1];
        }
        local
    }

    /// Recovers strain and stress at the ordered Gauss points and keeps them
    /// for extrapolation
    ///
    /// # Arguments
    /// * `nodes` - The geometry's node arena
    /// * `global_displacement` - Full per-node displacement vector
    /// * `order` - Full or reduced integration
    ///
    /// # Returns
    /// The stress and strain at each point of `quadrature::ordered_points`
    pub fn stress_strain_at_gauss_points(
        &mut self,
        nodes: &[Node],
        global_displacement: &DVector<f64>,
        order: IntegrationOrder,
    ) -> Result<(&[Vector3<f64>], &[Vector3<f64>])> {
        self.check_complete()?;
        self.gauss_stress.clear();
        self.gauss_strain.clear();

        let number_gp = self.formulation().points_per_direction(order);
        let arranged_gauss_points = quadrature::ordered_points(number_gp)?;
        let elastic_matrix = self.elastic_matrix()?;
        let local = self.local_displacements(global_displacement);

        let mut stress_gp = Vec::with_capacity(arranged_gauss_points.len());
        let mut strain_gp = Vec::with_capacity(arranged_gauss_points.len());
        for (xi, eta) in arranged_gauss_points {
            let (derivatives, _) = self.physical_derivatives(nodes, xi, eta)?;
            let b = self.assemble_b(&derivatives);

            let strain = &b * &local;
            let stress = &elastic_matrix * &strain;

            strain_gp.push(Vector3::new(strain[0], strain[1], strain[2]));
            stress_gp.push(Vector3::new(stress[0], stress[1], stress[2]));
        }

        self.gauss_stress = stress_gp;
        self.gauss_strain = strain_gp;

        Ok((self.gauss_stress.as_slice(), self.gauss_strain.as_slice()))
    }

    /// Projects the stored Gauss point values onto the element's nodes and
    /// appends one contribution per node
    ///
    /// # Arguments
    /// * `nodes` - The geometry's node arena
    /// * `order` - Must match the order used for recovery
    pub fn extrapolate_to_nodes(&self, nodes: &mut [Node], order: IntegrationOrder) -> Result<()> {
        let number_gp = self.formulation().points_per_direction(order);
        let extrapolation = self.formulation().extrapolation_matrix(number_gp)?;

        if self.gauss_stress.len() != extrapolation.ncols()
            || self.gauss_strain.len() != extrapolation.ncols()
        {
            return Err(QuadfemError::MissingGaussValues(self.id));
        }

        let stress = &extrapolation * rows_to_matrix(&self.gauss_stress);
        let strain = &extrapolation * rows_to_matrix(&self.gauss_strain);

        for (i, node_id) in self.nodes.iter().enumerate() {
            let node = &mut nodes[node_id.0];
            node.stress_contributions.push((
                self.id,
                Vector3::new(stress[(i, 0)], stress[(i, 1)], stress[(i, 2)]),
            ));
            node.strain_contributions.push((
                self.id,
                Vector3::new(strain[(i, 0)], strain[(i, 1)], strain[(i, 2)]),
            ));
        }

        Ok(())
    }

    /// Area of the element in the plane
    pub fn area(&self, nodes: &[Node]) -> Result<f64> {
        self.check_complete()?;
        let number_gp = self.formulation().points_per_direction(IntegrationOrder::Full);
        let weights = quadrature::weights(number_gp)?;
        let points = quadrature::points(number_gp)?;

        let mut area = 0.0;
        for (i, wi) in weights.iter().enumerate() {
            for (j, wj) in weights.iter().enumerate() {
                let natural = self.shape_function_derivatives(points[i], points[j]);
                let jacobian = self.jacobian(nodes, &natural);
                area += wi * wj * Self::jacobian_determinant(&jacobian);
            }
        }
        Ok(area)
    }
}

/// Stacks 3-component vectors as rows of an m x 3 matrix
fn rows_to_matrix(values: &[Vector3<f64>]) -> DMatrix<f64> {
    DMatrix::from_fn(values.len(), 3, |r, c| values[r][c])
}
