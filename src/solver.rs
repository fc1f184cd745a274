use std::sync::Arc;

use indicatif::ProgressBar;
use nalgebra::{Cholesky, DMatrix, DVector, Vector3};
use tracing::{debug, info, warn};

use crate::{
    datatypes::{ElementId, IntegrationOrder, Load, NodeId},
    error::{QuadfemError, Result},
    geometry::Geometry,
    material::{Material, StressState},
};

pub const DOF: usize = 2;

/// Smallest Cholesky pivot, relative to the largest diagonal entry of the
/// stiffness matrix, accepted before the system counts as singular
pub const SINGULAR_PIVOT_TOLERANCE: f64 = 1e-12;

/// Runs a linear static analysis over a [`Geometry`].
///
/// The pipeline is strictly sequential: number free DOFs, integrate and
/// assemble stiffness, assemble forces, solve, recover stress and strain at
/// Gauss points, extrapolate to nodes, average. Every call to
/// [`Runner::run_analysis`] starts from a clean slate.
#[derive(Debug, Default)]
pub struct Runner {
    pub geometry: Geometry,
    stress_state: StressState,
    show_progress: bool,
    global_stiffness_matrix: Option<DMatrix<f64>>,
    global_force_vector: Option<DVector<f64>>,
    global_displacement_vector: Option<DVector<f64>>,
}

impl Runner {
    pub fn new() -> Runner {
        Runner::default()
    }

    pub fn with_geometry(geometry: Geometry) -> Runner {
        Runner {
            geometry,
            ..Default::default()
        }
    }

    /// Draw progress bars for the per-element loops
    pub fn show_progress(&mut self, show: bool) -> &mut Runner {
        self.show_progress = show;
        self
    }

    pub fn set_stress_state(&mut self, stress_state: StressState) -> &mut Runner {
        self.stress_state = stress_state;
        self
    }

    pub fn add_node(&mut self, x: f64, y: f64) -> NodeId {
        self.geometry.add_node(x, y)
    }

    pub fn add_element(&mut self, nodes: &[NodeId]) -> Result<ElementId> {
        self.geometry.add_element(nodes)
    }

    pub fn set_material_for_all(&mut self, material: Arc<dyn Material>) {
        self.geometry.set_material_for_all(material)
    }

    pub fn constrain(&mut self, node: NodeId, x: bool, y: bool) {
        self.geometry.constrain(node, x, y)
    }

    pub fn apply_load(&mut self, node: NodeId, fx: f64, fy: f64) {
        self.geometry.apply_load(node, fx, fy)
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if self.show_progress {
            ProgressBar::new(len as u64)
        } else {
            ProgressBar::hidden()
        }
    }

    /// Runs the full analysis
    ///
    /// # Arguments
    /// * `stiffness_order` - Integration used for element stiffness
    /// * `stress_order` - Integration used for stress and strain recovery
    ///
    /// # Returns
    /// The displacement of every node, laid out `[u0x, u0y, u1x, u1y, ...]`
    pub fn run_analysis(
        &mut self,
        stiffness_order: IntegrationOrder,
        stress_order: IntegrationOrder,
    ) -> Result<DVector<f64>> {
        self.global_stiffness_matrix = None;
        self.global_force_vector = None;
        self.global_displacement_vector = None;
        self.geometry.reset_results();
        self.geometry.set_stress_state_for_all(self.stress_state);

        info!(
            "running analysis on {} nodes and {} elements",
            self.geometry.nodes.len(),
            self.geometry.elements.len()
        );

        self.geometry.invalidate_free_dofs();
        self.geometry.assign_global_dof_indices();
        debug!("{} free degrees of freedom", self.geometry.count_free_dofs());

        let element_stiffness_matrices = self.compute_element_stiffness_matrices(stiffness_order)?;
        let global_stiffness_matrix = self.build_total_stiffness_matrix(&element_stiffness_matrices);
        let global_force_vector = self.geometry.assemble_global_forces();

        let displacements = solve(&global_stiffness_matrix, &global_force_vector)?;
        let global_displacement_vector = self.scatter_displacements(&displacements);

        self.compute_reactions(&element_stiffness_matrices, &global_displacement_vector);
        self.compute_stress_strain(&global_displacement_vector, stress_order)?;
        self.average_nodal_stress_strain();

        self.global_stiffness_matrix = Some(global_stiffness_matrix);
        self.global_force_vector = Some(global_force_vector);
        self.global_displacement_vector = Some(global_displacement_vector.clone());

        info!("analysis complete");
        Ok(global_displacement_vector)
    }

    fn compute_element_stiffness_matrices(
        &self,
        order: IntegrationOrder,
    ) -> Result<Vec<DMatrix<f64>>> {
        info!("building element stiffness matrices...");
        let bar = self.progress_bar(self.geometry.elements.len());

        let mut element_stiffness_matrices = Vec::with_capacity(self.geometry.elements.len());
        for element in &self.geometry.elements {
            element_stiffness_matrices.push(element.stiffness_matrix(&self.geometry.nodes, order)?);
            bar.inc(1);
        }
        bar.finish_and_clear();

        Ok(element_stiffness_matrices)
    }

    fn build_total_stiffness_matrix(&mut self, element_stiffness_matrices: &[DMatrix<f64>]) -> DMatrix<f64> {
        info!("building total stiffness matrix...");
        let size = self.geometry.count_free_dofs();
        let mut total_stiffness_matrix = DMatrix::zeros(size, size);

        let bar = self.progress_bar(element_stiffness_matrices.len());
        for (i, element_stiffness) in element_stiffness_matrices.iter().enumerate() {
            self.geometry
                .assemble_global_stiffness(&mut total_stiffness_matrix, element_stiffness, ElementId(i));
            bar.inc(1);
        }
        bar.finish_and_clear();

        total_stiffness_matrix
    }

    /// Writes the free-DOF solution onto the nodes and expands it into the
    /// full per-node vector. Constrained components stay at zero.
    fn scatter_displacements(&mut self, displacements: &DVector<f64>) -> DVector<f64> {
        let mut global_displacement_vector = DVector::zeros(DOF * self.geometry.nodes.len());
        for (i, node) in self.geometry.nodes.iter_mut().enumerate() {
            node.ux = node.global_index_x.map_or(0.0, |g| displacements[g]);
            node.uy = node.global_index_y.map_or(0.0, |g| displacements[g]);
            global_displacement_vector[DOF * i] = node.ux;
            global_displacement_vector[DOF * i + 1] = node.uy;
        }
        global_displacement_vector
    }

    /// Sums `K_e u_e` per node and subtracts the applied load. Constrained
    /// components end up holding the support reaction.
    fn compute_reactions(
        &mut self,
        element_stiffness_matrices: &[DMatrix<f64>],
        global_displacement_vector: &DVector<f64>,
    ) {
        let mut nodal_forces: DVector<f64> = DVector::zeros(DOF * self.geometry.nodes.len());
        for (element, stiffness) in self.geometry.elements.iter().zip(element_stiffness_matrices) {
            let internal = stiffness * element.local_displacements(global_displacement_vector);
            for (local, node_id) in element.nodes().iter().enumerate() {
                nodal_forces[DOF * node_id.0] += internal[DOF * local];
                nodal_forces[DOF * node_id.0 + 1] += internal[DOF * local + 1];
            }
        }

        for (i, node) in self.geometry.nodes.iter_mut().enumerate() {
            let fx = if node.is_constrained_x() { 0.0 } else { node.load.fx };
            let fy = if node.is_constrained_y() { 0.0 } else { node.load.fy };
            node.reaction = Load {
                fx: nodal_forces[DOF * i] - fx,
                fy: nodal_forces[DOF * i + 1] - fy,
            };
        }
    }

    fn compute_stress_strain(
        &mut self,
        global_displacement_vector: &DVector<f64>,
        order: IntegrationOrder,
    ) -> Result<()> {
        info!("recovering stress and strain...");
        let bar = self.progress_bar(self.geometry.elements.len());

        let Geometry { nodes, elements, .. } = &mut self.geometry;
        for element in elements.iter_mut() {
            element.stress_strain_at_gauss_points(nodes, global_displacement_vector, order)?;
            element.extrapolate_to_nodes(nodes, order)?;
            bar.inc(1);
        }
        bar.finish_and_clear();

        Ok(())
    }

    fn average_nodal_stress_strain(&mut self) {
        for node in &mut self.geometry.nodes {
            node.average_contributions();
            if node.stress_avg.is_none() {
                warn!("node {} belongs to no element and has no stress", node.id);
            }
        }
    }

    pub fn global_stiffness_matrix(&self) -> Option<&DMatrix<f64>> {
        self.global_stiffness_matrix.as_ref()
    }

    pub fn global_force_vector(&self) -> Option<&DVector<f64>> {
        self.global_force_vector.as_ref()
    }

    pub fn global_displacement_vector(&self) -> Option<&DVector<f64>> {
        self.global_displacement_vector.as_ref()
    }

    /// Displacement (ux, uy) of a node after the latest run
    pub fn displacement(&self, node: NodeId) -> (f64, f64) {
        let node = self.geometry.node(node);
        (node.ux, node.uy)
    }

    pub fn stress_avg(&self, node: NodeId) -> Option<Vector3<f64>> {
        self.geometry.node(node).stress_avg
    }

    pub fn strain_avg(&self, node: NodeId) -> Option<Vector3<f64>> {
        self.geometry.node(node).strain_avg
    }

    pub fn reaction(&self, node: NodeId) -> Load {
        self.geometry.node(node).reaction
    }
}

/// Solves `K u = f` with a dense Cholesky factorization.
///
/// # Arguments
/// * `a` - A square, symmetric stiffness matrix
/// * `b` - The force vector
///
/// # Returns
/// `u`, or a singular-system error when `a` is not positive definite
pub fn solve(a: &DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
    if a.nrows() == 0 {
        warn!("model has no free degrees of freedom");
        return Ok(DVector::zeros(0));
    }

    info!("solving {} equations...", a.nrows());
    let start = std::time::Instant::now();

    let cholesky = Cholesky::new(a.clone()).ok_or_else(|| {
        QuadfemError::SingularSystem(
            "stiffness matrix is not positive definite, the model is under-constrained".to_owned(),
        )
    })?;

    let diagonal_max = a.diagonal().amax();
    let pivot_min = cholesky
        .l_dirty()
        .diagonal()
        .iter()
        .map(|l| l * l)
        .fold(f64::INFINITY, f64::min);
    if pivot_min <= SINGULAR_PIVOT_TOLERANCE * diagonal_max {
        return Err(QuadfemError::SingularSystem(format!(
            "smallest pivot {pivot_min:e} against diagonal {diagonal_max:e}, the model is under-constrained"
        )));
    }

    let solution = cholesky.solve(b);

    let elapsed = start.elapsed().as_secs_f32();
    debug!("solved system in {:.3} seconds", elapsed);

    Ok(solution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::LinearElastic;
    use approx::assert_relative_eq;

    fn unit_square_runner() -> (Runner, Vec<NodeId>) {
        let mut runner = Runner::new();
        let n: Vec<NodeId> = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]
            .iter()
            .map(|(x, y)| runner.add_node(*x, *y))
            .collect();
        runner.add_element(&n).unwrap();
        runner.set_material_for_all(Arc::new(LinearElastic::new(1000.0, 0.3).unwrap()));
        (runner, n)
    }

    #[test]
    fn solve_symmetric_positive_definite() {
        let a = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let b = DVector::from_vec(vec![1.0, 2.0]);
        let x = solve(&a, &b).unwrap();
        assert_relative_eq!(&a * x, b, epsilon = 1e-14);
    }

    #[test]
    fn solve_rejects_singular_matrix() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let b = DVector::from_vec(vec![1.0, 1.0]);
        assert!(matches!(solve(&a, &b), Err(QuadfemError::SingularSystem(_))));
    }

    #[test]
    fn unconstrained_model_is_singular() {
        let (mut runner, n) = unit_square_runner();
        runner.apply_load(n[1], 1.0, 0.0);
        assert!(matches!(
            runner.run_analysis(IntegrationOrder::Full, IntegrationOrder::Full),
            Err(QuadfemError::SingularSystem(_))
        ));
    }

    #[test]
    fn reactions_balance_applied_loads() {
        let (mut runner, n) = unit_square_runner();
        runner.constrain(n[0], true, true);
        runner.constrain(n[3], true, true);
        runner.apply_load(n[1], 1.0, -0.5);
        runner.apply_load(n[2], 1.0, 0.0);
        runner
            .run_analysis(IntegrationOrder::Full, IntegrationOrder::Full)
            .unwrap();

        let rx: f64 = n.iter().map(|id| runner.reaction(*id).fx).sum();
        let ry: f64 = n.iter().map(|id| runner.reaction(*id).fy).sum();
        assert_relative_eq!(rx, -2.0, epsilon = 1e-10);
        assert_relative_eq!(ry, 0.5, epsilon = 1e-10);

        // Free components are in equilibrium
        assert_relative_eq!(runner.reaction(n[1]).fx, 0.0, epsilon = 1e-10);
        assert_relative_eq!(runner.reaction(n[2]).fy, 0.0, epsilon = 1e-10);
    }

    #[test]
    fn rerun_does_not_accumulate_contributions() {
        let (mut runner, n) = unit_square_runner();
        runner.constrain(n[0], true, true);
        runner.constrain(n[3], true, true);
        runner.apply_load(n[1], 1.0, 0.0);
        runner.apply_load(n[2], 1.0, 0.0);

        let first = runner
            .run_analysis(IntegrationOrder::Full, IntegrationOrder::Full)
            .unwrap();
        let first_stress = runner.stress_avg(n[1]).unwrap();
        let second = runner
            .run_analysis(IntegrationOrder::Full, IntegrationOrder::Full)
            .unwrap();

        assert_relative_eq!(first, second);
        assert_relative_eq!(runner.stress_avg(n[1]).unwrap(), first_stress);
        assert_eq!(runner.geometry.node(n[1]).stress_contributions.len(), 1);
    }

    #[test]
    fn reduced_recovery_gives_every_node_the_centroid_value() {
        let (mut runner, n) = unit_square_runner();
        runner.constrain(n[0], true, true);
        runner.constrain(n[3], true, true);
        runner.apply_load(n[1], 0.0, -1.0);
        runner
            .run_analysis(IntegrationOrder::Full, IntegrationOrder::Reduced)
            .unwrap();

        let reference = runner.stress_avg(n[0]).unwrap();
        for id in &n[1..] {
            assert_relative_eq!(runner.stress_avg(*id).unwrap(), reference, epsilon = 1e-12);
        }
    }

    #[test]
    fn constraint_change_between_runs_renumbers() {
        let (mut runner, n) = unit_square_runner();
        runner.constrain(n[0], true, true);
        runner.constrain(n[3], true, true);
        runner.apply_load(n[1], 1.0, 0.0);
        runner
            .run_analysis(IntegrationOrder::Full, IntegrationOrder::Full)
            .unwrap();
        assert_eq!(runner.global_force_vector().unwrap().len(), 4);

        runner.constrain(n[2], false, true);
        runner
            .run_analysis(IntegrationOrder::Full, IntegrationOrder::Full)
            .unwrap();
        assert_eq!(runner.global_force_vector().unwrap().len(), 3);
        assert_eq!(runner.displacement(n[2]).1, 0.0);
    }
}
