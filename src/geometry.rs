use std::sync::Arc;

use nalgebra::{DMatrix, DVector};

use crate::datatypes::{Constraint, ElementId, Load, Node, NodeId};
use crate::element::{Element, ElementKind};
use crate::error::Result;
use crate::material::{Material, StressState};

/// Owns every node and element of a model.
///
/// Elements refer to nodes by [`NodeId`], an index into the node arena, so
/// handing out handles never aliases the nodes themselves.
#[derive(Debug, Default, Clone)]
pub struct Geometry {
    pub nodes: Vec<Node>,
    pub elements: Vec<Element>,
    global_free_dofs: Option<usize>,
}

impl Geometry {
    pub fn new() -> Geometry {
        Geometry::default()
    }

    /// Adds a node at (x, y)
    ///
    /// # Returns
    /// The handle of the new node, its position in creation order
    pub fn add_node(&mut self, x: f64, y: f64) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(id, x, y));
        self.global_free_dofs = None;
        id
    }

    /// Adds an element over existing nodes. The variant follows the node
    /// count: 4 is bilinear, 8 is quadratic.
    ///
    /// # Arguments
    /// * `nodes` - Node handles in corner-then-midside counter-clockwise order
    pub fn add_element(&mut self, nodes: &[NodeId]) -> Result<ElementId> {
        let kind = ElementKind::from_node_count(nodes.len())?;
        let id = ElementId(self.elements.len());

        let mut element = Element::new(id, kind);
        for node in nodes {
            assert!(
                node.0 < self.nodes.len(),
                "node {node} does not belong to this geometry"
            );
            element.add_node(*node)?;
        }
        self.elements.push(element);

        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn element(&self, id: ElementId) -> &Element {
        &self.elements[id.0]
    }

    /// Assigns one shared material to every element
    pub fn set_material_for_all(&mut self, material: Arc<dyn Material>) {
        for element in &mut self.elements {
            element.set_material(Arc::clone(&material));
        }
    }

    pub fn set_stress_state_for_all(&mut self, stress_state: StressState) {
        for element in &mut self.elements {
            element.set_stress_state(stress_state);
        }
    }

    /// Sets the constraint flags of a node and drops the cached free-DOF count
    pub fn constrain(&mut self, node: NodeId, x: bool, y: bool) {
        self.nodes[node.0].constraint = Constraint { x, y };
        self.invalidate_free_dofs();
    }

    pub fn apply_load(&mut self, node: NodeId, fx: f64, fy: f64) {
        self.nodes[node.0].load = Load { fx, fy };
    }

    pub fn invalidate_free_dofs(&mut self) {
        self.global_free_dofs = None;
    }

    /// Number of unconstrained displacement components, cached after the
    /// first call until constraints change
    pub fn count_free_dofs(&mut self) -> usize {
        if let Some(count) = self.global_free_dofs {
            return count;
        }

        let count = self
            .nodes
            .iter()
            .map(|node| usize::from(!node.is_constrained_x()) + usize::from(!node.is_constrained_y()))
            .sum();
        self.global_free_dofs = Some(count);

        count
    }

    /// Numbers free DOFs in node creation order, x before y. Constrained
    /// components get `None`.
    pub fn assign_global_dof_indices(&mut self) {
        let mut global_index_count = 0;
        for node in &mut self.nodes {
            node.global_index_x = None;
            node.global_index_y = None;
            if !node.is_constrained_x() {
                node.global_index_x = Some(global_index_count);
                global_index_count += 1;
            }
            if !node.is_constrained_y() {
                node.global_index_y = Some(global_index_count);
                global_index_count += 1;
            }
        }
        self.global_free_dofs = Some(global_index_count);
    }

    /// Builds the free-DOF force vector from the applied nodal loads
    pub fn assemble_global_forces(&mut self) -> DVector<f64> {
        let mut forces = DVector::zeros(self.count_free_dofs());
        for node in &self.nodes {
            if let Some(g) = node.global_index_x {
                forces[g] = node.load.fx;
            }
            if let Some(g) = node.global_index_y {
                forces[g] = node.load.fy;
            }
        }
        forces
    }

    /// Scatter-adds an element stiffness matrix into the global matrix,
    /// skipping constrained rows and columns
    ///
    /// # Arguments
    /// * `global_stiffness` - Free-DOF square matrix, accumulated in place
    /// * `element_stiffness` - The element's 2k x 2k matrix
    /// * `element` - The element that produced `element_stiffness`
    pub fn assemble_global_stiffness(
        &self,
        global_stiffness: &mut DMatrix<f64>,
        element_stiffness: &DMatrix<f64>,
        element: ElementId,
    ) {
        let steering = self.elements[element.0].steering_vector(&self.nodes);
        let size = global_stiffness.nrows();

        for (i, gi) in steering.iter().enumerate() {
            let Some(gi) = gi else { continue };
            assert!(*gi < size, "steering index {gi} outside {size} free dofs");
            for (j, gj) in steering.iter().enumerate() {
                let Some(gj) = gj else { continue };
                assert!(*gj < size, "steering index {gj} outside {size} free dofs");
                global_stiffness[(*gi, *gj)] += element_stiffness[(i, j)];
            }
        }
    }

    /// Clears results a previous analysis left on the nodes
    pub fn reset_results(&mut self) {
        for node in &mut self.nodes {
            node.reset_results();
        }
    }
}
