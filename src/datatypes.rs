use std::fmt::Display;
use std::str::FromStr;

use nalgebra::Vector3;

use crate::error::QuadfemError;
use crate::material::StressState;

/// Position of a node in the plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
}

/// Handle to a node in the geometry arena. Assigned in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

/// Handle to an element in the geometry arena. Assigned in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementId(pub usize);

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Displacement constraints on the two components of a node
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Constraint {
    pub x: bool,
    pub y: bool,
}

/// Applied nodal load
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Load {
    pub fx: f64,
    pub fy: f64,
}

/// A field value reported to a node by one adjacent element
pub type Contribution = (ElementId, Vector3<f64>);

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub vertex: Vertex,
    pub constraint: Constraint,
    pub load: Load,
    /// Free-DOF index of the x component; `None` while constrained
    pub global_index_x: Option<usize>,
    /// Free-DOF index of the y component; `None` while constrained
    pub global_index_y: Option<usize>,
    pub ux: f64,
    pub uy: f64,
    /// Resultant nodal force minus applied load, valid after a solve
    pub reaction: Load,
    pub stress_contributions: Vec<Contribution>,
    pub strain_contributions: Vec<Contribution>,
    pub stress_avg: Option<Vector3<f64>>,
    pub strain_avg: Option<Vector3<f64>>,
}

impl Node {
    pub fn new(id: NodeId, x: f64, y: f64) -> Node {
        Node {
            id,
            vertex: Vertex { x, y },
            constraint: Constraint::default(),
            load: Load::default(),
            global_index_x: None,
            global_index_y: None,
            ux: 0.0,
            uy: 0.0,
            reaction: Load::default(),
            stress_contributions: Vec::new(),
            strain_contributions: Vec::new(),
            stress_avg: None,
            strain_avg: None,
        }
    }

    pub fn is_constrained_x(&self) -> bool {
        self.constraint.x
    }

    pub fn is_constrained_y(&self) -> bool {
        self.constraint.y
    }

    /// Clears everything a previous analysis run wrote onto the node
    pub fn reset_results(&mut self) {
        self.global_index_x = None;
        self.global_index_y = None;
        self.ux = 0.0;
        self.uy = 0.0;
        self.reaction = Load::default();
        self.stress_contributions.clear();
        self.strain_contributions.clear();
        self.stress_avg = None;
        self.strain_avg = None;
    }

    /// Reduces the per-element contributions into arithmetic means.
    ///
    /// A node no element reported to keeps `None` averages.
    pub fn average_contributions(&mut self) {
        self.stress_avg = mean(&self.stress_contributions);
        self.strain_avg = mean(&self.strain_contributions);
    }
}

fn mean(contributions: &[Contribution]) -> Option<Vector3<f64>> {
    if contributions.is_empty() {
        return None;
    }
    let sum: Vector3<f64> = contributions.iter().map(|(_, v)| v).sum();
    Some(sum / contributions.len() as f64)
}

/// Integration scheme requested for stiffness or stress recovery. Each
/// element formulation maps it onto a number of Gauss points per direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrationOrder {
    #[default]
    Full,
    Reduced,
}

impl FromStr for IntegrationOrder {
    type Err = QuadfemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "full" => Ok(IntegrationOrder::Full),
            "reduced" => Ok(IntegrationOrder::Reduced),
            other => Err(QuadfemError::Input(format!(
                "integration type must be either \"full\" or \"reduced\", got \"{other}\""
            ))),
        }
    }
}

/// Material and analysis settings read from a problem definition
#[derive(Debug, Clone)]
pub struct ModelMetadata {
    pub youngs_modulus: f64,
    pub poisson_ratio: f64,
    pub part_thickness: f64,
    pub stress_state: StressState,
    pub stiffness_integration: IntegrationOrder,
    pub stress_integration: IntegrationOrder,
}

/// Axis-aligned position filter. Bounds are exclusive.
#[derive(Debug, Clone, Copy)]
pub struct BoundaryRegion {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl BoundaryRegion {
    pub fn contains(&self, vertex: &Vertex) -> bool {
        vertex.x > self.x_min
            && vertex.x < self.x_max
            && vertex.y > self.y_min
            && vertex.y < self.y_max
    }
}

impl Default for BoundaryRegion {
    fn default() -> Self {
        BoundaryRegion {
            x_min: f64::MIN,
            x_max: f64::MAX,
            y_min: f64::MIN,
            y_max: f64::MAX,
        }
    }
}

/// What a boundary rule does to the nodes it selects. Unset fields leave
/// the node untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundaryTarget {
    pub constrain_x: Option<bool>,
    pub constrain_y: Option<bool>,
    pub fx: Option<f64>,
    pub fy: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct BoundaryRule {
    pub name: String,
    pub region: BoundaryRegion,
    pub target: BoundaryTarget,
}
