use thiserror::Error;

use crate::datatypes::ElementId;

pub type Result<T> = std::result::Result<T, QuadfemError>;

#[derive(Error, Debug)]
pub enum QuadfemError {
    /// Gauss rule or integration order outside the supported set
    #[error("unsupported integration order: {0}")]
    UnsupportedOrder(usize),

    /// Element constructed from a node count with no matching formulation
    #[error("unsupported element with {0} nodes, expected 4 or 8")]
    UnsupportedElement(usize),

    #[error("{kind} can only have {max} nodes")]
    ElementFull { kind: &'static str, max: usize },

    #[error("element {0} has no material assigned")]
    MissingMaterial(ElementId),

    #[error("material mismatch: {0}")]
    MaterialMismatch(String),

    #[error("invalid material: {0}")]
    InvalidMaterial(String),

    /// Extrapolation requested without matching Gauss point values
    #[error("element {0} has no gauss point values for the requested order")]
    MissingGaussValues(ElementId),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Jacobian determinant at or below zero at some integration point
    #[error("degenerate element {element}: jacobian determinant {det:e}")]
    DegenerateElement { element: ElementId, det: f64 },

    /// Global stiffness matrix is singular or indefinite (rigid-body modes)
    #[error("singular system: {0}")]
    SingularSystem(String),

    #[error("Input error: {0}")]
    Input(String),

    #[error("Mesher error: {0}")]
    Mesher(String),

    #[error("Post Processor error: {0}")]
    PostProcessor(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
