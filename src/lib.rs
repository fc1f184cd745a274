//! Two-dimensional linear static finite element analysis on bilinear and
//! quadratic quadrilaterals.

pub mod datatypes;
pub mod element;
pub mod error;
pub mod geometry;
pub mod material;
pub mod mesher;
pub mod post_processor;
pub mod quadrature;
pub mod solver;

pub use datatypes::{ElementId, IntegrationOrder, ModelMetadata, NodeId};
pub use error::{QuadfemError, Result};
pub use geometry::Geometry;
pub use material::{LinearElastic, Material, StressState};
pub use solver::Runner;
