use std::fmt::Debug;

use nalgebra::{matrix, SMatrix};

use crate::error::{QuadfemError, Result};

/// 2D idealization used when building the elastic matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StressState {
    #[default]
    PlaneStress,
    PlaneStrain,
}

impl StressState {
    pub fn is_plane_stress(&self) -> bool {
        matches!(self, StressState::PlaneStress)
    }
}

/// Constitutive behaviour shared by every element assigned the material
pub trait Material: Debug + Send + Sync {
    /// Symmetric 3x3 matrix mapping (εxx, εyy, γxy) to (σxx, σyy, τxy)
    fn elastic_matrix(&self, plane_stress: bool) -> Result<SMatrix<f64, 3, 3>>;

    /// Through-thickness integration length, if the material carries one.
    /// Plane elements cannot use a material without it.
    fn thickness(&self) -> Option<f64> {
        None
    }

    fn name(&self) -> &'static str;
}

/// Isotropic linear elastic material
#[derive(Debug, Clone, PartialEq)]
pub struct LinearElastic {
    pub youngs_modulus: f64,
    pub poisson_ratio: f64,
    pub part_thickness: f64,
}

impl LinearElastic {
    /// Creates a material with unit thickness
    ///
    /// # Arguments
    /// * `youngs_modulus` - The modulus of elasticity, must be positive
    /// * `poisson_ratio` - The poisson ratio
    pub fn new(youngs_modulus: f64, poisson_ratio: f64) -> Result<LinearElastic> {
        if !(youngs_modulus > 0.0) {
            return Err(QuadfemError::InvalidMaterial(format!(
                "young's modulus must be positive, got {youngs_modulus}"
            )));
        }
        if !poisson_ratio.is_finite() {
            return Err(QuadfemError::InvalidMaterial(format!(
                "poisson ratio must be finite, got {poisson_ratio}"
            )));
        }
        Ok(LinearElastic {
            youngs_modulus,
            poisson_ratio,
            part_thickness: 1.0,
        })
    }

    pub fn with_thickness(mut self, part_thickness: f64) -> Result<LinearElastic> {
        if !(part_thickness > 0.0) {
            return Err(QuadfemError::InvalidMaterial(format!(
                "part thickness must be positive, got {part_thickness}"
            )));
        }
        self.part_thickness = part_thickness;
        Ok(self)
    }

    fn plane_stress_matrix(&self) -> Result<SMatrix<f64, 3, 3>> {
        let nu = self.poisson_ratio;
        let denominator = 1.0 - f64::powi(nu, 2);
        if denominator.abs() < f64::EPSILON {
            return Err(QuadfemError::InvalidMaterial(format!(
                "poisson ratio {nu} makes the plane stress matrix singular"
            )));
        }

        let mut stress_strain_mat: SMatrix<f64, 3, 3> = matrix![
            1.0, nu, 0.0;
            nu, 1.0, 0.0;
            0.0, 0.0, (1.0 - nu) / 2.0;
        ];
        stress_strain_mat *= self.youngs_modulus / denominator;

        Ok(stress_strain_mat)
    }

    fn plane_strain_matrix(&self) -> Result<SMatrix<f64, 3, 3>> {
        let nu = self.poisson_ratio;
        let denominator = (1.0 + nu) * (1.0 - 2.0 * nu);
        if denominator.abs() < f64::EPSILON {
            return Err(QuadfemError::InvalidMaterial(format!(
                "poisson ratio {nu} makes the plane strain matrix singular"
            )));
        }

        let mut stress_strain_mat: SMatrix<f64, 3, 3> = matrix![
            1.0 - nu, nu, 0.0;
            nu, 1.0 - nu, 0.0;
            0.0, 0.0, (1.0 - 2.0 * nu) / 2.0;
        ];
        stress_strain_mat *= self.youngs_modulus / denominator;

        Ok(stress_strain_mat)
    }
}

impl Material for LinearElastic {
    fn elastic_matrix(&self, plane_stress: bool) -> Result<SMatrix<f64, 3, 3>> {
        if plane_stress {
            self.plane_stress_matrix()
        } else {
            self.plane_strain_matrix()
        }
    }

    fn thickness(&self) -> Option<f64> {
        Some(self.part_thickness)
    }

    fn name(&self) -> &'static str {
        "Linear Elastic Material"
    }
}
