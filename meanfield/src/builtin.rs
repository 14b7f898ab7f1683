//! Functionals implemented directly, without the xc library.

use crate::gridgroup::{DensityPoint, GridObservable, PotentialPoint};
use nalgebra::Vector3;
use std::f64::consts::PI;

/// Slater (Dirac) exchange for spin-resolved densities:
/// `e = -c 2^{1/3} Σ_σ ρ_σ^{4/3}`.
#[derive(Debug, Clone)]
pub struct DiracExchange {
    label: String,
    coeff: f64,
    derived_coeff: f64,
}

impl Default for DiracExchange {
    fn default() -> Self {
        Self::new("x_dirac", 0.75 * (3.0 / PI).powf(1.0 / 3.0))
    }
}

impl DiracExchange {
    pub fn new(label: &str, coeff: f64) -> Self {
        Self {
            label: label.to_string(),
            coeff,
            derived_coeff: -coeff * 2f64.powf(1.0 / 3.0),
        }
    }

    pub fn coeff(&self) -> f64 {
        self.coeff
    }
}

impl GridObservable for DiracExchange {
    fn label(&self) -> &str {
        &self.label
    }

    fn needs_gradient(&self) -> bool {
        false
    }

    fn energy_density(&self, point: &DensityPoint) -> f64 {
        point
            .rho
            .iter()
            .map(|&rho| self.derived_coeff * rho.max(0.0).powf(4.0 / 3.0))
            .sum()
    }

    fn potential(&self, point: &DensityPoint) -> PotentialPoint {
        let v = point.rho.map(|rho| 4.0 / 3.0 * self.derived_coeff * rho.max(0.0).cbrt());
        PotentialPoint {
            v,
            g: [Vector3::zeros(); 2],
        }
    }

    fn kernel_dot(&self, point: &DensityPoint, delta: &DensityPoint) -> PotentialPoint {
        let mut v = [0.0; 2];
        for spin in 0..2 {
            let rho = point.rho[spin];
            if rho > 0.0 {
                v[spin] = 4.0 / 9.0 * self.derived_coeff * rho.powf(-2.0 / 3.0) * delta.rho[spin];
            }
        }
        PotentialPoint {
            v,
            g: [Vector3::zeros(); 2],
        }
    }
}
