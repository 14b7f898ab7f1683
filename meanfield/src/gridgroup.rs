//! Density functionals evaluated on a molecular integration grid.

use crate::cache::Cache;
use crate::grid::MolecularGrid;
use crate::observable::{spin_deltas, spin_dms, Observable, Restriction};
use basis::OrbitalBasis;
use color_eyre::eyre::{eyre, Result};
use nalgebra::{DMatrix, DVector, Vector3};
use rayon::prelude::*;
use std::sync::Arc;

/// Spin densities and their gradients at one grid point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityPoint {
    pub rho: [f64; 2],
    pub grad: [Vector3<f64>; 2],
}

/// Functional derivatives at one grid point: `v_σ = ∂e/∂ρ_σ` and
/// `g_σ = ∂e/∂∇ρ_σ`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PotentialPoint {
    pub v: [f64; 2],
    pub g: [Vector3<f64>; 2],
}

impl DensityPoint {
    pub fn new(rho: [f64; 2], grad: [Vector3<f64>; 2]) -> Self {
        Self { rho, grad }
    }

    pub fn total(&self) -> f64 {
        self.rho[0] + self.rho[1]
    }

    /// `self + t * delta`
    pub fn displaced(&self, delta: &DensityPoint, t: f64) -> Self {
        Self {
            rho: [self.rho[0] + t * delta.rho[0], self.rho[1] + t * delta.rho[1]],
            grad: [self.grad[0] + delta.grad[0] * t, self.grad[1] + delta.grad[1] * t],
        }
    }
}

impl PotentialPoint {
    pub fn zeros() -> Self {
        Self {
            v: [0.0; 2],
            g: [Vector3::zeros(); 2],
        }
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            v: [self.v[0] * factor, self.v[1] * factor],
            g: [self.g[0] * factor, self.g[1] * factor],
        }
    }

    pub fn add(&self, other: &PotentialPoint) -> Self {
        Self {
            v: [self.v[0] + other.v[0], self.v[1] + other.v[1]],
            g: [self.g[0] + other.g[0], self.g[1] + other.g[1]],
        }
    }
}

fn fd_step(x: f64) -> f64 {
    1e-5 * x.abs().max(1e-6)
}

/// Partial derivatives of an energy density by central differences. Near
/// zero density a forward difference keeps the density non-negative.
pub fn finite_difference_potential<F>(energy: F, point: &DensityPoint, needs_gradient: bool) -> PotentialPoint
where
    F: Fn(&DensityPoint) -> f64,
{
    let mut result = PotentialPoint::zeros();
    for spin in 0..2 {
        let rho = point.rho[spin];
        let h = fd_step(rho);
        let mut plus = *point;
        plus.rho[spin] = rho + h;
        if rho > h {
            let mut minus = *point;
            minus.rho[spin] = rho - h;
            result.v[spin] = (energy(&plus) - energy(&minus)) / (2.0 * h);
        } else {
            result.v[spin] = (energy(&plus) - energy(point)) / h;
        }

        if needs_gradient {
            for k in 0..3 {
                let gk = point.grad[spin][k];
                let h = fd_step(gk.abs().max(1e-3 * rho));
                let mut plus = *point;
                let mut minus = *point;
                plus.grad[spin][k] = gk + h;
                minus.grad[spin][k] = gk - h;
                result.g[spin][k] = (energy(&plus) - energy(&minus)) / (2.0 * h);
            }
        }
    }
    result
}

/// Directional derivative of the potential along `delta` by a central
/// difference, shrinking the step so that no spin density turns negative.
pub fn finite_difference_kernel<F>(potential: F, point: &DensityPoint, delta: &DensityPoint) -> PotentialPoint
where
    F: Fn(&DensityPoint) -> PotentialPoint,
{
    let size = delta.rho[0].abs() + delta.rho[1].abs();
    if size == 0.0 && delta.grad[0].norm() + delta.grad[1].norm() == 0.0 {
        return PotentialPoint::zeros();
    }
    let mut t = 1e-4 * point.total().max(1e-10) / size.max(1e-300);
    for spin in 0..2 {
        if delta.rho[spin] != 0.0 {
            t = t.min(0.5 * point.rho[spin] / delta.rho[spin].abs());
        }
    }
    if t <= 0.0 || !t.is_finite() {
        t = 1e-6;
    }
    let plus = potential(&point.displaced(delta, t));
    let minus = potential(&point.displaced(delta, -t));
    plus.add(&minus.scaled(-1.0)).scaled(0.5 / t)
}

/// A local or semilocal energy density `e(ρ_α, ρ_β, ∇ρ_α, ∇ρ_β)` per unit
/// volume.
pub trait GridObservable: Send + Sync {
    fn label(&self) -> &str;

    fn needs_gradient(&self) -> bool;

    fn energy_density(&self, point: &DensityPoint) -> f64;

    fn potential(&self, point: &DensityPoint) -> PotentialPoint {
        finite_difference_potential(|p| self.energy_density(p), point, self.needs_gradient())
    }

    /// Change of the potential along `delta`.
    fn kernel_dot(&self, point: &DensityPoint, delta: &DensityPoint) -> PotentialPoint {
        finite_difference_kernel(|p| self.potential(p), point, delta)
    }
}

/// Spin densities and gradients on all grid points.
struct GridDensity {
    rho: [DVector<f64>; 2],
    grad: Option<[[DVector<f64>; 3]; 2]>,
}

impl GridDensity {
    fn point(&self, i: usize) -> DensityPoint {
        let grad = match &self.grad {
            Some(g) => [
                Vector3::new(g[0][0][i], g[0][1][i], g[0][2][i]),
                Vector3::new(g[1][0][i], g[1][1][i], g[1][2][i]),
            ],
            None => [Vector3::zeros(); 2],
        };
        DensityPoint::new([self.rho[0][i], self.rho[1][i]], grad)
    }
}

/// `aᵀ diag(w) b`
fn weighted_product(a: &DMatrix<f64>, weights: &DVector<f64>, b: &DMatrix<f64>) -> DMatrix<f64> {
    let mut wb = b.clone();
    for (mut row, w) in wb.row_iter_mut().zip(weights.iter()) {
        row *= *w;
    }
    a.transpose() * wb
}

pub struct GridGroup {
    label: String,
    restriction: Restriction,
    grid: Arc<MolecularGrid>,
    values: DMatrix<f64>,
    gradients: Option<[DMatrix<f64>; 3]>,
    terms: Vec<Box<dyn GridObservable>>,
    density_cutoff: f64,
}

impl GridGroup {
    pub fn new(
        basis: &OrbitalBasis,
        grid: Arc<MolecularGrid>,
        terms: Vec<Box<dyn GridObservable>>,
        label: &str,
        restriction: Restriction,
    ) -> Result<Self> {
        if terms.is_empty() {
            return Err(eyre!("Grid group '{}' has no terms", label));
        }
        let values = basis.compute_grid_values(&grid.points);
        let gradients = if terms.iter().any(|t| t.needs_gradient()) {
            Some(basis.compute_grid_gradients(&grid.points))
        } else {
            None
        };
        Ok(Self {
            label: label.to_string(),
            restriction,
            grid,
            values,
            gradients,
            terms,
            density_cutoff: 1e-9,
        })
    }

    pub fn with_density_cutoff(mut self, cutoff: f64) -> Self {
        self.density_cutoff = cutoff;
        self
    }

    pub fn terms(&self) -> &[Box<dyn GridObservable>] {
        &self.terms
    }

    fn density_of(&self, dm: &DMatrix<f64>) -> (DVector<f64>, Option<[DVector<f64>; 3]>) {
        let sym = (dm + dm.transpose()) * 0.5;
        let tmp = &self.values * sym;
        let rho = tmp.component_mul(&self.values).column_sum();
        let grad = self
            .gradients
            .as_ref()
            .map(|g| [0, 1, 2].map(|k| tmp.component_mul(&g[k]).column_sum() * 2.0));
        (rho, grad)
    }

    fn spin_density(&self, dms: &[&DMatrix<f64>]) -> GridDensity {
        let (rho_a, grad_a) = self.density_of(dms[0]);
        let (rho_b, grad_b) = if dms.len() == 2 {
            self.density_of(dms[1])
        } else {
            (rho_a.clone(), grad_a.clone())
        };
        let grad = match (grad_a, grad_b) {
            (Some(a), Some(b)) => Some([a, b]),
            _ => None,
        };
        GridDensity {
            rho: [rho_a, rho_b],
            grad,
        }
    }

    fn cache_key(&self, what: &str) -> String {
        format!("{}_{}", self.label, what)
    }

    /// Loads the spin densities from the cache, computing them on first use.
    fn density(&self, cache: &mut Cache) -> Result<GridDensity> {
        let spins = ["alpha", "beta"];
        let rho_key = |s: &str| self.cache_key(&format!("rho_{}", s));
        let grad_key = |s: &str, k: usize| self.cache_key(&format!("grad_rho_{}_{}", s, k));

        if !cache.contains(&rho_key("alpha")) {
            let density = {
                let dms = spin_dms(cache, self.restriction)?;
                self.spin_density(&dms)
            };
            for (s, spin) in spins.iter().enumerate() {
                cache.insert_array(&rho_key(spin), density.rho[s].clone(), "");
                if let Some(grad) = &density.grad {
                    for k in 0..3 {
                        cache.insert_array(&grad_key(spin, k), grad[s][k].clone(), "");
                    }
                }
            }
            return Ok(density);
        }

        let rho = [cache.array(&rho_key("alpha"))?.clone(), cache.array(&rho_key("beta"))?.clone()];
        let grad = if self.gradients.is_some() {
            let load = |spin: &str| -> Result<[DVector<f64>; 3]> {
                Ok([
                    cache.array(&grad_key(spin, 0))?.clone(),
                    cache.array(&grad_key(spin, 1))?.clone(),
                    cache.array(&grad_key(spin, 2))?.clone(),
                ])
            };
            Some([load("alpha")?, load("beta")?])
        } else {
            None
        };
        Ok(GridDensity { rho, grad })
    }

    /// Builds `Σ_p w_p [v φμφν + g·∇(φμφν)]` for one spin.
    fn potential_matrix(&self, v: &DVector<f64>, g: &[DVector<f64>; 3]) -> DMatrix<f64> {
        let weights = &self.grid.weights;
        let mut result = weighted_product(&self.values, &v.component_mul(weights), &self.values);
        if let Some(grads) = &self.gradients {
            for k in 0..3 {
                let wg = g[k].component_mul(weights);
                let half = weighted_product(&grads[k], &wg, &self.values);
                result += &half + half.transpose();
            }
        }
        result
    }

    /// Evaluates `f` on every point above the density cutoff and assembles
    /// per-spin potential vectors.
    fn collect_potentials<F>(&self, density: &GridDensity, f: F) -> [(DVector<f64>, [DVector<f64>; 3]); 2]
    where
        F: Fn(usize, &DensityPoint) -> PotentialPoint + Sync,
    {
        let npoint = self.grid.size();
        let pots: Vec<PotentialPoint> = (0..npoint)
            .into_par_iter()
            .map(|i| {
                let point = density.point(i);
                if point.total() < self.density_cutoff {
                    PotentialPoint::zeros()
                } else {
                    f(i, &point)
                }
            })
            .collect();
        [0, 1].map(|s| {
            let v = DVector::from_fn(npoint, |i, _| pots[i].v[s]);
            let g = [0, 1, 2].map(|k| DVector::from_fn(npoint, |i, _| pots[i].g[s][k]));
            (v, g)
        })
    }

    fn add_matrices(&self, pots: &[(DVector<f64>, [DVector<f64>; 3]); 2], outputs: &mut [DMatrix<f64>], scale: f64) {
        for (spin, output) in outputs.iter_mut().enumerate() {
            let (v, g) = &pots[spin];
            *output += self.potential_matrix(v, g) * scale;
        }
    }
}

impl Observable for GridGroup {
    fn label(&self) -> &str {
        &self.label
    }

    fn restriction(&self) -> Restriction {
        self.restriction
    }

    fn compute_energy(&self, cache: &mut Cache) -> Result<f64> {
        let density = self.density(cache)?;
        let weights = &self.grid.weights;
        let energy = (0..self.grid.size())
            .into_par_iter()
            .map(|i| {
                let point = density.point(i);
                if point.total() < self.density_cutoff {
                    return 0.0;
                }
                weights[i] * self.terms.iter().map(|t| t.energy_density(&point)).sum::<f64>()
            })
            .sum::<f64>();
        Ok(energy)
    }

    fn add_fock(&self, cache: &mut Cache, focks: &mut [DMatrix<f64>]) -> Result<()> {
        if focks.len() != self.restriction.ndm() {
            return Err(eyre!("Grid group '{}' expects {} Fock matrices", self.label, self.restriction.ndm()));
        }
        let density = self.density(cache)?;
        let pots = self.collect_potentials(&density, |_, point| {
            self.terms
                .iter()
                .fold(PotentialPoint::zeros(), |acc, t| acc.add(&t.potential(point)))
        });
        self.add_matrices(&pots, focks, 1.0);
        Ok(())
    }

    fn add_dot_hessian(&self, cache: &mut Cache, outputs: &mut [DMatrix<f64>]) -> Result<()> {
        if outputs.len() != self.restriction.ndm() {
            return Err(eyre!("Grid group '{}' expects {} output matrices", self.label, self.restriction.ndm()));
        }
        let density = self.density(cache)?;
        let delta = {
            let deltas = spin_deltas(cache, self.restriction)?;
            self.spin_density(&deltas)
        };
        let pots = self.collect_potentials(&density, |i, point| {
            let dpoint = delta.point(i);
            self.terms
                .iter()
                .fold(PotentialPoint::zeros(), |acc, t| acc.add(&t.kernel_dot(point, &dpoint)))
        });
        self.add_matrices(&pots, outputs, 1.0 / self.restriction.deriv_scale());
        Ok(())
    }
}
