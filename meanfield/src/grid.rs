//! Becke-partitioned molecular integration grid.
//!
//! Each atom carries a radial Gauss-Legendre grid mapped to `[0, ∞)` with
//! `r = r_m (1 + x) / (1 - x)`, times a product angular grid (Gauss-Legendre
//! in `cos θ`, uniform in `φ`). Overlapping atomic grids are weighted with
//! Becke's fuzzy cell functions.

use color_eyre::eyre::{eyre, Result};
use nalgebra::{DVector, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

pub(crate) const ANGSTROM: f64 = 1.889_726_124_565_062;

/// Bragg-Slater radii in Angstrom for H through Ar.
const BRAGG_SLATER: [f64; 18] = [
    0.25, 0.35, 1.45, 1.05, 0.85, 0.70, 0.65, 0.60, 0.50, 0.45, 1.80, 1.50, 1.25, 1.10, 1.00, 1.00, 1.00, 0.95,
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridParams {
    pub radial_points: usize,
    pub theta_points: usize,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            radial_points: 60,
            theta_points: 16,
        }
    }
}

/// Midpoint of the radial mapping: half the Bragg-Slater radius, except for
/// hydrogen which uses one bohr.
fn radial_midpoint(number: usize) -> f64 {
    match number {
        1 => 1.0,
        n if n >= 2 && n <= BRAGG_SLATER.len() => 0.5 * BRAGG_SLATER[n - 1] * ANGSTROM,
        _ => 0.75 * ANGSTROM,
    }
}

#[derive(Debug, Clone)]
pub struct MolecularGrid {
    pub points: Vec<Vector3<f64>>,
    pub weights: DVector<f64>,
}

impl MolecularGrid {
    pub fn new(coords: &[Vector3<f64>], numbers: &[usize], params: &GridParams) -> Result<Self> {
        if coords.len() != numbers.len() {
            return Err(eyre!(
                "Got {} coordinates but {} atomic numbers",
                coords.len(),
                numbers.len()
            ));
        }
        if coords.is_empty() {
            return Err(eyre!("Cannot build a grid without atoms"));
        }
        if params.radial_points < 2 || params.theta_points < 2 {
            return Err(eyre!(
                "Grid needs at least 2 radial and 2 theta points, got {} and {}",
                params.radial_points,
                params.theta_points
            ));
        }

        let (xs, wxs) = gauss_legendre(params.radial_points, -1.0, 1.0);
        let angular = product_angular_grid(params.theta_points);

        let shells: Vec<(usize, usize)> = (0..coords.len())
            .flat_map(|a| (0..xs.len()).map(move |i| (a, i)))
            .collect();
        let (points, weights): (Vec<Vector3<f64>>, Vec<f64>) = shells
            .par_iter()
            .flat_map_iter(|&(a, i)| {
                let rm = radial_midpoint(numbers[a]);
                let x = xs[i];
                let r = rm * (1.0 + x) / (1.0 - x);
                let dr = 2.0 * rm / ((1.0 - x) * (1.0 - x));
                let wr = wxs[i] * r * r * dr;
                let center = coords[a];
                angular.iter().filter_map(move |(dir, wang)| {
                    let p = center + dir * r;
                    let w = wr * wang * becke_weight_for_atom(a, &p, coords);
                    if w.is_finite() && w > 0.0 {
                        Some((p, w))
                    } else {
                        None
                    }
                })
            })
            .unzip();

        Ok(Self {
            points,
            weights: DVector::from_vec(weights),
        })
    }

    pub fn size(&self) -> usize {
        self.points.len()
    }

    /// `Σ_p w_p f_p` for values given on the grid points.
    pub fn integrate(&self, values: &DVector<f64>) -> f64 {
        self.weights.dot(values)
    }

    pub fn evaluate<F>(&self, f: F) -> DVector<f64>
    where
        F: Fn(&Vector3<f64>) -> f64 + Sync + Send,
    {
        DVector::from_vec(self.points.par_iter().map(f).collect())
    }
}

/// Directions and weights on the unit sphere; the weights sum to 4π.
fn product_angular_grid(ntheta: usize) -> Vec<(Vector3<f64>, f64)> {
    let (cos_thetas, wthetas) = gauss_legendre(ntheta, -1.0, 1.0);
    let nphi = 2 * ntheta;
    let wphi = 2.0 * PI / nphi as f64;
    let mut grid = Vec::with_capacity(ntheta * nphi);
    for (ct, wt) in cos_thetas.iter().zip(&wthetas) {
        let st = (1.0 - ct * ct).max(0.0).sqrt();
        for k in 0..nphi {
            let phi = (k as f64 + 0.5) * wphi;
            grid.push((Vector3::new(st * phi.cos(), st * phi.sin(), *ct), wt * wphi));
        }
    }
    grid
}

/// Becke partition weight of atom `a` at point `r`.
fn becke_weight_for_atom(a: usize, r: &Vector3<f64>, coords: &[Vector3<f64>]) -> f64 {
    let na = coords.len();
    if na == 1 {
        return 1.0;
    }
    let cells: Vec<f64> = (0..na)
        .map(|i| {
            (0..na)
                .filter(|&j| j != i)
                .map(|j| cell_function(i, j, r, coords))
                .product()
        })
        .collect();
    let total: f64 = cells.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return 0.0;
    }
    cells[a] / total
}

/// `s(μ_ij)` with Becke's smoothing polynomial applied three times.
fn cell_function(i: usize, j: usize, r: &Vector3<f64>, coords: &[Vector3<f64>]) -> f64 {
    let rij = (coords[i] - coords[j]).norm();
    if rij < 1e-12 {
        return 0.5;
    }
    let mut mu = ((r - coords[i]).norm() - (r - coords[j]).norm()) / rij;
    for _ in 0..3 {
        mu = 0.5 * (3.0 * mu - mu * mu * mu);
    }
    0.5 * (1.0 - mu)
}

/// Gauss-Legendre nodes (ascending) and weights on `[a, b]`.
pub(crate) fn gauss_legendre(n: usize, a: f64, b: f64) -> (Vec<f64>, Vec<f64>) {
    let mut x = vec![0.0; n];
    let mut w = vec![0.0; n];
    let nn = n as f64;
    let (xm, xl) = (0.5 * (b + a), 0.5 * (b - a));
    for i in 0..(n + 1) / 2 {
        let mut z = (PI * (i as f64 + 0.75) / (nn + 0.5)).cos();
        let mut pp = 1.0;
        for _ in 0..100 {
            let (p1, p2) = legendre_pn(n, z);
            pp = nn * (z * p1 - p2) / (z * z - 1.0);
            let dz = p1 / pp;
            z -= dz;
            if dz.abs() < 1e-15 {
                break;
            }
        }
        x[i] = xm - xl * z;
        x[n - 1 - i] = xm + xl * z;
        let wi = 2.0 * xl / ((1.0 - z * z) * pp * pp);
        w[i] = wi;
        w[n - 1 - i] = wi;
    }
    (x, w)
}

/// `(P_n(z), P_{n-1}(z))`
fn legendre_pn(n: usize, z: f64) -> (f64, f64) {
    let mut p1 = 1.0;
    let mut p2 = 0.0;
    for j in 1..=n {
        let p3 = p2;
        p2 = p1;
        p1 = ((2.0 * j as f64 - 1.0) * z * p2 - (j as f64 - 1.0) * p3) / j as f64;
    }
    (p1, p2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauss_legendre_exact_for_polynomials() {
        let (x, w) = gauss_legendre(5, 0.0, 2.0);
        assert!(x.windows(2).all(|p| p[0] < p[1]));
        let integral: f64 = x.iter().zip(&w).map(|(x, w)| w * x.powi(9)).sum();
        assert!((integral - 102.4).abs() < 1e-10, "{}", integral);
        let (_, w) = gauss_legendre(4, -1.0, 1.0);
        assert!((w.iter().sum::<f64>() - 2.0).abs() < 1e-14);
    }

    #[test]
    fn test_angular_grid() {
        let grid = product_angular_grid(6);
        let total: f64 = grid.iter().map(|(_, w)| w).sum();
        assert!((total - 4.0 * PI).abs() < 1e-12);
        let x2: f64 = grid.iter().map(|(d, w)| w * d.x * d.x).sum();
        assert!((x2 - 4.0 * PI / 3.0).abs() < 1e-12);
        let xy: f64 = grid.iter().map(|(d, w)| w * d.x * d.y).sum();
        assert!(xy.abs() < 1e-12);
    }

    #[test]
    fn test_single_atom_gaussians() {
        let center = Vector3::new(0.3, -0.2, 0.1);
        let grid = MolecularGrid::new(&[center], &[8], &GridParams::default()).unwrap();
        assert_eq!(grid.size(), 60 * 16 * 32);

        let values = grid.evaluate(|p| (-(p - center).norm_squared()).exp());
        assert!((grid.integrate(&values) - PI.powf(1.5)).abs() < 1e-6);

        let values = grid.evaluate(|p| {
            let d = p - center;
            d.x * d.x * (-d.norm_squared()).exp()
        });
        assert!((grid.integrate(&values) - 0.5 * PI.powf(1.5)).abs() < 1e-6);
    }

    #[test]
    fn test_evaluate_with_borrowed_state() {
        let centers = vec![Vector3::new(0.0, 0.0, -0.7), Vector3::new(0.0, 0.0, 0.7)];
        let grid = MolecularGrid::new(&centers, &[1, 1], &GridParams::default()).unwrap();
        let exponents = [1.0, 2.0];
        let values = grid.evaluate(|p| {
            centers
                .iter()
                .zip(exponents.iter())
                .map(|(c, a): (&Vector3<f64>, &f64)| (-a * (p - c).norm_squared()).exp())
                .sum()
        });
        let expected = PI.powf(1.5) + (PI / 2.0).powf(1.5);
        assert!((grid.integrate(&values) - expected).abs() < 1e-5);
    }

    #[test]
    fn test_becke_partition_of_h2() {
        let coords = [Vector3::zeros(), Vector3::new(0.0, 0.0, 1.4)];
        let grid = MolecularGrid::new(&coords, &[1, 1], &GridParams::default()).unwrap();
        let values = grid.evaluate(|p| {
            coords
                .iter()
                .map(|c| (-2.0 * (p - c).norm_squared()).exp())
                .sum()
        });
        let exact = 2.0 * (PI / 2.0).powf(1.5);
        assert!((grid.integrate(&values) - exact).abs() < 1e-4 * exact);

        // cell weights of both atoms add up to one
        let p = Vector3::new(0.2, 0.4, 0.5);
        let total = becke_weight_for_atom(0, &p, &coords) + becke_weight_for_atom(1, &p, &coords);
        assert!((total - 1.0).abs() < 1e-14);
    }

    #[test]
    fn test_invalid_input() {
        let params = GridParams {
            radial_points: 1,
            theta_points: 4,
        };
        assert!(MolecularGrid::new(&[Vector3::zeros()], &[1], &params).is_err());
        assert!(MolecularGrid::new(&[Vector3::zeros()], &[], &GridParams::default()).is_err());
    }
}
