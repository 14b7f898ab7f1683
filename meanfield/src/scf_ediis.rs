//! Energy DIIS: minimise a quadratic model of the energy over convex
//! combinations of the stored states.

use crate::scf_diis::{DiisHistory, DiisMethod, DiisScfSolver, DiisStep};
use color_eyre::eyre::{eyre, Result};
use nalgebra::{DMatrix, DVector};

const FEASIBILITY: f64 = 1e-12;

/// `eᵀc - ½ cᵀ A c`
fn model(energies: &DVector<f64>, a: &DMatrix<f64>, c: &DVector<f64>) -> f64 {
    energies.dot(c) - 0.5 * (c.transpose() * a * c)[(0, 0)]
}

/// Stationary point of the model on the face spanned by `indices`, if it
/// lies inside the simplex.
fn solve_face(energies: &DVector<f64>, a: &DMatrix<f64>, indices: &[usize]) -> Option<DVector<f64>> {
    let k = indices.len();
    let mut system = DMatrix::zeros(k + 1, k + 1);
    let mut rhs = DVector::zeros(k + 1);
    for (p, &i) in indices.iter().enumerate() {
        for (q, &j) in indices.iter().enumerate() {
            system[(p, q)] = a[(i, j)];
        }
        system[(p, k)] = 1.0;
        system[(k, p)] = 1.0;
        rhs[p] = energies[i];
    }
    rhs[k] = 1.0;
    let solution = system.lu().solve(&rhs)?;

    let mut c = DVector::zeros(energies.len());
    for (p, &i) in indices.iter().enumerate() {
        let v = solution[p];
        if !v.is_finite() || v < -FEASIBILITY {
            return None;
        }
        c[i] = v.max(0.0);
    }
    let total = c.sum();
    (total > 0.0).then(|| c / total)
}

/// Largest history the EDIIS subproblem accepts.
pub const EDIIS_MAX_STATES: usize = 16;

/// Minimises `eᵀc - ½ cᵀ A c` with `c_i ≥ 0` and `Σ c_i = 1`.
///
/// Every face of the simplex is visited, so this is only meant for the
/// handful of states a DIIS history keeps.
pub fn solve_ediis(energies: &DVector<f64>, a: &DMatrix<f64>) -> Result<(DVector<f64>, f64)> {
    let n = energies.len();
    if n == 0 || a.shape() != (n, n) {
        return Err(eyre!("EDIIS needs {} energies and an {}x{} matrix", n, n, n));
    }
    if n > EDIIS_MAX_STATES {
        return Err(eyre!(
            "EDIIS face enumeration is limited to {} states, got {}",
            EDIIS_MAX_STATES,
            n
        ));
    }

    let mut best: Option<(DVector<f64>, f64)> = None;
    for mask in 1usize..(1 << n) {
        let indices: Vec<usize> = (0..n).filter(|i| mask & (1 << i) != 0).collect();
        let candidate = if indices.len() == 1 {
            let mut c = DVector::zeros(n);
            c[indices[0]] = 1.0;
            Some(c)
        } else {
            solve_face(energies, a, &indices)
        };
        if let Some(c) = candidate {
            let value = model(energies, a, &c);
            if best.as_ref().map_or(true, |(_, b)| value < *b) {
                best = Some((c, value));
            }
        }
    }
    best.ok_or_else(|| eyre!("EDIIS found no feasible combination"))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Ediis;

impl DiisMethod for Ediis {
    fn name(&self) -> &'static str {
        "EDIIS"
    }

    fn needs_energy(&self) -> bool {
        true
    }

    fn step(&self, history: &DiisHistory) -> Result<DiisStep> {
        let energies = history.energies()?;
        let a = history.edots() * (0.5 * history.deriv_scale());
        let (coeffs, energy) = solve_ediis(&energies, &a)?;
        Ok(DiisStep {
            coeffs,
            method: 'E',
            energy: Some(energy),
        })
    }
}

pub type EdiisScfSolver = DiisScfSolver<Ediis>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interior_minimum() {
        // -c1 - 2 c2 - 2 c1 c2 has its minimum at c1 = 1/4
        let energies = DVector::from_vec(vec![-1.0, -2.0]);
        let a = DMatrix::from_row_slice(2, 2, &[0.0, 2.0, 2.0, 0.0]);
        let (c, value) = solve_ediis(&energies, &a).unwrap();
        assert!((c[0] - 0.25).abs() < 1e-12);
        assert!((c[1] - 0.75).abs() < 1e-12);
        assert!((value + 2.125).abs() < 1e-12);
    }

    #[test]
    fn test_vertex_minimum() {
        let energies = DVector::from_vec(vec![-1.0, -2.0, -1.5]);
        let a = DMatrix::zeros(3, 3);
        let (c, value) = solve_ediis(&energies, &a).unwrap();
        assert_eq!(c[1], 1.0);
        assert_eq!(value, -2.0);
        assert!(solve_ediis(&DVector::zeros(0), &DMatrix::zeros(0, 0)).is_err());
    }

    #[test]
    fn test_step_from_history() {
        // one basis function, X_12 = (4 - 0)(1 - 0)
        let overlap = DMatrix::identity(1, 1);
        let mut history = DiisHistory::new(4, 1, 1.0, &overlap).unwrap();
        history
            .add(Some(-1.0), &[DMatrix::zeros(1, 1)], &[DMatrix::zeros(1, 1)])
            .unwrap();
        history
            .add(Some(-2.0), &[DMatrix::identity(1, 1)], &[DMatrix::from_element(1, 1, 4.0)])
            .unwrap();
        let step = Ediis.step(&history).unwrap();
        assert_eq!(step.method, 'E');
        assert!((step.coeffs[0] - 0.25).abs() < 1e-12);
        assert!((step.energy.unwrap() + 2.125).abs() < 1e-12);
    }
}
