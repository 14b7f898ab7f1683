//! Commutator DIIS (Pulay mixing).

use crate::scf_diis::{DiisHistory, DiisMethod, DiisScfSolver, DiisStep};
use color_eyre::eyre::{eyre, Result};
use nalgebra::{DMatrix, DVector};

/// Coefficients `c` with `Σ c_i = 1` minimising `cᵀ B c`.
///
/// `B` is rescaled by its diagonal before the bordered system is solved. A
/// singular system falls back to the least-squares solution.
pub fn solve_cdiis(b: &DMatrix<f64>) -> Result<DVector<f64>> {
    let n = b.nrows();
    if n == 0 || !b.is_square() {
        return Err(eyre!("CDIIS needs a non-empty square matrix, got {:?}", b.shape()));
    }
    let scales = DVector::from_iterator(
        n,
        b.diagonal().iter().map(|&d| if d > 0.0 { d.sqrt() } else { 1.0 }),
    );

    let mut bordered = DMatrix::zeros(n + 1, n + 1);
    for i in 0..n {
        for j in 0..n {
            bordered[(i, j)] = b[(i, j)] / (scales[i] * scales[j]);
        }
        bordered[(i, n)] = 1.0 / scales[i];
        bordered[(n, i)] = 1.0 / scales[i];
    }
    let mut rhs = DVector::zeros(n + 1);
    rhs[n] = 1.0;

    let solution = match bordered.clone().lu().solve(&rhs) {
        Some(x) if x.iter().all(|v| v.is_finite()) => x,
        _ => bordered.svd(true, true).solve(&rhs, 1e-12).map_err(|e| eyre!(e))?,
    };

    let mut coeffs = DVector::from_iterator(n, (0..n).map(|i| solution[i] / scales[i]));
    let total = coeffs.sum();
    if total.abs() < 1e-14 || !total.is_finite() {
        return Err(eyre!("CDIIS coefficients cannot be normalised (sum = {})", total));
    }
    coeffs /= total;
    Ok(coeffs)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Cdiis;

impl DiisMethod for Cdiis {
    fn name(&self) -> &'static str {
        "CDIIS"
    }

    fn needs_energy(&self) -> bool {
        false
    }

    fn step(&self, history: &DiisHistory) -> Result<DiisStep> {
        Ok(DiisStep {
            coeffs: solve_cdiis(&history.cdots())?,
            method: 'C',
            energy: None,
        })
    }
}

pub type CdiisScfSolver = DiisScfSolver<Cdiis>;
