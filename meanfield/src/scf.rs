//! Plain SCF: diagonalise the Fock matrices of the current orbitals until the
//! orbitals reproduce themselves.

use crate::convergence::convergence_error_eigen;
use crate::error::NoScfConvergence;
use crate::hamiltonian::EffHam;
use crate::occ::OccModel;
use crate::orbitals::Orbitals;
use color_eyre::eyre::{eyre, Result};
use nalgebra::DMatrix;
use tracing::info;

#[derive(Debug, Clone)]
pub struct PlainScfSolver {
    pub threshold: f64,
    pub maxiter: usize,
    pub skip_energy: bool,
    pub level_shift: f64,
}

impl Default for PlainScfSolver {
    fn default() -> Self {
        Self {
            threshold: 1e-8,
            maxiter: 128,
            skip_energy: false,
            level_shift: 0.0,
        }
    }
}

impl PlainScfSolver {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            ..Default::default()
        }
    }

    /// Runs the SCF cycle in place on `orbs` and returns the number of
    /// iterations.
    pub fn solve(
        &self,
        ham: &mut EffHam,
        overlap: &DMatrix<f64>,
        occ_model: &dyn OccModel,
        orbs: &mut [Orbitals],
    ) -> Result<usize> {
        if orbs.len() != ham.ndm() {
            return Err(eyre!("Expected {} orbital sets, got {}", ham.ndm(), orbs.len()));
        }
        if self.level_shift < 0.0 {
            return Err(eyre!("The level shift must be non-negative"));
        }
        let nbasis = overlap.nrows();
        let mut focks: Vec<DMatrix<f64>> = vec![DMatrix::zeros(nbasis, nbasis); ham.ndm()];
        let mut dms: Vec<DMatrix<f64>> = vec![DMatrix::zeros(nbasis, nbasis); ham.ndm()];

        info!("Starting plain SCF solver (threshold = {:.1e})", self.threshold);
        let mut counter = 0;
        let mut error = f64::INFINITY;
        while counter < self.maxiter {
            for (dm, orb) in dms.iter_mut().zip(orbs.iter()) {
                *dm = orb.to_dm();
            }
            ham.reset(&dms)?;
            let energy = if self.skip_energy { None } else { Some(ham.compute_energy()?) };
            ham.compute_fock(&mut focks)?;

            error = orbs
                .iter()
                .zip(&focks)
                .map(|(orb, fock)| orb.error_eigen(fock, overlap))
                .sum();
            match energy {
                Some(e) => info!("Iteration {:>4}: error = {:.5e}, energy = {:.12}", counter, error, e),
                None => info!("Iteration {:>4}: error = {:.5e}", counter, error),
            }
            if error < self.threshold {
                break;
            }

            for ((orb, fock), dm) in orbs.iter_mut().zip(&focks).zip(&dms) {
                if self.level_shift > 0.0 {
                    orb.from_fock_shifted(fock, overlap, dm, self.level_shift)?;
                } else {
                    orb.from_fock(fock, overlap)?;
                }
            }
            occ_model.assign(orbs)?;
            counter += 1;
        }

        if error >= self.threshold {
            return Err(NoScfConvergence {
                iterations: counter,
                error,
            }
            .into());
        }
        if !self.skip_energy {
            ham.compute_energy()?;
            ham.log_energy()?;
        }
        info!("Plain SCF converged in {} iterations", counter);
        Ok(counter)
    }

    /// Convergence measure of the current orbitals.
    pub fn error(&self, ham: &mut EffHam, overlap: &DMatrix<f64>, orbs: &[Orbitals]) -> Result<f64> {
        convergence_error_eigen(ham, overlap, orbs)
    }
}
