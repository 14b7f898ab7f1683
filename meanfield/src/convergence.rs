//! Measures of how far a state is from self-consistency.

use crate::hamiltonian::EffHam;
use crate::orbitals::Orbitals;
use crate::utils::compute_commutator;
use color_eyre::eyre::{eyre, Result};
use nalgebra::DMatrix;

fn zero_focks(ham: &EffHam, n: usize) -> Vec<DMatrix<f64>> {
    vec![DMatrix::zeros(n, n); ham.ndm()]
}

/// Sum over spins of the RMS eigenvalue residual of the orbitals in their
/// own Fock matrices.
pub fn convergence_error_eigen(ham: &mut EffHam, overlap: &DMatrix<f64>, orbs: &[Orbitals]) -> Result<f64> {
    if orbs.len() != ham.ndm() {
        return Err(eyre!("Expected {} orbital sets, got {}", ham.ndm(), orbs.len()));
    }
    let dms: Vec<DMatrix<f64>> = orbs.iter().map(|o| o.to_dm()).collect();
    ham.reset(&dms)?;
    let mut focks = zero_focks(ham, overlap.nrows());
    ham.compute_fock(&mut focks)?;
    Ok(orbs
        .iter()
        .zip(&focks)
        .map(|(orb, fock)| orb.error_eigen(fock, overlap))
        .sum())
}

/// `sqrt(Σ_σ ‖S D F - F D S‖²)`
pub fn convergence_error_commutator(ham: &mut EffHam, overlap: &DMatrix<f64>, dms: &[DMatrix<f64>]) -> Result<f64> {
    ham.reset(dms)?;
    let mut focks = zero_focks(ham, overlap.nrows());
    ham.compute_fock(&mut focks)?;
    let errorsq: f64 = dms
        .iter()
        .zip(&focks)
        .map(|(dm, fock)| compute_commutator(dm, fock, overlap).norm_squared())
        .sum();
    Ok(errorsq.sqrt())
}
