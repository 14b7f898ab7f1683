//! Initial guesses for the orbitals.

use crate::orbitals::Orbitals;
use color_eyre::eyre::{eyre, Result};
use nalgebra::DMatrix;
use tracing::info;

/// Diagonalises the core Hamiltonian into every orbital set. Occupations are
/// not touched; assign them with an occupation model afterwards.
pub fn guess_core_hamiltonian(overlap: &DMatrix<f64>, core: &DMatrix<f64>, orbs: &mut [Orbitals]) -> Result<()> {
    if orbs.is_empty() {
        return Err(eyre!("No orbitals to guess"));
    }
    if core.shape() != overlap.shape() {
        return Err(eyre!(
            "Core Hamiltonian has shape {:?} but the overlap has {:?}",
            core.shape(),
            overlap.shape()
        ));
    }
    for orb in orbs.iter_mut() {
        if orb.nbasis() != overlap.nrows() {
            return Err(eyre!(
                "Orbitals span {} basis functions, the overlap matrix {}",
                orb.nbasis(),
                overlap.nrows()
            ));
        }
        orb.from_fock(core, overlap)?;
    }
    info!("Initial guess: core Hamiltonian ({} orbital sets)", orbs.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_guess() {
        let overlap = DMatrix::from_row_slice(2, 2, &[1.0, 0.5, 0.5, 1.0]);
        let core = DMatrix::from_row_slice(2, 2, &[-1.0, -0.8, -0.8, -1.0]);
        let mut orbs = vec![Orbitals::new(2), Orbitals::new(2)];
        guess_core_hamiltonian(&overlap, &core, &mut orbs).unwrap();
        // bonding combination (-1.8 / 1.5) below antibonding (-0.2 / 0.5)
        assert!((orbs[0].energies[0] + 1.2).abs() < 1e-12);
        assert!((orbs[1].energies[1] + 0.4).abs() < 1e-12);
        assert!(orbs[0].error_eigen(&core, &overlap) < 1e-12);

        let mut wrong = vec![Orbitals::new(3)];
        assert!(guess_core_hamiltonian(&overlap, &core, &mut wrong).is_err());
    }
}
