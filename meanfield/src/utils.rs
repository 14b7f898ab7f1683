//! Small helpers shared by the solvers, occupation models and reporting.

use crate::error::DensityMatrixError;
use crate::orbitals::Orbitals;
use color_eyre::eyre::{eyre, Result};
use nalgebra::DMatrix;

/// Boltzmann constant in Hartree per Kelvin.
pub const BOLTZMANN: f64 = 3.1668154051341965e-06;

/// Checks that the natural occupations of `dm` lie in `[-eps, occ_max + eps]`.
pub fn check_dm(dm: &DMatrix<f64>, overlap: &DMatrix<f64>, eps: f64, occ_max: f64) -> Result<()> {
    let mut naturals = Orbitals::new(dm.nrows());
    naturals.derive_naturals(dm, overlap)?;
    let min = naturals.occupations.min();
    let max = naturals.occupations.max();
    if min < -eps {
        return Err(DensityMatrixError(format!(
            "eigenvalues considerably smaller than zero, error = {:e}",
            min
        ))
        .into());
    }
    if max > occ_max + eps {
        return Err(DensityMatrixError(format!(
            "eigenvalues considerably larger than max, error = {:e}",
            max - occ_max
        ))
        .into());
    }
    Ok(())
}

/// Level-shift operator `Sᵀ D S`.
pub fn get_level_shift(dm: &DMatrix<f64>, overlap: &DMatrix<f64>) -> DMatrix<f64> {
    overlap.transpose() * dm * overlap
}

/// Expectation values `(<Sz>, <S²>)` of a single determinant built from
/// alpha and beta orbitals.
pub fn get_spin(orb_alpha: &Orbitals, orb_beta: &Orbitals, overlap: &DMatrix<f64>) -> (f64, f64) {
    let nalpha = orb_alpha.occupations.sum();
    let nbeta = orb_beta.occupations.sum();
    let sz = (nalpha - nbeta) / 2.0;

    let mut correction = 0.0;
    for ia in 0..orb_alpha.nfn() {
        if orb_alpha.occupations[ia] == 0.0 {
            continue;
        }
        for ib in 0..orb_beta.nfn() {
            if orb_beta.occupations[ib] == 0.0 {
                continue;
            }
            let s = (orb_alpha.coeffs.column(ia).transpose() * overlap * orb_beta.coeffs.column(ib))[(0, 0)];
            correction += s * s;
        }
    }

    (sz, sz * (sz + 1.0) + nbeta - correction)
}

/// Highest occupied and lowest unoccupied energy over several orbital sets.
/// The LUMO is `None` when every orbital is occupied.
pub fn get_homo_lumo(orbs: &[Orbitals]) -> Result<(f64, Option<f64>)> {
    let homo = orbs
        .iter()
        .filter_map(|o| o.homo_energy())
        .fold(None, |acc: Option<f64>, e| Some(acc.map_or(e, |a| a.max(e))))
        .ok_or_else(|| eyre!("No occupied orbitals"))?;
    let lumo = orbs
        .iter()
        .filter_map(|o| o.lumo_energy())
        .fold(None, |acc: Option<f64>, e| Some(acc.map_or(e, |a| a.min(e))));
    Ok((homo, lumo))
}

/// `S D F - F D S`, which vanishes at self-consistency.
pub fn compute_commutator(dm: &DMatrix<f64>, fock: &DMatrix<f64>, overlap: &DMatrix<f64>) -> DMatrix<f64> {
    overlap * dm * fock - fock * dm * overlap
}
