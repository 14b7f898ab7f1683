//! Projection of orbitals onto another basis set, used to restart from a
//! calculation in a different basis.

use crate::error::ProjectionError;
use crate::orbitals::{symmetric_power, Orbitals};
use basis::OrbitalBasis;
use color_eyre::eyre::{eyre, Result};
use nalgebra::{DMatrix, DVector};
use tracing::info;

const PINV_EPS: f64 = 1e-12;

/// Copies `projector · c` for every occupied column of `orb0` into the
/// leading columns of `orb1` and clears the rest. Returns the number of
/// projected orbitals.
fn project_occupied(projector: &DMatrix<f64>, orb0: &Orbitals, orb1: &mut Orbitals) -> Result<usize> {
    let occupied: Vec<usize> = (0..orb0.nfn()).filter(|&i| orb0.occupations[i] != 0.0).collect();
    if occupied.len() > orb1.nfn() {
        return Err(ProjectionError(format!(
            "{} occupied orbitals do not fit in {} target functions",
            occupied.len(),
            orb1.nfn()
        ))
        .into());
    }
    orb1.coeffs.fill(0.0);
    orb1.occupations.fill(0.0);
    orb1.energies.fill(0.0);
    for (i1, &i0) in occupied.iter().enumerate() {
        orb1.coeffs.set_column(i1, &(projector * orb0.coeffs.column(i0)));
        orb1.occupations[i1] = orb0.occupations[i0];
    }
    Ok(occupied.len())
}

fn check_sizes(orb0: &Orbitals, n0: usize, orb1: &Orbitals, n1: usize) -> Result<()> {
    if orb0.nbasis() != n0 || orb1.nbasis() != n1 {
        return Err(eyre!(
            "Orbitals span ({}, {}) functions but the bases have ({}, {})",
            orb0.nbasis(),
            orb1.nbasis(),
            n0,
            n1
        ));
    }
    Ok(())
}

/// Projects the occupied orbitals of `orb0` (in `basis0`) onto `basis1` and
/// orthonormalises them with modified Gram-Schmidt.
///
/// The result is only meant as an initial guess: energies are zero and the
/// columns past the occupied ones are empty.
pub fn project_orbitals_mgs(
    basis0: &OrbitalBasis,
    basis1: &OrbitalBasis,
    orb0: &Orbitals,
    orb1: &mut Orbitals,
    eps: f64,
) -> Result<()> {
    check_sizes(orb0, basis0.nbasis(), orb1, basis1.nbasis())?;
    let s11 = basis1.compute_overlap();
    let s10 = basis1.compute_overlap_with(basis0);
    let projector = s11.clone().pseudo_inverse(PINV_EPS).map_err(|e| eyre!(e))? * s10;
    let ntrans = project_occupied(&projector, orb0, orb1)?;

    let dot = |a: &DVector<f64>, b: &DVector<f64>| (a.transpose() * &s11 * b)[(0, 0)];
    for i in 0..ntrans {
        let mut orb = orb1.coeffs.column(i).into_owned();
        for j in 0..i {
            let other = orb1.coeffs.column(j).into_owned();
            orb -= &other * dot(&other, &orb);
        }
        let norm = dot(&orb, &orb).sqrt();
        if norm < eps {
            return Err(ProjectionError(format!(
                "Norm of projected orbital {} dropped to {:.3e}; the orbitals are redundant in the new basis",
                i, norm
            ))
            .into());
        }
        orb1.coeffs.set_column(i, &(orb / norm));
    }
    info!("Projected {} orbitals onto a basis of {} functions (MGS)", ntrans, basis1.nbasis());
    Ok(())
}

/// Projects with `S11⁻¹ S10` and orthonormalises the projected orbitals with
/// Löwdin's symmetric scheme. `cross` is the overlap between the new (rows)
/// and old (columns) basis functions.
pub fn project_orbitals_ortho(
    overlap0: &DMatrix<f64>,
    overlap1: &DMatrix<f64>,
    cross: &DMatrix<f64>,
    orb0: &Orbitals,
    orb1: &mut Orbitals,
) -> Result<()> {
    check_sizes(orb0, overlap0.nrows(), orb1, overlap1.nrows())?;
    if cross.shape() != (overlap1.nrows(), overlap0.nrows()) {
        return Err(eyre!(
            "Cross overlap has shape {:?}, expected ({}, {})",
            cross.shape(),
            overlap1.nrows(),
            overlap0.nrows()
        ));
    }
    orb0.check_orthonormality(overlap0, 1e-5)?;

    let inv = overlap1
        .clone()
        .try_inverse()
        .ok_or_else(|| ProjectionError("The overlap of the new basis is singular".to_string()))?;
    let ntrans = project_occupied(&(inv * cross), orb0, orb1)?;
    if ntrans == 0 {
        return Ok(());
    }

    let occupied = orb1.coeffs.columns(0, ntrans).into_owned();
    let metric = occupied.transpose() * overlap1 * &occupied;
    if metric.clone().symmetric_eigenvalues().min() < 1e-10 {
        return Err(ProjectionError("Projected orbitals are linearly dependent".to_string()).into());
    }
    let orthonormal = occupied * symmetric_power(&metric, -0.5);
    orb1.coeffs.columns_mut(0, ntrans).copy_from(&orthonormal);
    info!("Projected {} orbitals onto a basis of {} functions (Löwdin)", ntrans, overlap1.nrows());
    Ok(())
}
