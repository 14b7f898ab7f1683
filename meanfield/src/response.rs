//! Sum-over-states response of a non-interacting system.

use crate::orbitals::Orbitals;
use color_eyre::eyre::{eyre, Result};
use nalgebra::DMatrix;

// Orbital energy differences below this are treated as degenerate.
const DEGENERACY_EPS: f64 = 1e-12;

/// Response matrix `χ_ab = Σ_ij O^a_ij O^b_ij (n_i - n_j)/(ε_i - ε_j)` for a
/// set of one-body operators in the atomic-orbital basis.
///
/// Pairs with equal occupations or (near-)equal energies contribute nothing.
pub fn compute_noninteracting_response(orbs: &Orbitals, operators: &[DMatrix<f64>]) -> Result<DMatrix<f64>> {
    let nbasis = orbs.nbasis();
    let norb = orbs.nfn();
    for (i, op) in operators.iter().enumerate() {
        if op.shape() != (nbasis, nbasis) {
            return Err(eyre!(
                "Operator {} has shape {:?}, expected ({}, {})",
                i,
                op.shape(),
                nbasis,
                nbasis
            ));
        }
    }

    let mo_ops: Vec<DMatrix<f64>> = operators
        .iter()
        .map(|op| orbs.coeffs.transpose() * op * &orbs.coeffs)
        .collect();

    let prefacs = DMatrix::from_fn(norb, norb, |i, j| {
        let dn = orbs.occupations[i] - orbs.occupations[j];
        let de = orbs.energies[i] - orbs.energies[j];
        if i == j || dn == 0.0 || de.abs() < DEGENERACY_EPS {
            0.0
        } else {
            dn / de
        }
    });

    let nop = operators.len();
    let mut result = DMatrix::zeros(nop, nop);
    for a in 0..nop {
        let weighted = mo_ops[a].component_mul(&prefacs);
        for b in 0..=a {
            let value = weighted.dot(&mo_ops[b]);
            result[(a, b)] = value;
            result[(b, a)] = value;
        }
    }
    Ok(result)
}
