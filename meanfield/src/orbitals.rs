//! Orbital coefficients, energies and occupation numbers for one spin.

use color_eyre::eyre::{eyre, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// Eigenvalues of S below this are treated as linear dependencies.
const OVERLAP_EIGEN_THRESHOLD: f64 = 1e-10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Orbitals {
    pub coeffs: DMatrix<f64>,
    pub energies: DVector<f64>,
    pub occupations: DVector<f64>,
}

/// `M^power` for a symmetric matrix. Eigenvalues below the linear-dependency
/// threshold are dropped.
pub(crate) fn symmetric_power(m: &DMatrix<f64>, power: f64) -> DMatrix<f64> {
    let eig = m.clone().symmetric_eigen();
    let vals = eig.eigenvalues.map(|v| {
        if v > OVERLAP_EIGEN_THRESHOLD {
            v.powf(power)
        } else {
            0.0
        }
    });
    &eig.eigenvectors * DMatrix::from_diagonal(&vals) * eig.eigenvectors.transpose()
}

/// Flips each column so that its largest component is positive.
pub fn align_eigenvectors(mut eigvecs: DMatrix<f64>) -> DMatrix<f64> {
    for j in 0..eigvecs.ncols() {
        let max_val = eigvecs
            .column(j)
            .iter()
            .copied()
            .max_by(|a, b| a.abs().partial_cmp(&b.abs()).unwrap_or(Ordering::Less))
            .unwrap_or(0.0);
        if max_val < 0.0 {
            eigvecs.column_mut(j).neg_mut();
        }
    }
    eigvecs
}

/// Eigenpairs of a symmetric matrix in ascending order.
fn sorted_eigen(m: DMatrix<f64>) -> (DVector<f64>, DMatrix<f64>) {
    let eig = m.symmetric_eigen();
    let mut indices: Vec<usize> = (0..eig.eigenvalues.len()).collect();
    indices.sort_by(|&a, &b| {
        eig.eigenvalues[a]
            .partial_cmp(&eig.eigenvalues[b])
            .unwrap_or(Ordering::Equal)
    });
    let values = DVector::from_fn(indices.len(), |i, _| eig.eigenvalues[indices[i]]);
    let vectors = eig.eigenvectors.select_columns(&indices);
    (values, vectors)
}

impl Orbitals {
    pub fn new(nbasis: usize) -> Self {
        Self::with_nfn(nbasis, nbasis)
    }

    pub fn with_nfn(nbasis: usize, nfn: usize) -> Self {
        Self {
            coeffs: DMatrix::zeros(nbasis, nfn),
            energies: DVector::zeros(nfn),
            occupations: DVector::zeros(nfn),
        }
    }

    pub fn nbasis(&self) -> usize {
        self.coeffs.nrows()
    }

    pub fn nfn(&self) -> usize {
        self.coeffs.ncols()
    }

    fn check_shape(&self, m: &DMatrix<f64>, what: &str) -> Result<()> {
        let n = self.nbasis();
        if m.shape() != (n, n) {
            return Err(eyre!(
                "{} has shape {:?}, expected ({}, {})",
                what,
                m.shape(),
                n,
                n
            ));
        }
        Ok(())
    }

    /// Solves `F C = S C ε` through symmetric orthogonalisation and keeps the
    /// `nfn` lowest solutions. Occupations are left untouched.
    pub fn from_fock(&mut self, fock: &DMatrix<f64>, overlap: &DMatrix<f64>) -> Result<()> {
        self.check_shape(fock, "Fock matrix")?;
        self.check_shape(overlap, "Overlap matrix")?;

        let x = symmetric_power(overlap, -0.5);
        let f_prime = x.transpose() * fock * &x;
        let (values, vectors) = sorted_eigen(f_prime);

        // null directions of a linearly dependent basis come out as zero columns
        let mut order: Vec<usize> = (0..values.len()).collect();
        let coeffs = align_eigenvectors(&x * vectors);
        order.sort_by_key(|&i| coeffs.column(i).norm() < 1e-8);

        let nfn = self.nfn();
        for (k, &i) in order.iter().take(nfn).enumerate() {
            self.coeffs.set_column(k, &coeffs.column(i));
            self.energies[k] = values[i];
        }
        Ok(())
    }

    /// Diagonalises `F + shift (S - S D S)`, which raises the orbitals left
    /// empty by `dm` by `shift`. The energies are reset to the
    /// expectation values of the unshifted Fock matrix.
    pub fn from_fock_shifted(
        &mut self,
        fock: &DMatrix<f64>,
        overlap: &DMatrix<f64>,
        dm: &DMatrix<f64>,
        shift: f64,
    ) -> Result<()> {
        self.check_shape(dm, "Density matrix")?;
        let shifted = fock + (overlap - overlap * dm * overlap) * shift;
        self.from_fock(&shifted, overlap)?;
        let expectation = self.coeffs.transpose() * fock * &self.coeffs;
        self.energies = expectation.diagonal();
        Ok(())
    }

    /// `C diag(n) Cᵀ`
    pub fn to_dm(&self) -> DMatrix<f64> {
        let weighted = &self.coeffs * DMatrix::from_diagonal(&self.occupations);
        weighted * self.coeffs.transpose()
    }

    /// Natural orbitals of `dm`, most occupied first. Energies are zeroed.
    pub fn derive_naturals(&mut self, dm: &DMatrix<f64>, overlap: &DMatrix<f64>) -> Result<()> {
        self.check_shape(dm, "Density matrix")?;
        self.check_shape(overlap, "Overlap matrix")?;

        let sqrt_s = symmetric_power(overlap, 0.5);
        let inv_sqrt_s = symmetric_power(overlap, -0.5);
        let (values, vectors) = sorted_eigen(&sqrt_s * dm * &sqrt_s);
        let coeffs = inv_sqrt_s * vectors;

        let n = values.len();
        let nfn = self.nfn().min(n);
        for k in 0..nfn {
            let i = n - 1 - k;
            self.coeffs.set_column(k, &coeffs.column(i));
            self.occupations[k] = values[i];
            self.energies[k] = 0.0;
        }
        Ok(())
    }

    /// RMS of `F C - S C diag(ε)` over all coefficients.
    pub fn error_eigen(&self, fock: &DMatrix<f64>, overlap: &DMatrix<f64>) -> f64 {
        let residual = fock * &self.coeffs - overlap * &self.coeffs * DMatrix::from_diagonal(&self.energies);
        let count = residual.len().max(1) as f64;
        (residual.norm_squared() / count).sqrt()
    }

    pub fn homo_index(&self) -> Option<usize> {
        self.occupations.as_slice().iter().rposition(|&n| n > 0.0)
    }

    pub fn lumo_index(&self) -> Option<usize> {
        self.occupations.as_slice().iter().position(|&n| n == 0.0)
    }

    pub fn homo_energy(&self) -> Option<f64> {
        self.homo_index().map(|i| self.energies[i])
    }

    pub fn lumo_energy(&self) -> Option<f64> {
        self.lumo_index().map(|i| self.energies[i])
    }

    pub fn occupied_count(&self) -> usize {
        self.occupations.iter().filter(|&&n| n > 0.0).count()
    }

    /// Every orbital must satisfy `cᵀ S c = 1` within `eps`.
    pub fn check_normalization(&self, overlap: &DMatrix<f64>, eps: f64) -> Result<()> {
        for i in 0..self.nfn() {
            let c = self.coeffs.column(i);
            let norm = (c.transpose() * overlap * c)[(0, 0)];
            if (norm - 1.0).abs() > eps {
                return Err(eyre!("Orbital {} has norm {:.3e}", i, norm));
            }
        }
        Ok(())
    }

    /// Occupied orbitals must be orthonormal in the `S` metric.
    pub fn check_orthonormality(&self, overlap: &DMatrix<f64>, eps: f64) -> Result<()> {
        let occupied: Vec<usize> = (0..self.nfn()).filter(|&i| self.occupations[i] > 0.0).collect();
        for &i in &occupied {
            for &j in &occupied {
                let s = (self.coeffs.column(i).transpose() * overlap * self.coeffs.column(j))[(0, 0)];
                let expected = if i == j { 1.0 } else { 0.0 };
                if (s - expected).abs() > eps {
                    return Err(eyre!("Orbitals {} and {} overlap {:.3e}", i, j, s));
                }
            }
        }
        Ok(())
    }

    pub fn assign(&mut self, other: &Orbitals) {
        self.coeffs.clone_from(&other.coeffs);
        self.energies.clone_from(&other.energies);
        self.occupations.clone_from(&other.occupations);
    }

    pub fn swap_orbitals(&mut self, swaps: &[(usize, usize)]) {
        for &(i, j) in swaps {
            self.coeffs.swap_columns(i, j);
            self.energies.swap_rows(i, j);
            self.occupations.swap_rows(i, j);
        }
    }
}
