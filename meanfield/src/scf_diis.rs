//! Shared machinery of the DIIS family of SCF solvers.
//!
//! A [`DiisHistory`] keeps the last few (density, Fock) pairs. A
//! [`DiisMethod`] turns the history into extrapolation coefficients, and the
//! [`DiisScfSolver`] alternates between diagonalisation and extrapolation.

use crate::error::NoScfConvergence;
use crate::hamiltonian::EffHam;
use crate::occ::OccModel;
use crate::orbitals::Orbitals;
use crate::utils::compute_commutator;
use color_eyre::eyre::{eyre, Result};
use nalgebra::{DMatrix, DVector};
use std::collections::VecDeque;
use tracing::info;

const PRUNE_CONDITION_NUMBER: f64 = 1e12;

#[derive(Debug, Clone)]
pub struct DiisState {
    pub dms: Vec<DMatrix<f64>>,
    pub focks: Vec<DMatrix<f64>>,
    pub commutators: Vec<DMatrix<f64>>,
    /// `Σ_σ ‖S D F - F D S‖²`
    pub normsq: f64,
    pub energy: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct DiisHistory {
    nvector: usize,
    ndm: usize,
    deriv_scale: f64,
    overlap: DMatrix<f64>,
    states: VecDeque<DiisState>,
}

impl DiisHistory {
    pub fn new(nvector: usize, ndm: usize, deriv_scale: f64, overlap: &DMatrix<f64>) -> Result<Self> {
        if nvector < 2 {
            return Err(eyre!("DIIS needs room for at least two states, got {}", nvector));
        }
        Ok(Self {
            nvector,
            ndm,
            deriv_scale,
            overlap: overlap.clone(),
            states: VecDeque::with_capacity(nvector),
        })
    }

    pub fn nused(&self) -> usize {
        self.states.len()
    }

    pub fn ndm(&self) -> usize {
        self.ndm
    }

    pub fn deriv_scale(&self) -> f64 {
        self.deriv_scale
    }

    pub fn states(&self) -> &VecDeque<DiisState> {
        &self.states
    }

    /// Stores a new state, dropping the oldest one when the history is full.
    /// Returns the squared commutator norm of the new state.
    pub fn add(&mut self, energy: Option<f64>, dms: &[DMatrix<f64>], focks: &[DMatrix<f64>]) -> Result<f64> {
        if dms.len() != self.ndm || focks.len() != self.ndm {
            return Err(eyre!(
                "DIIS state needs {} density and Fock matrices, got {} and {}",
                self.ndm,
                dms.len(),
                focks.len()
            ));
        }
        let commutators: Vec<DMatrix<f64>> = dms
            .iter()
            .zip(focks)
            .map(|(dm, fock)| compute_commutator(dm, fock, &self.overlap))
            .collect();
        let normsq: f64 = commutators.iter().map(|c| c.norm_squared()).sum();
        if self.states.len() == self.nvector {
            self.states.pop_front();
        }
        self.states.push_back(DiisState {
            dms: dms.to_vec(),
            focks: focks.to_vec(),
            commutators,
            normsq,
            energy,
        });
        Ok(normsq)
    }

    /// Forgets the oldest state.
    pub fn shrink(&mut self) {
        self.states.pop_front();
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    pub fn max_normsq(&self) -> f64 {
        self.states.iter().map(|s| s.normsq).fold(0.0, f64::max)
    }

    /// `B_ij = Σ_σ <C_iσ, C_jσ>`
    pub fn cdots(&self) -> DMatrix<f64> {
        let n = self.nused();
        DMatrix::from_fn(n, n, |i, j| {
            self.states[i]
                .commutators
                .iter()
                .zip(&self.states[j].commutators)
                .map(|(a, b)| a.dot(b))
                .sum()
        })
    }

    /// `X_ij = Σ_σ tr((F_i - F_j)(D_i - D_j))`
    pub fn edots(&self) -> DMatrix<f64> {
        let n = self.nused();
        DMatrix::from_fn(n, n, |i, j| {
            let (si, sj) = (&self.states[i], &self.states[j]);
            (0..self.ndm)
                .map(|k| (&si.focks[k] - &sj.focks[k]).dot(&(&si.dms[k] - &sj.dms[k])))
                .sum()
        })
    }

    pub fn energies(&self) -> Result<DVector<f64>> {
        let energies: Option<Vec<f64>> = self.states.iter().map(|s| s.energy).collect();
        energies
            .map(DVector::from_vec)
            .ok_or_else(|| eyre!("Energy-based DIIS needs the energy of every stored state"))
    }

    /// Ratio of the largest to the smallest absolute eigenvalue of `B`.
    pub fn condition_number(&self) -> f64 {
        let evals = self.cdots().symmetric_eigenvalues().abs();
        let (min, max) = (evals.min(), evals.max());
        if min > 0.0 {
            max / min
        } else {
            f64::INFINITY
        }
    }

    /// `(Σ c_i D_i, Σ c_i F_i)` per spin.
    pub fn combine(&self, coeffs: &DVector<f64>) -> (Vec<DMatrix<f64>>, Vec<DMatrix<f64>>) {
        let shape = self.overlap.shape();
        let mut dms = vec![DMatrix::zeros(shape.0, shape.1); self.ndm];
        let mut focks = dms.clone();
        for (state, c) in self.states.iter().zip(coeffs.iter()) {
            for k in 0..self.ndm {
                dms[k] += &state.dms[k] * *c;
                focks[k] += &state.focks[k] * *c;
            }
        }
        (dms, focks)
    }
}

/// Extrapolation coefficients chosen by a DIIS method.
#[derive(Debug, Clone)]
pub struct DiisStep {
    pub coeffs: DVector<f64>,
    /// `C`, `E` or `M` for commutator, energy or mixed DIIS.
    pub method: char,
    /// Energy predicted for the extrapolated state, when the method has one.
    pub energy: Option<f64>,
}

pub trait DiisMethod {
    fn name(&self) -> &'static str;

    fn needs_energy(&self) -> bool;

    fn step(&self, history: &DiisHistory) -> Result<DiisStep>;
}

#[derive(Debug, Clone)]
pub struct DiisScfSolver<M: DiisMethod> {
    pub method: M,
    pub threshold: f64,
    pub maxiter: usize,
    pub nvector: usize,
    pub skip_energy: bool,
    pub prune_old_states: bool,
}

impl<M: DiisMethod + Default> Default for DiisScfSolver<M> {
    fn default() -> Self {
        Self::new(M::default())
    }
}

impl<M: DiisMethod> DiisScfSolver<M> {
    pub fn new(method: M) -> Self {
        Self {
            method,
            threshold: 1e-6,
            maxiter: 128,
            nvector: 6,
            skip_energy: false,
            prune_old_states: false,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    fn format_coeffs(coeffs: &DVector<f64>) -> String {
        coeffs
            .iter()
            .map(|c| format!("{:.4}", c))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Optimises `dms` in place and returns the number of iterations.
    pub fn solve(
        &self,
        ham: &mut EffHam,
        overlap: &DMatrix<f64>,
        occ_model: &dyn OccModel,
        dms: &mut [DMatrix<f64>],
    ) -> Result<usize> {
        if dms.len() != ham.ndm() {
            return Err(eyre!("Expected {} density matrices, got {}", ham.ndm(), dms.len()));
        }
        occ_model.check_dms(overlap, dms, 1e-4)?;

        let nbasis = overlap.nrows();
        let need_energy = self.method.needs_energy() || !self.skip_energy;
        let mut orbs: Vec<Orbitals> = (0..ham.ndm()).map(|_| Orbitals::new(nbasis)).collect();
        let mut focks: Vec<DMatrix<f64>> = vec![DMatrix::zeros(nbasis, nbasis); ham.ndm()];
        let mut history = DiisHistory::new(self.nvector, ham.ndm(), ham.deriv_scale(), overlap)?;

        info!(
            "Starting {} SCF solver (threshold = {:.1e}, nvector = {})",
            self.method.name(),
            self.threshold,
            self.nvector
        );
        let mut counter = 0;
        let mut error = f64::INFINITY;
        while counter < self.maxiter {
            if history.nused() == 0 {
                ham.reset(dms)?;
                let energy = if need_energy { Some(ham.compute_energy()?) } else { None };
                ham.compute_fock(&mut focks)?;
                history.add(energy, dms, &focks)?;
            }

            for (orb, fock) in orbs.iter_mut().zip(&focks) {
                orb.from_fock(fock, overlap)?;
            }
            occ_model.assign(&mut orbs)?;
            for (dm, orb) in dms.iter_mut().zip(&orbs) {
                *dm = orb.to_dm();
            }

            ham.reset(dms)?;
            let energy = if need_energy { Some(ham.compute_energy()?) } else { None };
            ham.compute_fock(&mut focks)?;
            error = history.add(energy, dms, &focks)?.sqrt();

            if error < self.threshold {
                match energy {
                    Some(e) => info!("Iteration {:>4}: error = {:.5e}, energy = {:.12}", counter, error, e),
                    None => info!("Iteration {:>4}: error = {:.5e}", counter, error),
                }
                break;
            }

            let mut step = self.method.step(&history)?;
            let mut cn = history.condition_number();
            if self.prune_old_states {
                while cn > PRUNE_CONDITION_NUMBER && history.nused() > 2 {
                    history.shrink();
                    step = self.method.step(&history)?;
                    cn = history.condition_number();
                }
            }
            info!(
                "Iteration {:>4}: error = {:.5e}, energy = {}, cn = {:.2e}, {} [{}]",
                counter,
                error,
                energy.map_or_else(|| "-".to_string(), |e| format!("{:.12}", e)),
                cn,
                step.method,
                Self::format_coeffs(&step.coeffs)
            );

            let (new_dms, new_focks) = history.combine(&step.coeffs);
            for (dm, new) in dms.iter_mut().zip(new_dms) {
                *dm = new;
            }
            focks = new_focks;
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
        info!("{} SCF converged in {} iterations", self.method.name(), counter);
        Ok(counter)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// History over a 2x2 problem with `D = diag(1, 0)` and `F = t σx`,
    /// whose commutators have squared norm `2 t²`.
    pub(crate) fn toy_history(ts: &[f64], energies: &[f64]) -> DiisHistory {
        let overlap = DMatrix::identity(2, 2);
        let dm = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 0.0]);
        let mut history = DiisHistory::new(6, 1, 2.0, &overlap).unwrap();
        for (t, e) in ts.iter().zip(energies) {
            let fock = DMatrix::from_row_slice(2, 2, &[0.0, *t, *t, 0.0]);
            history.add(Some(*e), &[dm.clone()], &[fock]).unwrap();
        }
        history
    }

    #[test]
    fn test_history_bookkeeping() {
        let mut history = toy_history(&[1.0, -1.0, 0.5], &[0.0, 0.1, 0.2]);
        assert_eq!(history.nused(), 3);
        assert!((history.max_normsq() - 2.0).abs() < 1e-14);

        let b = history.cdots();
        assert!((b[(0, 1)] + 2.0).abs() < 1e-14);
        assert_eq!(b, b.transpose());
        let x = history.edots();
        assert_eq!(x[(0, 0)], 0.0);
        // same density everywhere, so no energy cross terms
        assert_eq!(x[(1, 2)], 0.0);

        let (dms, focks) = history.combine(&DVector::from_vec(vec![0.0, 1.0, 0.0]));
        assert_eq!(focks[0][(0, 1)], -1.0);
        assert_eq!(dms[0][(0, 0)], 1.0);

        history.shrink();
        assert_eq!(history.nused(), 2);
        assert_eq!(history.energies().unwrap()[0], 0.1);

        for _ in 0..10 {
            history.add(None, &[DMatrix::identity(2, 2)], &[DMatrix::identity(2, 2)]).unwrap();
        }
        assert_eq!(history.nused(), 6);
        assert!(history.energies().is_err());
        assert!(history.add(None, &[], &[]).is_err());
        assert!(DiisHistory::new(1, 1, 1.0, &DMatrix::identity(2, 2)).is_err());
    }
}
