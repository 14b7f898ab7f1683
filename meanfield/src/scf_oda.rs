//! Optimal damping algorithm: each step moves the density matrices towards
//! the aufbau solution of the current Fock matrices, as far as a cubic model
//! of the energy along that line recommends.

use crate::error::NoScfConvergence;
use crate::hamiltonian::EffHam;
use crate::occ::OccModel;
use crate::orbitals::Orbitals;
use crate::utils::compute_commutator;
use color_eyre::eyre::{eyre, Result};
use nalgebra::DMatrix;
use tracing::{info, warn};

/// Minimiser on `[0, 1]` of the cubic through `(0, f0)` and `(1, f1)` with
/// slopes `g0` and `g1`.
pub fn find_min_cubic(f0: f64, f1: f64, g0: f64, g1: f64) -> f64 {
    let d = f0;
    let c = g0;
    let a = g1 - 2.0 * f1 + c + 2.0 * d;
    let b = f1 - a - c - d;

    if b * b < (3.0 * a * c).abs() * 1e5 {
        // solve 3a x² + 2b x + c = 0 and keep the root with positive curvature
        let disc = b * b - 3.0 * a * c;
        if disc >= 0.0 {
            let sq = disc.sqrt();
            for x in [(-b + sq) / (3.0 * a), (-b - sq) / (3.0 * a)] {
                if (0.0..=1.0).contains(&x) && 6.0 * a * x + 2.0 * b > 0.0 {
                    return x;
                }
            }
        }
    } else if b > 0.0 {
        let x = -c / (2.0 * b);
        if (0.0..=1.0).contains(&x) {
            return x;
        }
    }

    if f0 < f1 {
        0.0
    } else {
        1.0
    }
}

/// Energies closer than this (relative to their size) are indistinguishable.
const ENERGY_NOISE: f64 = 1e-12;

/// Mixing to use when the cubic model recommends `mixing`. A zero step is
/// only a stall when the aufbau density is measurably higher in energy;
/// within round-off the full step is taken instead. `None` means stalled.
pub fn accepted_mixing(mixing: f64, energy0: f64, energy1: f64) -> Option<f64> {
    if mixing > 0.0 {
        return Some(mixing);
    }
    let noise = ENERGY_NOISE * energy0.abs().max(1.0);
    if (energy1 - energy0).abs() <= noise {
        Some(1.0)
    } else {
        None
    }
}

fn cubic_model(f0: f64, f1: f64, g0: f64, g1: f64, x: f64) -> f64 {
    let d = f0;
    let c = g0;
    let a = g1 - 2.0 * f1 + c + 2.0 * d;
    let b = f1 - a - c - d;
    ((a * x + b) * x + c) * x + d
}

fn mix(dm0s: &[DMatrix<f64>], dm1s: &[DMatrix<f64>], x: f64) -> Vec<DMatrix<f64>> {
    dm0s.iter().zip(dm1s).map(|(d0, d1)| d0 * (1.0 - x) + d1 * x).collect()
}

/// `s Σ_σ tr(F_σ (D1_σ - D0_σ))`
fn slope(ham: &EffHam, focks: &[DMatrix<f64>], dm0s: &[DMatrix<f64>], dm1s: &[DMatrix<f64>]) -> f64 {
    let sum: f64 = focks
        .iter()
        .zip(dm0s.iter().zip(dm1s))
        .map(|(f, (d0, d1))| f.dot(d1) - f.dot(d0))
        .sum();
    sum * ham.deriv_scale()
}

#[derive(Debug, Clone)]
pub struct OdaScfSolver {
    pub threshold: f64,
    pub maxiter: usize,
    pub skip_energy: bool,
}

impl Default for OdaScfSolver {
    fn default() -> Self {
        Self {
            threshold: 1e-8,
            maxiter: 128,
            skip_energy: false,
        }
    }
}

impl OdaScfSolver {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            ..Default::default()
        }
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
        let mut orbs: Vec<Orbitals> = (0..ham.ndm()).map(|_| Orbitals::new(nbasis)).collect();
        let mut fock0s: Vec<DMatrix<f64>> = vec![DMatrix::zeros(nbasis, nbasis); ham.ndm()];
        let mut fock1s = fock0s.clone();

        ham.reset(dms)?;
        let mut energy0 = ham.compute_energy()?;
        ham.compute_fock(&mut fock0s)?;

        info!("Starting ODA SCF solver (threshold = {:.1e})", self.threshold);
        let mut counter = 0;
        let mut error = f64::INFINITY;
        while counter < self.maxiter {
            let errorsq: f64 = dms
                .iter()
                .zip(&fock0s)
                .map(|(dm, fock)| compute_commutator(dm, fock, overlap).norm_squared())
                .sum();
            error = errorsq.sqrt();
            if error < self.threshold {
                break;
            }

            // aufbau density of the current Fock matrices
            for (orb, fock) in orbs.iter_mut().zip(&fock0s) {
                orb.from_fock(fock, overlap)?;
            }
            occ_model.assign(&mut orbs)?;
            let dm1s: Vec<DMatrix<f64>> = orbs.iter().map(|o| o.to_dm()).collect();

            ham.reset(&dm1s)?;
            let energy1 = ham.compute_energy()?;
            ham.compute_fock(&mut fock1s)?;

            let g0 = slope(ham, &fock0s, dms, &dm1s);
            let g1 = slope(ham, &fock1s, dms, &dm1s);
            let mixing = find_min_cubic(energy0, energy1, g0, g1);
            info!(
                "Iteration {:>4}: error = {:.5e}, energy = {:.12}, mixing = {:.6}",
                counter, error, energy0, mixing
            );

            let mixing = match accepted_mixing(mixing, energy0, energy1) {
                Some(mixing) => mixing,
                None => {
                    warn!("ODA stalled: the optimal step along the search line is zero");
                    return Err(NoScfConvergence {
                        iterations: counter,
                        error,
                    }
                    .into());
                }
            };

            if mixing == 1.0 {
                for (dm, dm1) in dms.iter_mut().zip(dm1s) {
                    *dm = dm1;
                }
                energy0 = energy1;
                fock0s.clone_from(&fock1s);
            } else {
                let mixed = mix(dms, &dm1s, mixing);
                for (dm, m) in dms.iter_mut().zip(mixed) {
                    *dm = m;
                }
                ham.reset(dms)?;
                energy0 = ham.compute_energy()?;
                ham.compute_fock(&mut fock0s)?;
            }
            counter += 1;
        }

        if error >= self.threshold {
            return Err(NoScfConvergence {
                iterations: counter,
                error,
            }
            .into());
        }
        ham.reset(dms)?;
        if !self.skip_energy {
            ham.compute_energy()?;
            ham.log_energy()?;
        }
        info!("ODA SCF converged in {} iterations", counter);
        Ok(counter)
    }
}

/// Largest deviation between the energy along the segment from `dm0s` to
/// `dm1s` and the cubic model built from the end points.
pub fn check_cubic(
    ham: &mut EffHam,
    dm0s: &[DMatrix<f64>],
    dm1s: &[DMatrix<f64>],
    e0: f64,
    e1: f64,
    g0: f64,
    g1: f64,
) -> Result<f64> {
    let mut deviation: f64 = 0.0;
    for i in 0..=10 {
        let x = i as f64 / 10.0;
        ham.reset(&mix(dm0s, dm1s, x))?;
        let energy = ham.compute_energy()?;
        deviation = deviation.max((energy - cubic_model(e0, e1, g0, g1, x)).abs());
    }
    Ok(deviation)
}
