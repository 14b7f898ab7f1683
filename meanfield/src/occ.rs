//! Occupation models: how electrons are distributed over orbitals.

use crate::error::ElectronCountError;
use crate::orbitals::Orbitals;
use crate::utils::{check_dm, BOLTZMANN};
use color_eyre::eyre::{eyre, Result};
use nalgebra::{DMatrix, DVector};
use tracing::debug;

pub trait OccModel {
    /// Sets the occupation numbers of one (restricted) or two (alpha, beta)
    /// orbital sets. The orbital energies must be sorted.
    fn assign(&self, orbs: &mut [Orbitals]) -> Result<()>;

    /// Checks that density matrices are compatible with this model.
    fn check_dms(&self, overlap: &DMatrix<f64>, dms: &[DMatrix<f64>], eps: f64) -> Result<()>;
}

fn check_dm_counts(overlap: &DMatrix<f64>, dms: &[DMatrix<f64>], counts: &[f64], eps: f64) -> Result<()> {
    for (dm, &nocc) in dms.iter().zip(counts) {
        check_dm(dm, overlap, eps, 1.0)?;
        let trace = (overlap * dm).trace();
        if (trace - nocc).abs() > eps {
            return Err(eyre!(
                "Density matrix holds {:.6} electrons, expected {:.6}",
                trace,
                nocc
            ));
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct AufbauOccModel {
    pub nalpha: f64,
    pub nbeta: f64,
}

impl AufbauOccModel {
    pub fn new(nalpha: f64, nbeta: f64) -> Result<Self> {
        if nalpha < 0.0 || nbeta < 0.0 {
            return Err(ElectronCountError("Negative number of electrons is not allowed.".into()).into());
        }
        if nalpha == 0.0 && nbeta == 0.0 {
            return Err(ElectronCountError("At least one alpha or beta electron is required.".into()).into());
        }
        Ok(Self { nalpha, nbeta })
    }

    /// Closed-shell model with `nocc` electrons of each spin.
    pub fn restricted(nocc: f64) -> Result<Self> {
        Self::new(nocc, nocc)
    }

    fn counts(&self, nspin: usize) -> Vec<f64> {
        if nspin == 1 {
            vec![self.nalpha]
        } else {
            vec![self.nalpha, self.nbeta]
        }
    }
}

impl OccModel for AufbauOccModel {
    fn assign(&self, orbs: &mut [Orbitals]) -> Result<()> {
        let counts = self.counts(orbs.len());
        for (orb, nocc) in orbs.iter_mut().zip(counts) {
            if (orb.nfn() as f64) < nocc {
                return Err(ElectronCountError(
                    "The number of orbitals must not be lower than the number of alpha or beta electrons."
                        .into(),
                )
                .into());
            }
            let full = nocc.floor() as usize;
            let frac = nocc - nocc.floor();
            orb.occupations.fill(0.0);
            for i in 0..full {
                orb.occupations[i] = 1.0;
            }
            if frac > 0.0 {
                orb.occupations[full] = frac;
            }
        }
        Ok(())
    }

    fn check_dms(&self, overlap: &DMatrix<f64>, dms: &[DMatrix<f64>], eps: f64) -> Result<()> {
        check_dm_counts(overlap, dms, &self.counts(dms.len()), eps)
    }
}

/// Fills the lowest orbital of either spin, one electron at a time. Only
/// meaningful for unrestricted orbitals.
#[derive(Debug, Clone)]
pub struct AufbauSpinOccModel {
    pub nel: usize,
}

impl AufbauSpinOccModel {
    pub fn new(nel: usize) -> Result<Self> {
        if nel == 0 {
            return Err(ElectronCountError("The number of electrons must be positive.".into()).into());
        }
        Ok(Self { nel })
    }
}

impl OccModel for AufbauSpinOccModel {
    fn assign(&self, orbs: &mut [Orbitals]) -> Result<()> {
        let (alpha, beta) = match orbs {
            [alpha, beta] => (alpha, beta),
            _ => return Err(eyre!("AufbauSpinOccModel needs alpha and beta orbitals")),
        };
        if alpha.nfn() + beta.nfn() < self.nel {
            return Err(ElectronCountError("Not enough orbitals for all electrons.".into()).into());
        }
        alpha.occupations.fill(0.0);
        beta.occupations.fill(0.0);

        let (mut ialpha, mut ibeta) = (0, 0);
        for _ in 0..self.nel {
            let take_alpha = match (ialpha < alpha.nfn(), ibeta < beta.nfn()) {
                (true, true) => alpha.energies[ialpha] <= beta.energies[ibeta],
                (a, _) => a,
            };
            if take_alpha {
                alpha.occupations[ialpha] = 1.0;
                ialpha += 1;
            } else {
                beta.occupations[ibeta] = 1.0;
                ibeta += 1;
            }
        }
        debug!("AufbauSpinOccModel: {} alpha, {} beta", ialpha, ibeta);
        Ok(())
    }

    fn check_dms(&self, overlap: &DMatrix<f64>, dms: &[DMatrix<f64>], eps: f64) -> Result<()> {
        let mut total = 0.0;
        for dm in dms {
            check_dm(dm, overlap, eps, 1.0)?;
            total += (overlap * dm).trace();
        }
        if (total - self.nel as f64).abs() > eps {
            return Err(eyre!("Density matrices hold {:.6} electrons, expected {}", total, self.nel));
        }
        Ok(())
    }
}

/// Fermi-Dirac smearing with a chemical potential per spin.
#[derive(Debug, Clone)]
pub struct FermiOccModel {
    pub nalpha: f64,
    pub nbeta: f64,
    pub temperature: f64,
    pub eps: f64,
}

impl FermiOccModel {
    pub fn new(nalpha: f64, nbeta: f64) -> Result<Self> {
        Self::with_temperature(nalpha, nbeta, 300.0, 1e-8)
    }

    pub fn with_temperature(nalpha: f64, nbeta: f64, temperature: f64, eps: f64) -> Result<Self> {
        let aufbau = AufbauOccModel::new(nalpha, nbeta)?;
        if temperature <= 0.0 {
            return Err(eyre!("The temperature must be strictly positive."));
        }
        if eps <= 0.0 {
            return Err(eyre!("The root-finder threshold (eps) must be strictly positive."));
        }
        Ok(Self {
            nalpha: aufbau.nalpha,
            nbeta: aufbau.nbeta,
            temperature,
            eps,
        })
    }

    fn occupations_at(energies: &DVector<f64>, mu: f64, beta: f64) -> DVector<f64> {
        energies.map(|e| {
            let x = beta * (e - mu);
            // written to avoid overflow on either side
            if x < 0.0 {
                1.0 / (x.exp() + 1.0)
            } else {
                let t = (-x).exp();
                t / (1.0 + t)
            }
        })
    }

    fn counts(&self, nspin: usize) -> Vec<f64> {
        if nspin == 1 {
            vec![self.nalpha]
        } else {
            vec![self.nalpha, self.nbeta]
        }
    }
}

impl OccModel for FermiOccModel {
    fn assign(&self, orbs: &mut [Orbitals]) -> Result<()> {
        let beta = 1.0 / (self.temperature * BOLTZMANN);
        let counts = self.counts(orbs.len());
        for (orb, nocc) in orbs.iter_mut().zip(counts) {
            if (orb.nfn() as f64) < nocc {
                return Err(ElectronCountError("Not enough orbitals for the requested electrons.".into()).into());
            }
            if nocc == 0.0 {
                orb.occupations.fill(0.0);
                continue;
            }
            let error = |mu: f64| Self::occupations_at(&orb.energies, mu, beta).sum() - nocc;

            // bracket the chemical potential, then bisect
            let mid = orb.energies[orb.nfn() / 2];
            let mut lo = mid - 0.1;
            let mut hi = mid + 0.1;
            let mut step = 0.1;
            while error(lo) > 0.0 {
                step *= 2.0;
                lo -= step;
            }
            step = 0.1;
            while error(hi) < 0.0 {
                step *= 2.0;
                hi += step;
            }

            let mut mu = 0.5 * (lo + hi);
            for _ in 0..200 {
                let err = error(mu);
                if err.abs() < self.eps {
                    break;
                }
                if err > 0.0 {
                    hi = mu;
                } else {
                    lo = mu;
                }
                mu = 0.5 * (lo + hi);
            }
            orb.occupations = Self::occupations_at(&orb.energies, mu, beta);
        }
        Ok(())
    }

    fn check_dms(&self, overlap: &DMatrix<f64>, dms: &[DMatrix<f64>], eps: f64) -> Result<()> {
        check_dm_counts(overlap, dms, &self.counts(dms.len()), eps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ElectronCountError;

    fn orbitals_with_energies(energies: &[f64]) -> Orbitals {
        let mut orb = Orbitals::new(energies.len());
        orb.energies = DVector::from_row_slice(energies);
        orb.coeffs = DMatrix::identity(energies.len(), energies.len());
        orb
    }

    #[test]
    fn test_aufbau_integer_and_fractional() {
        let model = AufbauOccModel::new(2.0, 1.5).unwrap();
        let mut orbs = vec![
            orbitals_with_energies(&[-1.0, -0.5, 0.2, 0.4]),
            orbitals_with_energies(&[-0.9, -0.4, 0.3, 0.5]),
        ];
        model.assign(&mut orbs).unwrap();
        assert_eq!(orbs[0].occupations.as_slice(), &[1.0, 1.0, 0.0, 0.0]);
        assert_eq!(orbs[1].occupations.as_slice(), &[1.0, 0.5, 0.0, 0.0]);

        let overlap = DMatrix::identity(4, 4);
        let dms: Vec<DMatrix<f64>> = orbs.iter().map(|o| o.to_dm()).collect();
        model.check_dms(&overlap, &dms, 1e-8).unwrap();
        assert!(model.check_dms(&overlap, &[dms[1].clone(), dms[0].clone()], 1e-8).is_err());
    }

    #[test]
    fn test_aufbau_errors() {
        let err = AufbauOccModel::new(-1.0, 1.0).unwrap_err();
        assert!(err.downcast_ref::<ElectronCountError>().is_some());
        assert!(AufbauOccModel::new(0.0, 0.0).is_err());

        let model = AufbauOccModel::restricted(3.0).unwrap();
        let mut orbs = vec![orbitals_with_energies(&[-1.0, 0.0])];
        let err = model.assign(&mut orbs).unwrap_err();
        assert!(err.downcast_ref::<ElectronCountError>().is_some());
    }

    #[test]
    fn test_aufbau_spin() {
        let model = AufbauSpinOccModel::new(3).unwrap();
        let mut orbs = vec![
            orbitals_with_energies(&[-1.0, -0.3, 0.2]),
            orbitals_with_energies(&[-1.0, -0.5, 0.1]),
        ];
        model.assign(&mut orbs).unwrap();
        // tie on the first level goes to alpha
        assert_eq!(orbs[0].occupations.as_slice(), &[1.0, 0.0, 0.0]);
        assert_eq!(orbs[1].occupations.as_slice(), &[1.0, 1.0, 0.0]);
        assert!(AufbauSpinOccModel::new(0).is_err());
        assert!(model.assign(&mut orbs[..1]).is_err());
    }

    #[test]
    fn test_fermi_counts_and_low_temperature() {
        let model = FermiOccModel::with_temperature(2.0, 1.0, 300.0, 1e-10).unwrap();
        let mut orbs = vec![
            orbitals_with_energies(&[-1.0, -0.5, 0.2, 0.4]),
            orbitals_with_energies(&[-0.9, -0.4, 0.3, 0.5]),
        ];
        model.assign(&mut orbs).unwrap();
        assert!((orbs[0].occupations.sum() - 2.0).abs() < 1e-9);
        assert!((orbs[1].occupations.sum() - 1.0).abs() < 1e-9);
        // kT is tiny compared to the gaps, so this is Aufbau
        assert!((orbs[0].occupations[1] - 1.0).abs() < 1e-9);
        assert!(orbs[0].occupations[2] < 1e-9);

        let hot = FermiOccModel::with_temperature(1.0, 1.0, 1e5, 1e-10).unwrap();
        let mut orbs = vec![orbitals_with_energies(&[-0.1, -0.05, 0.0, 0.05])];
        hot.assign(&mut orbs).unwrap();
        assert!((orbs[0].occupations.sum() - 1.0).abs() < 1e-9);
        assert!(orbs[0].occupations[1] > 0.1 && orbs[0].occupations[1] < orbs[0].occupations[0]);
        assert!(FermiOccModel::with_temperature(1.0, 1.0, 0.0, 1e-8).is_err());
    }

    #[test]
    fn test_fermi_empty_spin_channel() {
        let model = FermiOccModel::with_temperature(1.0, 0.0, 1000.0, 1e-10).unwrap();
        let mut orbs = vec![orbitals_with_energies(&[-0.5, 0.1, 0.3]), Orbitals::new(0)];
        model.assign(&mut orbs).unwrap();
        assert!((orbs[0].occupations.sum() - 1.0).abs() < 1e-9);
        assert_eq!(orbs[1].occupations.len(), 0);

        let mut orbs = vec![
            orbitals_with_energies(&[-0.5, 0.1, 0.3]),
            orbitals_with_energies(&[-0.4, 0.2, 0.4]),
        ];
        model.assign(&mut orbs).unwrap();
        assert_eq!(orbs[1].occupations.as_slice(), &[0.0, 0.0, 0.0]);
    }
}
