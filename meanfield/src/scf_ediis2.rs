//! EDIIS far from convergence, CDIIS close to it, and a blend in between.

use crate::scf_cdiis::Cdiis;
use crate::scf_diis::{DiisHistory, DiisMethod, DiisScfSolver, DiisStep};
use crate::scf_ediis::Ediis;
use color_eyre::eyre::Result;

#[derive(Debug, Clone, Copy)]
pub struct Ediis2 {
    /// Above this squared error only EDIIS is used.
    pub ediis_threshold: f64,
    /// Below this squared error only CDIIS is used.
    pub cdiis_threshold: f64,
}

impl Default for Ediis2 {
    fn default() -> Self {
        Self {
            ediis_threshold: 0.1,
            cdiis_threshold: 1e-4,
        }
    }
}

impl DiisMethod for Ediis2 {
    fn name(&self) -> &'static str {
        "EDIIS+DIIS"
    }

    fn needs_energy(&self) -> bool {
        true
    }

    fn step(&self, history: &DiisHistory) -> Result<DiisStep> {
        let errorsq = history.max_normsq();
        if errorsq > self.ediis_threshold {
            return Ediis.step(history);
        }
        if errorsq < self.cdiis_threshold {
            return Cdiis.step(history);
        }
        let weight = errorsq / self.ediis_threshold;
        let ediis = Ediis.step(history)?;
        let cdiis = Cdiis.step(history)?;
        Ok(DiisStep {
            coeffs: ediis.coeffs * weight + cdiis.coeffs * (1.0 - weight),
            method: 'M',
            energy: None,
        })
    }
}

pub type Ediis2ScfSolver = DiisScfSolver<Ediis2>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scf_diis::tests::toy_history;

    #[test]
    fn test_regimes() {
        let method = Ediis2::default();

        let far = toy_history(&[1.0, 0.5], &[-1.0, -1.2]);
        assert_eq!(method.step(&far).unwrap().method, 'E');

        let close = toy_history(&[1e-3, -5e-4], &[-1.0, -1.2]);
        assert_eq!(method.step(&close).unwrap().method, 'C');

        // max squared error 0.05 gives equal weights
        let t = 0.05f64.sqrt() / 2.0f64.sqrt();
        let middle = toy_history(&[t, -0.5 * t], &[-1.0, -1.2]);
        let step = method.step(&middle).unwrap();
        assert_eq!(step.method, 'M');
        let ediis = Ediis.step(&middle).unwrap().coeffs;
        let cdiis = Cdiis.step(&middle).unwrap().coeffs;
        let expected = (ediis + cdiis) * 0.5;
        assert!((&step.coeffs - &expected).norm() < 1e-12);
        assert!((step.coeffs.sum() - 1.0).abs() < 1e-12);
    }
}
