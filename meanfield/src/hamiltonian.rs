//! Effective Hamiltonians: a sum of energy terms plus constant external
//! energies, sharing one cache.

use crate::cache::Cache;
use crate::observable::{store_dms, Observable, Restriction};
use color_eyre::eyre::{eyre, Result};
use nalgebra::DMatrix;
use std::collections::HashSet;
use tracing::info;

pub struct EffHam {
    restriction: Restriction,
    terms: Vec<Box<dyn Observable>>,
    external: Vec<(String, f64)>,
    pub cache: Cache,
}

impl EffHam {
    pub fn restricted(terms: Vec<Box<dyn Observable>>, external: Vec<(String, f64)>) -> Result<Self> {
        Self::new(Restriction::Restricted, terms, external)
    }

    pub fn unrestricted(terms: Vec<Box<dyn Observable>>, external: Vec<(String, f64)>) -> Result<Self> {
        Self::new(Restriction::Unrestricted, terms, external)
    }

    pub fn new(restriction: Restriction, terms: Vec<Box<dyn Observable>>, external: Vec<(String, f64)>) -> Result<Self> {
        if terms.is_empty() {
            return Err(eyre!("At least one energy term is required"));
        }
        let mut labels = HashSet::new();
        for term in &terms {
            if term.restriction() != restriction {
                return Err(eyre!(
                    "Term '{}' is {:?} but the Hamiltonian is {:?}",
                    term.label(),
                    term.restriction(),
                    restriction
                ));
            }
            if !labels.insert(term.label().to_string()) {
                return Err(eyre!("Duplicate term label '{}'", term.label()));
            }
        }
        for (key, _) in &external {
            if !labels.insert(key.clone()) {
                return Err(eyre!("Duplicate term label '{}'", key));
            }
        }
        Ok(Self {
            restriction,
            terms,
            external,
            cache: Cache::new(),
        })
    }

    pub fn restriction(&self) -> Restriction {
        self.restriction
    }

    pub fn ndm(&self) -> usize {
        self.restriction.ndm()
    }

    pub fn deriv_scale(&self) -> f64 {
        self.restriction.deriv_scale()
    }

    pub fn terms(&self) -> &[Box<dyn Observable>] {
        &self.terms
    }

    fn check_count(&self, what: &str, n: usize) -> Result<()> {
        if n != self.ndm() {
            return Err(eyre!("Expected {} {}, got {}", self.ndm(), what, n));
        }
        Ok(())
    }

    /// Forgets everything derived from the previous density matrices and
    /// stores new ones.
    pub fn reset(&mut self, dms: &[DMatrix<f64>]) -> Result<()> {
        self.check_count("density matrices", dms.len())?;
        self.cache.clear();
        store_dms(&mut self.cache, self.restriction, dms, "", "");
        Ok(())
    }

    /// Replaces the delta density matrices used by `compute_dot_hessian`.
    pub fn reset_delta(&mut self, deltas: &[DMatrix<f64>]) -> Result<()> {
        self.check_count("delta density matrices", deltas.len())?;
        self.cache.clear_tagged('d');
        store_dms(&mut self.cache, self.restriction, deltas, "delta_", "d");
        Ok(())
    }

    pub fn compute_energy(&mut self) -> Result<f64> {
        let mut total = 0.0;
        for term in &self.terms {
            let energy = term.compute_energy(&mut self.cache)?;
            self.cache.insert_scalar(&format!("energy_{}", term.label()), energy, "");
            total += energy;
        }
        for (key, energy) in &self.external {
            self.cache.insert_scalar(&format!("energy_{}", key), *energy, "");
            total += energy;
        }
        self.cache.insert_scalar("energy", total, "");
        Ok(total)
    }

    /// Overwrites `focks` with the Fock matrices of the current density.
    pub fn compute_fock(&mut self, focks: &mut [DMatrix<f64>]) -> Result<()> {
        self.check_count("Fock matrices", focks.len())?;
        for fock in focks.iter_mut() {
            fock.fill(0.0);
        }
        for term in &self.terms {
            term.add_fock(&mut self.cache, focks)?;
        }
        Ok(())
    }

    pub fn compute_dot_hessian(&mut self, outputs: &mut [DMatrix<f64>]) -> Result<()> {
        self.check_count("output matrices", outputs.len())?;
        for output in outputs.iter_mut() {
            output.fill(0.0);
        }
        for term in &self.terms {
            term.add_dot_hessian(&mut self.cache, outputs)?;
        }
        Ok(())
    }

    /// Energy contributions from the last `compute_energy`, in term order.
    pub fn energy_breakdown(&self) -> Result<Vec<(String, f64)>> {
        let labels = self
            .terms
            .iter()
            .map(|t| t.label().to_string())
            .chain(self.external.iter().map(|(k, _)| k.clone()));
        let mut breakdown = Vec::new();
        for label in labels {
            let energy = self.cache.scalar(&format!("energy_{}", label))?;
            breakdown.push((label, energy));
        }
        breakdown.push(("total".to_string(), self.cache.scalar("energy")?));
        Ok(breakdown)
    }

    pub fn log_energy(&self) -> Result<()> {
        info!("Contributions to the energy:");
        for (label, energy) in self.energy_breakdown()? {
            info!("  {:>12}  {:>20.12}", label, energy);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observable::TwoIndexTerm;

    fn one_body(label: &str, restriction: Restriction) -> Box<dyn Observable> {
        Box::new(TwoIndexTerm::new(
            DMatrix::from_row_slice(2, 2, &[1.0, 0.5, 0.5, 2.0]),
            label,
            restriction,
        ))
    }

    #[test]
    fn test_construction_errors() {
        assert!(EffHam::restricted(vec![], vec![]).is_err());
        assert!(EffHam::restricted(vec![one_body("kin", Restriction::Unrestricted)], vec![]).is_err());
        assert!(EffHam::restricted(
            vec![one_body("kin", Restriction::Restricted), one_body("kin", Restriction::Restricted)],
            vec![]
        )
        .is_err());
        assert!(EffHam::restricted(vec![one_body("nn", Restriction::Restricted)], vec![("nn".into(), 1.0)]).is_err());
    }

    #[test]
    fn test_energy_bookkeeping() {
        let mut ham = EffHam::unrestricted(
            vec![one_body("kin", Restriction::Unrestricted)],
            vec![("nn".into(), 0.25)],
        )
        .unwrap();
        assert_eq!(ham.ndm(), 2);
        assert_eq!(ham.deriv_scale(), 1.0);
        assert!(ham.reset(&[DMatrix::identity(2, 2)]).is_err());

        let dma = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 0.0]);
        let dmb = DMatrix::from_row_slice(2, 2, &[0.0, 0.0, 0.0, 1.0]);
        ham.reset(&[dma, dmb]).unwrap();
        let energy = ham.compute_energy().unwrap();
        assert!((energy - 3.25).abs() < 1e-14);
        assert_eq!(ham.cache.scalar("energy_kin").unwrap(), 3.0);
        assert_eq!(ham.cache.scalar("energy_nn").unwrap(), 0.25);
        let breakdown = ham.energy_breakdown().unwrap();
        assert_eq!(breakdown.last().unwrap().0, "total");

        let mut focks = vec![DMatrix::<f64>::from_element(2, 2, 7.0); 2];
        ham.compute_fock(&mut focks).unwrap();
        assert_eq!(focks[1][(0, 1)], 0.5);

        let keys = ham.cache.keys();
        ham.reset_delta(&[DMatrix::identity(2, 2), DMatrix::identity(2, 2)]).unwrap();
        assert!(ham.cache.contains("delta_dm_full"));
        let mut dots = vec![DMatrix::<f64>::from_element(2, 2, 7.0); 2];
        ham.compute_dot_hessian(&mut dots).unwrap();
        assert_eq!(dots[0].norm(), 0.0);
        ham.cache.clear_tagged('d');
        assert_eq!(ham.cache.keys(), keys);
    }
}
