//! Energy terms of an effective Hamiltonian.
//!
//! Every term reads the density matrices from a shared [`Cache`] and adds its
//! contribution to the energy, the Fock matrices and the dot hessian. The
//! dot hessian is the directional derivative of the Fock matrices along the
//! delta density matrices, divided by the derivative scale of the
//! restriction, so that
//!
//! `E(D + xΔ) ≈ E + x s Σ tr(F Δ) + ½ x² s² Σ tr(dot Δ)`.

use crate::cache::Cache;
use basis::ElectronRepulsion;
use color_eyre::eyre::{eyre, Result};
use nalgebra::DMatrix;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restriction {
    Restricted,
    Unrestricted,
}

impl Restriction {
    /// Number of density (and Fock) matrices.
    pub fn ndm(self) -> usize {
        match self {
            Restriction::Restricted => 1,
            Restriction::Unrestricted => 2,
        }
    }

    pub fn deriv_scale(self) -> f64 {
        match self {
            Restriction::Restricted => 2.0,
            Restriction::Unrestricted => 1.0,
        }
    }

    pub(crate) fn spin_keys(self) -> &'static [&'static str] {
        match self {
            Restriction::Restricted => &["alpha"],
            Restriction::Unrestricted => &["alpha", "beta"],
        }
    }
}

/// Stores `dm_alpha` (and `dm_beta`) together with the derived `dm_full` and
/// `dm_spin`.
pub(crate) fn store_dms(cache: &mut Cache, restriction: Restriction, dms: &[DMatrix<f64>], prefix: &str, tags: &str) {
    match restriction {
        Restriction::Restricted => {
            cache.insert_matrix(&format!("{}dm_alpha", prefix), dms[0].clone(), tags);
            cache.insert_matrix(&format!("{}dm_full", prefix), &dms[0] * 2.0, tags);
            cache.insert_matrix(
                &format!("{}dm_spin", prefix),
                DMatrix::zeros(dms[0].nrows(), dms[0].ncols()),
                tags,
            );
        }
        Restriction::Unrestricted => {
            cache.insert_matrix(&format!("{}dm_alpha", prefix), dms[0].clone(), tags);
            cache.insert_matrix(&format!("{}dm_beta", prefix), dms[1].clone(), tags);
            cache.insert_matrix(&format!("{}dm_full", prefix), &dms[0] + &dms[1], tags);
            cache.insert_matrix(&format!("{}dm_spin", prefix), &dms[0] - &dms[1], tags);
        }
    }
}

/// Density matrices per spin, as stored by the Hamiltonian.
pub(crate) fn spin_dms(cache: &Cache, restriction: Restriction) -> Result<Vec<&DMatrix<f64>>> {
    restriction
        .spin_keys()
        .iter()
        .map(|spin| cache.matrix(&format!("dm_{}", spin)))
        .collect()
}

/// Delta density matrices per spin, as stored by `reset_delta`.
pub(crate) fn spin_deltas(cache: &Cache, restriction: Restriction) -> Result<Vec<&DMatrix<f64>>> {
    restriction
        .spin_keys()
        .iter()
        .map(|spin| cache.matrix(&format!("delta_dm_{}", spin)))
        .collect()
}

fn check_outputs(label: &str, restriction: Restriction, outputs: &[DMatrix<f64>]) -> Result<()> {
    if outputs.len() != restriction.ndm() {
        return Err(eyre!(
            "Term '{}' expects {} output matrices, got {}",
            label,
            restriction.ndm(),
            outputs.len()
        ));
    }
    Ok(())
}

pub trait Observable: Send + Sync {
    fn label(&self) -> &str;

    fn restriction(&self) -> Restriction;

    fn compute_energy(&self, cache: &mut Cache) -> Result<f64>;

    /// Adds this term's Fock contribution to `focks`, one matrix per spin.
    fn add_fock(&self, cache: &mut Cache, focks: &mut [DMatrix<f64>]) -> Result<()>;

    /// Adds the dot hessian along the delta density matrices in the cache.
    fn add_dot_hessian(&self, cache: &mut Cache, outputs: &mut [DMatrix<f64>]) -> Result<()>;
}

/// A fixed one-body operator such as the kinetic energy or the nuclear
/// attraction.
pub struct TwoIndexTerm {
    op: DMatrix<f64>,
    label: String,
    restriction: Restriction,
}

impl TwoIndexTerm {
    pub fn new(op: DMatrix<f64>, label: &str, restriction: Restriction) -> Self {
        Self {
            op,
            label: label.to_string(),
            restriction,
        }
    }
}

impl Observable for TwoIndexTerm {
    fn label(&self) -> &str {
        &self.label
    }

    fn restriction(&self) -> Restriction {
        self.restriction
    }

    fn compute_energy(&self, cache: &mut Cache) -> Result<f64> {
        let dms = spin_dms(cache, self.restriction)?;
        let energy: f64 = dms.iter().map(|dm| self.op.dot(dm)).sum();
        Ok(self.restriction.deriv_scale() * energy)
    }

    fn add_fock(&self, _cache: &mut Cache, focks: &mut [DMatrix<f64>]) -> Result<()> {
        check_outputs(&self.label, self.restriction, focks)?;
        for fock in focks.iter_mut() {
            *fock += &self.op;
        }
        Ok(())
    }

    fn add_dot_hessian(&self, _cache: &mut Cache, outputs: &mut [DMatrix<f64>]) -> Result<()> {
        check_outputs(&self.label, self.restriction, outputs)
    }
}

/// Classical Coulomb (Hartree) repulsion of the total electron density.
pub struct DirectTerm {
    er: Arc<ElectronRepulsion>,
    label: String,
    restriction: Restriction,
}

impl DirectTerm {
    pub fn new(er: Arc<ElectronRepulsion>, label: &str, restriction: Restriction) -> Self {
        Self {
            er,
            label: label.to_string(),
            restriction,
        }
    }

    /// `J[D_full]`, computed once per density.
    fn coulomb(&self, cache: &mut Cache) -> Result<DMatrix<f64>> {
        let key = format!("op_{}", self.label);
        let er = &self.er;
        let op = cache.load_matrix_with(&key, "", |c| Ok(er.coulomb(c.matrix("dm_full")?)))?;
        Ok(op.clone())
    }
}

impl Observable for DirectTerm {
    fn label(&self) -> &str {
        &self.label
    }

    fn restriction(&self) -> Restriction {
        self.restriction
    }

    fn compute_energy(&self, cache: &mut Cache) -> Result<f64> {
        let op = self.coulomb(cache)?;
        Ok(0.5 * op.dot(cache.matrix("dm_full")?))
    }

    fn add_fock(&self, cache: &mut Cache, focks: &mut [DMatrix<f64>]) -> Result<()> {
        check_outputs(&self.label, self.restriction, focks)?;
        let op = self.coulomb(cache)?;
        for fock in focks.iter_mut() {
            *fock += &op;
        }
        Ok(())
    }

    fn add_dot_hessian(&self, cache: &mut Cache, outputs: &mut [DMatrix<f64>]) -> Result<()> {
        check_outputs(&self.label, self.restriction, outputs)?;
        let delta = self.er.coulomb(cache.matrix("delta_dm_full")?) / self.restriction.deriv_scale();
        for output in outputs.iter_mut() {
            *output += &delta;
        }
        Ok(())
    }
}

/// Exact (Hartree-Fock) exchange, optionally scaled for hybrid functionals.
pub struct ExchangeTerm {
    er: Arc<ElectronRepulsion>,
    label: String,
    restriction: Restriction,
    fraction: f64,
}

impl ExchangeTerm {
    pub fn new(er: Arc<ElectronRepulsion>, label: &str, restriction: Restriction) -> Self {
        Self::with_fraction(er, label, restriction, 1.0)
    }

    pub fn with_fraction(er: Arc<ElectronRepulsion>, label: &str, restriction: Restriction, fraction: f64) -> Self {
        Self {
            er,
            label: label.to_string(),
            restriction,
            fraction,
        }
    }

    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    /// `K[D_σ]` for every spin, computed once per density.
    fn exchange(&self, cache: &mut Cache) -> Result<Vec<DMatrix<f64>>> {
        let er = &self.er;
        self.restriction
            .spin_keys()
            .iter()
            .map(|spin| {
                let key = format!("op_{}_{}", self.label, spin);
                let dm_key = format!("dm_{}", spin);
                cache
                    .load_matrix_with(&key, "", |c| Ok(er.exchange(c.matrix(&dm_key)?)))
                    .cloned()
            })
            .collect()
    }
}

impl Observable for ExchangeTerm {
    fn label(&self) -> &str {
        &self.label
    }

    fn restriction(&self) -> Restriction {
        self.restriction
    }

    fn compute_energy(&self, cache: &mut Cache) -> Result<f64> {
        let ops = self.exchange(cache)?;
        let dms = spin_dms(cache, self.restriction)?;
        let energy: f64 = ops.iter().zip(dms).map(|(op, dm)| op.dot(dm)).sum();
        Ok(-0.5 * self.fraction * self.restriction.deriv_scale() * energy)
    }

    fn add_fock(&self, cache: &mut Cache, focks: &mut [DMatrix<f64>]) -> Result<()> {
        check_outputs(&self.label, self.restriction, focks)?;
        let ops = self.exchange(cache)?;
        for (fock, op) in focks.iter_mut().zip(ops) {
            *fock -= op * self.fraction;
        }
        Ok(())
    }

    fn add_dot_hessian(&self, cache: &mut Cache, outputs: &mut [DMatrix<f64>]) -> Result<()> {
        check_outputs(&self.label, self.restriction, outputs)?;
        let scale = self.fraction / self.restriction.deriv_scale();
        let deltas = spin_deltas(cache, self.restriction)?;
        for (output, delta) in outputs.iter_mut().zip(deltas) {
            *output -= self.er.exchange(delta) * scale;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basis::{ElementBasis, OrbitalBasis};
    use nalgebra::Vector3;

    const H_STO3G: &str = "\
H    S
      3.42525091             0.15432897
      0.62391373             0.53532814
      0.16885540             0.44463454
";

    fn h2_eri() -> Arc<ElectronRepulsion> {
        let h = ElementBasis::parse_nwchem(H_STO3G, "sto-3g").unwrap();
        let coords = vec![Vector3::zeros(), Vector3::new(0.0, 0.0, 1.4)];
        let basis = OrbitalBasis::new(&coords, &[&h, &h]).unwrap();
        Arc::new(basis.compute_electron_repulsion())
    }

    fn dm(a: f64, b: f64, c: f64) -> DMatrix<f64> {
        DMatrix::from_row_slice(2, 2, &[a, b, b, c])
    }

    #[test]
    fn test_restricted_matches_unrestricted_for_closed_shells() {
        let er = h2_eri();
        let dma = dm(0.3, 0.25, 0.35);

        let mut rcache = Cache::new();
        store_dms(&mut rcache, Restriction::Restricted, &[dma.clone()], "", "");
        let mut ucache = Cache::new();
        store_dms(&mut ucache, Restriction::Unrestricted, &[dma.clone(), dma.clone()], "", "");

        let terms: Vec<(Box<dyn Observable>, Box<dyn Observable>)> = vec![
            (
                Box::new(TwoIndexTerm::new(dm(-1.0, -0.9, -1.0), "one", Restriction::Restricted)),
                Box::new(TwoIndexTerm::new(dm(-1.0, -0.9, -1.0), "one", Restriction::Unrestricted)),
            ),
            (
                Box::new(DirectTerm::new(er.clone(), "hartree", Restriction::Restricted)),
                Box::new(DirectTerm::new(er.clone(), "hartree", Restriction::Unrestricted)),
            ),
            (
                Box::new(ExchangeTerm::with_fraction(er.clone(), "x_hf", Restriction::Restricted, 0.7)),
                Box::new(ExchangeTerm::with_fraction(er.clone(), "x_hf", Restriction::Unrestricted, 0.7)),
            ),
        ];

        for (rterm, uterm) in &terms {
            let er_ = rterm.compute_energy(&mut rcache).unwrap();
            let eu = uterm.compute_energy(&mut ucache).unwrap();
            assert!((er_ - eu).abs() < 1e-12, "{}: {} vs {}", rterm.label(), er_, eu);

            let mut rfock = vec![DMatrix::<f64>::zeros(2, 2)];
            let mut ufock = vec![DMatrix::<f64>::zeros(2, 2), DMatrix::zeros(2, 2)];
            rterm.add_fock(&mut rcache, &mut rfock).unwrap();
            uterm.add_fock(&mut ucache, &mut ufock).unwrap();
            assert!((&rfock[0] - &ufock[0]).norm() < 1e-12);
            assert!((&rfock[0] - &ufock[1]).norm() < 1e-12);
        }
        assert!(rcache.contains("op_hartree"));
        assert!(ucache.contains("op_x_hf_beta"));
    }

    #[test]
    fn test_fock_is_energy_gradient() {
        let er = h2_eri();
        for restriction in [Restriction::Restricted, Restriction::Unrestricted] {
            let term = ExchangeTerm::new(er.clone(), "x_hf", restriction);
            let hartree = DirectTerm::new(er.clone(), "hartree", restriction);
            let dms: Vec<DMatrix<f64>> = (0..restriction.ndm())
                .map(|i| dm(0.3 + 0.1 * i as f64, 0.2, 0.4))
                .collect();
            let deltas: Vec<DMatrix<f64>> = (0..restriction.ndm())
                .map(|i| dm(0.01, -0.02 * (i as f64 + 1.0), 0.015))
                .collect();

            let energy_at = |x: f64| {
                let shifted: Vec<DMatrix<f64>> = dms.iter().zip(&deltas).map(|(d, dd)| d + dd * x).collect();
                let mut cache = Cache::new();
                store_dms(&mut cache, restriction, &shifted, "", "");
                term.compute_energy(&mut cache).unwrap() + hartree.compute_energy(&mut cache).unwrap()
            };

            let mut cache = Cache::new();
            store_dms(&mut cache, restriction, &dms, "", "");
            store_dms(&mut cache, restriction, &deltas, "delta_", "d");
            let mut focks = vec![DMatrix::<f64>::zeros(2, 2); restriction.ndm()];
            term.add_fock(&mut cache, &mut focks).unwrap();
            hartree.add_fock(&mut cache, &mut focks).unwrap();
            let mut dots = vec![DMatrix::<f64>::zeros(2, 2); restriction.ndm()];
            term.add_dot_hessian(&mut cache, &mut dots).unwrap();
            hartree.add_dot_hessian(&mut cache, &mut dots).unwrap();

            let s = restriction.deriv_scale();
            let slope: f64 = focks.iter().zip(&deltas).map(|(f, d)| f.dot(d)).sum::<f64>() * s;
            let curvature: f64 = dots.iter().zip(&deltas).map(|(f, d)| f.dot(d)).sum::<f64>() * s * s;

            // the energy is exactly quadratic along the line
            let h = 0.5;
            let e0 = energy_at(0.0);
            let numerical_slope = (energy_at(h) - energy_at(-h)) / (2.0 * h);
            let numerical_curvature = (energy_at(h) - 2.0 * e0 + energy_at(-h)) / (h * h);
            assert!((slope - numerical_slope).abs() < 1e-12, "{:?}", restriction);
            assert!((curvature - numerical_curvature).abs() < 1e-10, "{:?}", restriction);
        }
    }

    #[test]
    fn test_wrong_output_count() {
        let term = TwoIndexTerm::new(DMatrix::identity(2, 2), "kin", Restriction::Unrestricted);
        let mut cache = Cache::new();
        let mut focks = vec![DMatrix::<f64>::zeros(2, 2)];
        assert!(term.add_fock(&mut cache, &mut focks).is_err());
        // missing density matrices
        assert!(term.compute_energy(&mut cache).is_err());
    }
}
