//! Molecular integrals over all contracted functions of a molecule.

use crate::basis::{AOBasis, Basis};
use crate::cgto::{ContractedGTO, ElementBasis};
use crate::gto::GaussianProduct;
use color_eyre::eyre::{eyre, Result};
use nalgebra::{DMatrix, Vector3};
use rayon::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct OrbitalBasis {
    pub functions: Vec<Arc<ContractedGTO>>,
    // index of the atom each function sits on
    pub atoms: Vec<usize>,
}

impl OrbitalBasis {
    /// Places one element basis on every centre.
    pub fn new(centers: &[Vector3<f64>], bases: &[&ElementBasis]) -> Result<Self> {
        if centers.len() != bases.len() {
            return Err(eyre!(
                "Got {} centres but {} element basis sets",
                centers.len(),
                bases.len()
            ));
        }
        let mut functions = Vec::new();
        let mut atoms = Vec::new();
        for (iatom, (center, basis)) in centers.iter().zip(bases).enumerate() {
            let mut placed = (*basis).clone();
            placed.set_center(*center);
            atoms.extend(std::iter::repeat(iatom).take(placed.basis_size()));
            functions.extend(placed.get_basis());
        }
        Ok(Self { functions, atoms })
    }

    /// Union of two bases. Atom indices of `b` are shifted past those of `a`.
    pub fn concatenate(a: &OrbitalBasis, b: &OrbitalBasis) -> Self {
        let offset = a.atoms.iter().max().map_or(0, |m| m + 1);
        let mut functions = a.functions.clone();
        functions.extend(b.functions.iter().cloned());
        let mut atoms = a.atoms.clone();
        atoms.extend(b.atoms.iter().map(|i| i + offset));
        Self { functions, atoms }
    }

    pub fn nbasis(&self) -> usize {
        self.functions.len()
    }

    fn symmetric_matrix<F>(&self, f: F) -> DMatrix<f64>
    where
        F: Fn(&ContractedGTO, &ContractedGTO) -> f64 + Sync,
    {
        let n = self.nbasis();
        let pairs: Vec<(usize, usize)> = (0..n).flat_map(|i| (0..=i).map(move |j| (i, j))).collect();
        let values: Vec<f64> = pairs
            .par_iter()
            .map(|&(i, j)| f(&self.functions[i], &self.functions[j]))
            .collect();
        let mut mat = DMatrix::zeros(n, n);
        for (&(i, j), v) in pairs.iter().zip(values) {
            mat[(i, j)] = v;
            mat[(j, i)] = v;
        }
        mat
    }

    pub fn compute_overlap(&self) -> DMatrix<f64> {
        self.symmetric_matrix(ContractedGTO::Sab)
    }

    /// Overlap between the functions of `self` (rows) and `other` (columns).
    pub fn compute_overlap_with(&self, other: &OrbitalBasis) -> DMatrix<f64> {
        DMatrix::from_fn(self.nbasis(), other.nbasis(), |i, j| {
            ContractedGTO::Sab(&self.functions[i], &other.functions[j])
        })
    }

    pub fn compute_kinetic(&self) -> DMatrix<f64> {
        self.symmetric_matrix(ContractedGTO::Tab)
    }

    /// Attraction to point nuclei, negative definite.
    pub fn compute_nuclear_attraction(&self, coords: &[Vector3<f64>], charges: &[f64]) -> DMatrix<f64> {
        self.symmetric_matrix(|a, b| {
            coords
                .iter()
                .zip(charges)
                .map(|(r, z)| ContractedGTO::Vab(a, b, *r, *z))
                .sum()
        })
    }

    /// All (μν|λσ), computed once per symmetry-unique quartet.
    pub fn compute_electron_repulsion(&self) -> ElectronRepulsion {
        let n = self.nbasis();
        let pairs: Vec<(usize, usize)> = (0..n).flat_map(|i| (0..=i).map(move |j| (i, j))).collect();
        let products: Vec<Vec<(f64, GaussianProduct)>> = pairs
            .par_iter()
            .map(|&(i, j)| ContractedGTO::pair_products(&self.functions[i], &self.functions[j]))
            .collect();

        let quartets: Vec<(usize, usize)> = (0..pairs.len())
            .flat_map(|ij| (0..=ij).map(move |kl| (ij, kl)))
            .collect();
        let values: Vec<f64> = quartets
            .par_iter()
            .map(|&(ij, kl)| {
                let mut val = 0.0;
                for (c1, p1) in &products[ij] {
                    for (c2, p2) in &products[kl] {
                        val += c1 * c2 * GaussianProduct::repulsion(p1, p2);
                    }
                }
                val
            })
            .collect();

        let mut eri = ElectronRepulsion::zeros(n);
        for (&(ij, kl), v) in quartets.iter().zip(values) {
            let (i, j) = pairs[ij];
            let (k, l) = pairs[kl];
            eri.set_symmetric(i, j, k, l, v);
        }
        eri
    }

    /// Basis function values, one row per point.
    pub fn compute_grid_values(&self, points: &[Vector3<f64>]) -> DMatrix<f64> {
        let n = self.nbasis();
        let rows: Vec<f64> = points
            .par_iter()
            .flat_map_iter(|r| self.functions.iter().map(move |f| f.evaluate(r)))
            .collect();
        DMatrix::from_row_slice(points.len(), n, &rows)
    }

    /// Cartesian derivatives of the basis functions, one matrix per axis
    /// with the same layout as `compute_grid_values`.
    pub fn compute_grid_gradients(&self, points: &[Vector3<f64>]) -> [DMatrix<f64>; 3] {
        let n = self.nbasis();
        let grads: Vec<Vector3<f64>> = points
            .par_iter()
            .flat_map_iter(|r| self.functions.iter().map(move |f| f.gradient(r)))
            .collect();
        let axis = |k: usize| {
            let vals: Vec<f64> = grads.iter().map(|g| g[k]).collect();
            DMatrix::from_row_slice(points.len(), n, &vals)
        };
        [axis(0), axis(1), axis(2)]
    }
}

/// Dense electron repulsion tensor in chemists' notation.
#[derive(Debug, Clone)]
pub struct ElectronRepulsion {
    n: usize,
    data: Vec<f64>,
}

impl ElectronRepulsion {
    pub fn zeros(n: usize) -> Self {
        Self {
            n,
            data: vec![0.0; n * n * n * n],
        }
    }

    pub fn nbasis(&self) -> usize {
        self.n
    }

    fn index(&self, i: usize, j: usize, k: usize, l: usize) -> usize {
        ((i * self.n + j) * self.n + k) * self.n + l
    }

    pub fn get(&self, i: usize, j: usize, k: usize, l: usize) -> f64 {
        self.data[self.index(i, j, k, l)]
    }

    fn set_symmetric(&mut self, i: usize, j: usize, k: usize, l: usize, v: f64) {
        for (a, b, c, d) in [
            (i, j, k, l),
            (j, i, k, l),
            (i, j, l, k),
            (j, i, l, k),
            (k, l, i, j),
            (l, k, i, j),
            (k, l, j, i),
            (l, k, j, i),
        ] {
            let idx = self.index(a, b, c, d);
            self.data[idx] = v;
        }
    }

    /// J_μν = Σ_λσ (μν|λσ) D_λσ
    pub fn coulomb(&self, dm: &DMatrix<f64>) -> DMatrix<f64> {
        let n = self.n;
        let vals: Vec<f64> = (0..n * n)
            .into_par_iter()
            .map(|mn| {
                let block = &self.data[mn * n * n..(mn + 1) * n * n];
                let mut acc = 0.0;
                for l in 0..n {
                    for s in 0..n {
                        acc += block[l * n + s] * dm[(l, s)];
                    }
                }
                acc
            })
            .collect();
        DMatrix::from_row_slice(n, n, &vals)
    }

    /// K_μν = Σ_λσ (μλ|νσ) D_λσ
    pub fn exchange(&self, dm: &DMatrix<f64>) -> DMatrix<f64> {
        let n = self.n;
        let vals: Vec<f64> = (0..n * n)
            .into_par_iter()
            .map(|mn| {
                let (m, nu) = (mn / n, mn % n);
                let mut acc = 0.0;
                for l in 0..n {
                    for s in 0..n {
                        acc += self.get(m, l, nu, s) * dm[(l, s)];
                    }
                }
                acc
            })
            .collect();
        DMatrix::from_row_slice(n, n, &vals)
    }
}

/// Repulsion energy of point nuclei.
pub fn compute_nucnuc(coords: &[Vector3<f64>], charges: &[f64]) -> f64 {
    let mut energy = 0.0;
    for i in 0..coords.len() {
        for j in 0..i {
            energy += charges[i] * charges[j] / (coords[i] - coords[j]).norm();
        }
    }
    energy
}

#[cfg(test)]
mod tests {
    use super::*;

    const H_STO3G: &str = "\
H    S
      3.42525091             0.15432897
      0.62391373             0.53532814
      0.16885540             0.44463454
";

    fn h2() -> (OrbitalBasis, Vec<Vector3<f64>>, Vec<f64>) {
        let h = ElementBasis::parse_nwchem(H_STO3G, "sto-3g").unwrap();
        let coords = vec![Vector3::zeros(), Vector3::new(0.0, 0.0, 1.4)];
        let basis = OrbitalBasis::new(&coords, &[&h, &h]).unwrap();
        (basis, coords, vec![1.0, 1.0])
    }

    #[test]
    fn test_h2_one_electron() {
        let (basis, coords, charges) = h2();
        assert_eq!(basis.nbasis(), 2);
        assert_eq!(basis.atoms, vec![0, 1]);

        let s = basis.compute_overlap();
        assert!((s[(0, 0)] - 1.0).abs() < 1e-10);
        assert!((s[(0, 1)] - 0.6593).abs() < 1e-4, "S12 = {}", s[(0, 1)]);

        let t = basis.compute_kinetic();
        assert!((t[(0, 0)] - 0.7600).abs() < 1e-4, "T11 = {}", t[(0, 0)]);
        assert!((t[(0, 1)] - 0.2365).abs() < 1e-4, "T12 = {}", t[(0, 1)]);

        let core = &t + basis.compute_nuclear_attraction(&coords, &charges);
        assert!((core[(0, 0)] + 1.1204).abs() < 1e-4, "H11 = {}", core[(0, 0)]);
        assert!((core[(0, 1)] + 0.9584).abs() < 1e-4, "H12 = {}", core[(0, 1)]);
        assert!((core[(0, 1)] - core[(1, 0)]).abs() < 1e-14);

        assert!((compute_nucnuc(&coords, &charges) - 1.0 / 1.4).abs() < 1e-14);
    }

    #[test]
    fn test_h2_electron_repulsion() {
        let (basis, _, _) = h2();
        let eri = basis.compute_electron_repulsion();
        assert!((eri.get(0, 0, 0, 0) - 0.7746).abs() < 1e-4);
        assert!((eri.get(0, 0, 1, 1) - 0.5697).abs() < 1e-4);
        assert!((eri.get(1, 0, 0, 0) - 0.4441).abs() < 1e-4);
        assert!((eri.get(1, 0, 1, 0) - 0.2970).abs() < 1e-4);
        assert_eq!(eri.get(0, 1, 0, 0), eri.get(0, 0, 1, 0));
        assert_eq!(eri.get(1, 1, 0, 0), eri.get(0, 0, 1, 1));
    }

    #[test]
    fn test_coulomb_exchange_contractions() {
        let (basis, _, _) = h2();
        let eri = basis.compute_electron_repulsion();
        let dm = DMatrix::from_row_slice(2, 2, &[0.3, 0.2, 0.2, 0.5]);
        let j = eri.coulomb(&dm);
        let k = eri.exchange(&dm);
        for (m, n) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
            let mut jv = 0.0;
            let mut kv = 0.0;
            for l in 0..2 {
                for s in 0..2 {
                    jv += eri.get(m, n, l, s) * dm[(l, s)];
                    kv += eri.get(m, l, n, s) * dm[(l, s)];
                }
            }
            assert!((j[(m, n)] - jv).abs() < 1e-14);
            assert!((k[(m, n)] - kv).abs() < 1e-14);
        }
    }

    #[test]
    fn test_grid_values_and_cross_overlap() {
        let (basis, coords, _) = h2();
        let points = vec![Vector3::new(0.1, 0.2, 0.3), Vector3::new(-0.5, 0.0, 1.0)];
        let values = basis.compute_grid_values(&points);
        let grads = basis.compute_grid_gradients(&points);
        assert_eq!(values.shape(), (2, 2));
        for (ip, r) in points.iter().enumerate() {
            for (ib, f) in basis.functions.iter().enumerate() {
                assert_eq!(values[(ip, ib)], f.evaluate(r));
                assert_eq!(grads[2][(ip, ib)], f.gradient(r).z);
            }
        }

        let single = OrbitalBasis::new(&coords[..1], &[&ElementBasis::parse_nwchem(H_STO3G, "sto-3g").unwrap()]).unwrap();
        let cross = basis.compute_overlap_with(&single);
        assert_eq!(cross.shape(), (2, 1));
        assert!((cross[(0, 0)] - 1.0).abs() < 1e-10);

        let both = OrbitalBasis::concatenate(&basis, &single);
        assert_eq!(both.nbasis(), 3);
        assert_eq!(both.atoms, vec![0, 1, 2]);
        assert!(OrbitalBasis::new(&coords, &[]).is_err());
    }
}
