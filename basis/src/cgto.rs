/* Contracted gaussian type orbitals (CGTO) built on the primitives in gto.rs,
   and per-element basis sets read from NWChem text.
*/
#![allow(non_snake_case)]

use crate::basis::{AOBasis, Basis};
use crate::gto::{GaussianProduct, GTO};
use color_eyre::eyre::{eyre, Result, WrapErr};
use nalgebra::Vector3;
use periodic_table_on_an_enum::Element;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractedGTO {
    pub primitives: Vec<GTO>,
    pub coefficients: Vec<f64>,
    // s, px, py, pz, dxx, dxy, ...
    pub shell_type: String,
    pub l: i32,
}

impl ContractedGTO {
    /// Builds a contraction and rescales its coefficients so that the
    /// function has unit norm.
    pub fn new(primitives: Vec<GTO>, coefficients: Vec<f64>, shell_type: &str) -> Self {
        let l = primitives.first().map_or(0, |p| p.angular_momentum());
        let mut cgto = Self {
            primitives,
            coefficients,
            shell_type: shell_type.to_string(),
            l,
        };
        cgto.normalize();
        cgto
    }

    fn normalize(&mut self) {
        let norm_sq = ContractedGTO::Sab(self, self);
        if norm_sq > 0.0 {
            let scale = 1.0 / norm_sq.sqrt();
            self.coefficients.iter_mut().for_each(|c| *c *= scale);
        }
    }

    pub fn center(&self) -> Option<Vector3<f64>> {
        self.primitives.first().map(|p| p.center)
    }

    pub fn set_center(&mut self, center: Vector3<f64>) {
        self.primitives.iter_mut().for_each(|p| p.set_center(center));
    }

    /// Contracted overlap distributions of two functions, one per primitive
    /// pair, weighted by the product of contraction coefficients.
    pub fn pair_products(a: &ContractedGTO, b: &ContractedGTO) -> Vec<(f64, GaussianProduct)> {
        let mut res = Vec::with_capacity(a.primitives.len() * b.primitives.len());
        for (pa, ca) in a.primitives.iter().zip(&a.coefficients) {
            for (pb, cb) in b.primitives.iter().zip(&b.coefficients) {
                res.push((ca * cb, GaussianProduct::new(pa, pb)));
            }
        }
        res
    }

    fn contract<F>(a: &ContractedGTO, b: &ContractedGTO, f: F) -> f64
    where
        F: Fn(&GTO, &GTO) -> f64,
    {
        let mut val = 0.0;
        for (pa, ca) in a.primitives.iter().zip(&a.coefficients) {
            for (pb, cb) in b.primitives.iter().zip(&b.coefficients) {
                val += ca * cb * f(pa, pb);
            }
        }
        val
    }
}

impl Basis for ContractedGTO {
    fn evaluate(&self, r: &Vector3<f64>) -> f64 {
        self.primitives
            .iter()
            .zip(&self.coefficients)
            .map(|(p, c)| c * p.evaluate(r))
            .sum()
    }

    fn gradient(&self, r: &Vector3<f64>) -> Vector3<f64> {
        self.primitives
            .iter()
            .zip(&self.coefficients)
            .fold(Vector3::zeros(), |acc, (p, c)| acc + p.gradient(r) * *c)
    }

    fn Sab(a: &ContractedGTO, b: &ContractedGTO) -> f64 {
        ContractedGTO::contract(a, b, GTO::Sab)
    }

    fn Tab(a: &ContractedGTO, b: &ContractedGTO) -> f64 {
        ContractedGTO::contract(a, b, GTO::Tab)
    }

    fn Vab(a: &ContractedGTO, b: &ContractedGTO, R: Vector3<f64>, Z: f64) -> f64 {
        ContractedGTO::contract(a, b, |pa, pb| GTO::Vab(pa, pb, R, Z))
    }

    fn JKabcd(a: &ContractedGTO, b: &ContractedGTO, c: &ContractedGTO, d: &ContractedGTO) -> f64 {
        let ab = ContractedGTO::pair_products(a, b);
        let cd = ContractedGTO::pair_products(c, d);
        ab.iter()
            .flat_map(|(c1, p1)| cd.iter().map(move |(c2, p2)| c1 * c2 * GaussianProduct::repulsion(p1, p2)))
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShellKind {
    S,
    P,
    SP,
    D,
}

impl ShellKind {
    fn parse(token: &str) -> Result<Self> {
        match token.to_uppercase().as_str() {
            "S" => Ok(ShellKind::S),
            "P" => Ok(ShellKind::P),
            "SP" | "L" => Ok(ShellKind::SP),
            "D" => Ok(ShellKind::D),
            other => Err(eyre!("Unsupported shell type: {}", other)),
        }
    }

    // number of coefficient columns after the exponent
    fn ncoeff(self) -> usize {
        match self {
            ShellKind::SP => 2,
            _ => 1,
        }
    }
}

const P_COMPONENTS: [(&str, [i32; 3]); 3] = [("px", [1, 0, 0]), ("py", [0, 1, 0]), ("pz", [0, 0, 1])];

// Cartesian order xx, xy, xz, yy, yz, zz
const D_COMPONENTS: [(&str, [i32; 3]); 6] = [
    ("dxx", [2, 0, 0]),
    ("dxy", [1, 1, 0]),
    ("dxz", [1, 0, 1]),
    ("dyy", [0, 2, 0]),
    ("dyz", [0, 1, 1]),
    ("dzz", [0, 0, 2]),
];

fn parse_number(token: &str) -> Result<f64> {
    token
        .replace(['D', 'd'], "E")
        .parse::<f64>()
        .wrap_err_with(|| format!("Malformed number in basis set: {}", token))
}

fn contract_shell(
    exponents: &[f64],
    coeffs: &[f64],
    components: &[(&str, [i32; 3])],
    center: Vector3<f64>,
) -> Vec<ContractedGTO> {
    components
        .iter()
        .map(|(label, l)| {
            let primitives = exponents
                .iter()
                .map(|&alpha| GTO::new(alpha, Vector3::new(l[0], l[1], l[2]), center))
                .collect();
            ContractedGTO::new(primitives, coeffs.to_vec(), label)
        })
        .collect()
}

/// Contracted functions of one element, centred at the origin until placed
/// on an atom with `set_center`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementBasis {
    pub name: String,
    pub symbol: String,
    pub atomic_number: u32,
    pub basis_set: Vec<Arc<ContractedGTO>>,
}

impl ElementBasis {
    fn build_shell(kind: ShellKind, rows: &[Vec<f64>], center: Vector3<f64>) -> Vec<ContractedGTO> {
        let exponents: Vec<f64> = rows.iter().map(|r| r[0]).collect();
        let first: Vec<f64> = rows.iter().map(|r| r[1]).collect();
        match kind {
            ShellKind::S => contract_shell(&exponents, &first, &[("s", [0, 0, 0])], center),
            ShellKind::P => contract_shell(&exponents, &first, &P_COMPONENTS, center),
            ShellKind::D => contract_shell(&exponents, &first, &D_COMPONENTS, center),
            ShellKind::SP => {
                let second: Vec<f64> = rows.iter().map(|r| r[2]).collect();
                let mut res = contract_shell(&exponents, &first, &[("s", [0, 0, 0])], center);
                res.extend(contract_shell(&exponents, &second, &P_COMPONENTS, center));
                res
            }
        }
    }

    /// Parses one element from NWChem text, e.g.
    ///
    /// ```text
    /// BASIS "ao basis" PRINT
    /// O    S
    ///     130.7093200              0.15432897
    ///      23.8088610              0.53532814
    ///       6.4436083              0.44463454
    /// O    SP
    ///       5.0331513             -0.09996723             0.15591627
    /// ...
    /// END
    /// ```
    pub fn parse_nwchem(input: &str, name: &str) -> Result<Self> {
        let center = Vector3::zeros();
        let mut element: Option<Element> = None;
        let mut shells: Vec<(ShellKind, Vec<Vec<f64>>)> = Vec::new();

        for line in input.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let upper = tokens[0].to_uppercase();
            if upper == "BASIS" || upper == "END" {
                continue;
            }

            if tokens[0].starts_with(|c: char| c.is_ascii_alphabetic()) {
                if tokens.len() < 2 {
                    return Err(eyre!("Malformed shell header: {}", line));
                }
                let el = Element::from_symbol(tokens[0])
                    .ok_or_else(|| eyre!("Unknown element symbol: {}", tokens[0]))?;
                if let Some(prev) = &element {
                    if prev.get_atomic_number() != el.get_atomic_number() {
                        return Err(eyre!(
                            "Basis text mixes elements {} and {}",
                            prev.get_symbol(),
                            el.get_symbol()
                        ));
                    }
                }
                element = Some(el);
                shells.push((ShellKind::parse(tokens[1])?, Vec::new()));
                continue;
            }

            let (kind, rows) = shells
                .last_mut()
                .ok_or_else(|| eyre!("Primitive line before any shell header: {}", line))?;
            if tokens.len() < 1 + kind.ncoeff() {
                return Err(eyre!("Expected {} coefficients in line: {}", kind.ncoeff(), line));
            }
            let row = tokens[..1 + kind.ncoeff()]
                .iter()
                .map(|t| parse_number(t))
                .collect::<Result<Vec<f64>>>()?;
            rows.push(row);
        }

        let element = element.ok_or_else(|| eyre!("No shells found in basis set {}", name))?;
        let mut basis_set = Vec::new();
        for (kind, rows) in &shells {
            if rows.is_empty() {
                return Err(eyre!("Empty {:?} shell for {}", kind, element.get_symbol()));
            }
            basis_set.extend(Self::build_shell(*kind, rows, center).into_iter().map(Arc::new));
        }

        Ok(Self {
            name: name.to_string(),
            symbol: element.get_symbol().to_string(),
            atomic_number: element.get_atomic_number() as u32,
            basis_set,
        })
    }
}

impl AOBasis for ElementBasis {
    type BasisType = ContractedGTO;

    fn basis_size(&self) -> usize {
        self.basis_set.len()
    }

    fn get_basis(&self) -> Vec<Arc<ContractedGTO>> {
        self.basis_set.clone()
    }

    fn set_center(&mut self, center: Vector3<f64>) {
        for cgto in self.basis_set.iter_mut() {
            Arc::make_mut(cgto).set_center(center);
        }
    }

    fn get_center(&self) -> Option<Vector3<f64>> {
        self.basis_set.first().and_then(|b| b.center())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H_STO3G: &str = "\
BASIS \"ao basis\" PRINT
#BASIS SET: (3s) -> [1s]
H    S
      3.42525091             0.15432897
      0.62391373             0.53532814
      0.16885540             0.44463454
END
";

    const C_STO3G: &str = "\
C    S
     71.6168370              0.15432897
     13.0450960              0.53532814
      3.5305122              0.44463454
C    SP
      2.9412494             -0.09996723             0.15591627
      0.6834831              0.39951283             0.60768372
      0.2222899              0.70011547             0.39195739
";

    #[test]
    fn test_parse_hydrogen() {
        let basis = ElementBasis::parse_nwchem(H_STO3G, "sto-3g").unwrap();
        assert_eq!(basis.symbol, "H");
        assert_eq!(basis.atomic_number, 1);
        assert_eq!(basis.basis_size(), 1);
        let s = &basis.basis_set[0];
        assert_eq!(s.primitives.len(), 3);
        assert!((ContractedGTO::Sab(s, s) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_element_basis_serde() {
        let basis = ElementBasis::parse_nwchem(C_STO3G, "sto-3g").unwrap();
        let text = serde_json::to_string(&basis).unwrap();
        let back: ElementBasis = serde_json::from_str(&text).unwrap();
        assert_eq!(back.symbol, "C");
        assert_eq!(back.basis_size(), 5);
        assert!((ContractedGTO::Sab(&back.basis_set[2], &back.basis_set[2]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_parse_sp_shell() {
        let basis = ElementBasis::parse_nwchem(C_STO3G, "sto-3g").unwrap();
        assert_eq!(basis.basis_size(), 5);
        let labels: Vec<&str> = basis.basis_set.iter().map(|b| b.shell_type.as_str()).collect();
        assert_eq!(labels, vec!["s", "s", "px", "py", "pz"]);
        for b in &basis.basis_set {
            assert!((ContractedGTO::Sab(b, b) - 1.0).abs() < 1e-12, "{} not normalised", b.shell_type);
        }
        // s and p on the same centre are orthogonal
        assert!(ContractedGTO::Sab(&basis.basis_set[1], &basis.basis_set[2]).abs() < 1e-14);
    }

    #[test]
    fn test_parse_d_shell_and_fortran_exponent() {
        let text = "N    D\n  0.8000000D+00   1.0000000D+00\n";
        let basis = ElementBasis::parse_nwchem(text, "custom").unwrap();
        assert_eq!(basis.basis_size(), 6);
        assert_eq!(basis.basis_set[1].shell_type, "dxy");
        assert!((basis.basis_set[0].primitives[0].alpha - 0.8).abs() < 1e-15);
        // dxx and dyy overlap is 1/3 for normalised Cartesian d functions
        let s = ContractedGTO::Sab(&basis.basis_set[0], &basis.basis_set[3]);
        assert!((s - 1.0 / 3.0).abs() < 1e-12, "got {}", s);
    }

    #[test]
    fn test_parse_errors() {
        assert!(ElementBasis::parse_nwchem("H    F\n 1.0 1.0\n", "x").is_err());
        assert!(ElementBasis::parse_nwchem("H    S\n 1.0 abc\n", "x").is_err());
        assert!(ElementBasis::parse_nwchem("Xx    S\n 1.0 1.0\n", "x").is_err());
        assert!(ElementBasis::parse_nwchem("H    S\n 1.0 1.0\nHe   S\n 2.0 1.0\n", "x").is_err());
        assert!(ElementBasis::parse_nwchem("# nothing here\n", "x").is_err());
    }

    #[test]
    fn test_set_center() {
        let mut basis = ElementBasis::parse_nwchem(C_STO3G, "sto-3g").unwrap();
        let shared = basis.get_basis();
        let c = Vector3::new(0.5, -1.0, 2.0);
        basis.set_center(c);
        assert_eq!(basis.get_center(), Some(c));
        // earlier handles keep the old centre
        assert_eq!(shared[0].center(), Some(Vector3::zeros()));
        let p = Vector3::new(0.7, -0.4, 1.9);
        let shifted = basis.basis_set[2].evaluate(&p);
        let reference = shared[2].evaluate(&(p - c));
        assert!((shifted - reference).abs() < 1e-14);
    }
}
