//! Exchange-correlation functionals: LDA exchange, Perdew-Wang 92
//! correlation, PBE exchange and correlation, and the PBE0 hybrid.

use crate::gridgroup::{finite_difference_potential, DensityPoint, GridObservable, PotentialPoint};
use color_eyre::eyre::{eyre, Result};
use nalgebra::Vector3;
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

const RHO_TINY: f64 = 1e-14;

const PBE_KAPPA: f64 = 0.804;
const PBE_MU: f64 = 0.219_514_972_764_517_1;
const PBE_BETA: f64 = 0.066_724_550_603_149_22;

fn pbe_gamma() -> f64 {
    (1.0 - 2f64.ln()) / (PI * PI)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XcKind {
    LdaX,
    LdaCPw,
    GgaXPbe,
    GgaCPbe,
    /// PBE0: three quarters of PBE exchange plus PBE correlation.
    HybGgaXcPbeh,
}

impl XcKind {
    pub fn name(self) -> &'static str {
        match self {
            XcKind::LdaX => "lda_x",
            XcKind::LdaCPw => "lda_c_pw",
            XcKind::GgaXPbe => "gga_x_pbe",
            XcKind::GgaCPbe => "gga_c_pbe",
            XcKind::HybGgaXcPbeh => "hyb_gga_xc_pbeh",
        }
    }
}

impl FromStr for XcKind {
    type Err = color_eyre::eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "lda_x" => Ok(XcKind::LdaX),
            "lda_c_pw" => Ok(XcKind::LdaCPw),
            "gga_x_pbe" => Ok(XcKind::GgaXPbe),
            "gga_c_pbe" => Ok(XcKind::GgaCPbe),
            "hyb_gga_xc_pbeh" => Ok(XcKind::HybGgaXcPbeh),
            other => Err(eyre!("Unknown functional '{}'", other)),
        }
    }
}

impl fmt::Display for XcKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
pub struct XcFunctional {
    kind: XcKind,
    label: String,
}

impl XcFunctional {
    pub fn new(kind: XcKind) -> Self {
        Self {
            kind,
            label: format!("xc_{}", kind.name()),
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Ok(Self::new(name.parse()?))
    }

    pub fn kind(&self) -> XcKind {
        self.kind
    }

    /// Fraction of exact exchange this functional expects alongside it.
    pub fn exx_fraction(&self) -> f64 {
        match self.kind {
            XcKind::HybGgaXcPbeh => 0.25,
            _ => 0.0,
        }
    }
}

impl GridObservable for XcFunctional {
    fn label(&self) -> &str {
        &self.label
    }

    fn needs_gradient(&self) -> bool {
        matches!(self.kind, XcKind::GgaXPbe | XcKind::GgaCPbe | XcKind::HybGgaXcPbeh)
    }

    fn energy_density(&self, p: &DensityPoint) -> f64 {
        match self.kind {
            XcKind::LdaX => lda_x(p),
            XcKind::LdaCPw => lda_c_pw(p),
            XcKind::GgaXPbe => gga_x_pbe(p).0,
            XcKind::GgaCPbe => gga_c_pbe(p),
            XcKind::HybGgaXcPbeh => 0.75 * gga_x_pbe(p).0 + gga_c_pbe(p),
        }
    }

    fn potential(&self, p: &DensityPoint) -> PotentialPoint {
        match self.kind {
            XcKind::LdaX => lda_x_potential(p),
            XcKind::LdaCPw => finite_difference_potential(lda_c_pw, p, false),
            XcKind::GgaXPbe => gga_x_pbe(p).1,
            XcKind::GgaCPbe => finite_difference_potential(gga_c_pbe, p, true),
            XcKind::HybGgaXcPbeh => gga_x_pbe(p)
                .1
                .scaled(0.75)
                .add(&finite_difference_potential(gga_c_pbe, p, true)),
        }
    }
}

fn lda_x_coeff() -> f64 {
    -0.75 * (6.0 / PI).powf(1.0 / 3.0)
}

/// Spin-resolved Slater exchange.
pub fn lda_x(p: &DensityPoint) -> f64 {
    p.rho.iter().map(|&r| lda_x_coeff() * r.max(0.0).powf(4.0 / 3.0)).sum()
}

fn lda_x_potential(p: &DensityPoint) -> PotentialPoint {
    PotentialPoint {
        v: p.rho.map(|r| 4.0 / 3.0 * lda_x_coeff() * r.max(0.0).cbrt()),
        g: [Vector3::zeros(); 2],
    }
}

/// `G(rs)` of Perdew and Wang.
fn pw_g(rs: f64, a: f64, alpha1: f64, beta: [f64; 4]) -> f64 {
    let srs = rs.sqrt();
    let denom = 2.0 * a * (beta[0] * srs + beta[1] * rs + beta[2] * rs * srs + beta[3] * rs * rs);
    -2.0 * a * (1.0 + alpha1 * rs) * (1.0 + 1.0 / denom).ln()
}

/// Correlation energy per particle of the uniform electron gas.
pub fn pw92_epsilon(rs: f64, zeta: f64) -> f64 {
    const FZ20: f64 = 1.709_921;
    let ec0 = pw_g(rs, 0.031_091, 0.213_70, [7.5957, 3.5876, 1.6382, 0.492_94]);
    let ec1 = pw_g(rs, 0.015_545, 0.205_48, [14.1189, 6.1977, 3.3662, 0.625_17]);
    let alpha_c = -pw_g(rs, 0.016_887, 0.111_25, [10.357, 3.6231, 0.880_26, 0.496_71]);

    let zeta = zeta.clamp(-1.0, 1.0);
    let fz = ((1.0 + zeta).powf(4.0 / 3.0) + (1.0 - zeta).powf(4.0 / 3.0) - 2.0) / (2f64.powf(4.0 / 3.0) - 2.0);
    let z4 = zeta.powi(4);
    ec0 + alpha_c * fz * (1.0 - z4) / FZ20 + (ec1 - ec0) * fz * z4
}

fn rs_zeta(p: &DensityPoint) -> Option<(f64, f64, f64)> {
    let ra = p.rho[0].max(0.0);
    let rb = p.rho[1].max(0.0);
    let rho = ra + rb;
    if rho < RHO_TINY {
        return None;
    }
    let rs = (3.0 / (4.0 * PI * rho)).cbrt();
    Some((rho, rs, (ra - rb) / rho))
}

/// Perdew-Wang 92 correlation, spin polarised.
pub fn lda_c_pw(p: &DensityPoint) -> f64 {
    match rs_zeta(p) {
        Some((rho, rs, zeta)) => rho * pw92_epsilon(rs, zeta),
        None => 0.0,
    }
}

/// Unpolarised PBE exchange: energy density and its partial derivatives
/// with respect to the density and the density gradient.
fn pbe_x_unpolarized(rho: f64, grad: Vector3<f64>) -> (f64, f64, Vector3<f64>) {
    if rho < RHO_TINY {
        return (0.0, 0.0, Vector3::zeros());
    }
    let cx = -0.75 * (3.0 / PI).cbrt();
    let e_lda = cx * rho.powf(4.0 / 3.0);
    let de_lda = 4.0 / 3.0 * cx * rho.cbrt();

    let g = grad.norm();
    let denom = 2.0 * (3.0 * PI * PI).cbrt() * rho.powf(4.0 / 3.0);
    let s = g / denom;

    let t = 1.0 + PBE_MU / PBE_KAPPA * s * s;
    let fx = 1.0 + PBE_KAPPA - PBE_KAPPA / t;
    let dfx_ds = 2.0 * PBE_MU * s / (t * t);

    let ds_drho = -4.0 / 3.0 * s / rho;
    let ds_dgrad = if g > 1e-14 { grad / (g * denom) } else { Vector3::zeros() };

    let e = e_lda * fx;
    let de_drho = de_lda * fx + e_lda * dfx_ds * ds_drho;
    let de_dgrad = ds_dgrad * (e_lda * dfx_ds);
    (e, de_drho, de_dgrad)
}

/// PBE exchange through the spin-scaling relation
/// `E[ρα, ρβ] = ½ (E[2ρα] + E[2ρβ])`, with its analytic potential.
pub fn gga_x_pbe(p: &DensityPoint) -> (f64, PotentialPoint) {
    let mut energy = 0.0;
    let mut pot = PotentialPoint::zeros();
    for spin in 0..2 {
        let (e, v, g) = pbe_x_unpolarized(2.0 * p.rho[spin], p.grad[spin] * 2.0);
        energy += 0.5 * e;
        pot.v[spin] = v;
        pot.g[spin] = g;
    }
    (energy, pot)
}

/// PBE correlation: PW92 plus the gradient correction `H(rs, ζ, t)`.
pub fn gga_c_pbe(p: &DensityPoint) -> f64 {
    let (rho, rs, zeta) = match rs_zeta(p) {
        Some(v) => v,
        None => return 0.0,
    };
    let gamma = pbe_gamma();
    let ec = pw92_epsilon(rs, zeta);

    let phi = 0.5 * ((1.0 + zeta).powf(2.0 / 3.0) + (1.0 - zeta).powf(2.0 / 3.0));
    let phi3 = phi.powi(3);
    let kf = (3.0 * PI * PI * rho).cbrt();
    let ks = (4.0 * kf / PI).sqrt();
    let grad = (p.grad[0] + p.grad[1]).norm();
    let t = grad / (2.0 * phi * ks * rho);
    let t2 = t * t;

    let expo = (-ec / (gamma * phi3)).exp_m1();
    let h = if expo > 0.0 {
        let a = PBE_BETA / gamma / expo;
        let at2 = a * t2;
        let frac = (1.0 + at2) / (1.0 + at2 + at2 * at2);
        gamma * phi3 * (1.0 + PBE_BETA / gamma * t2 * frac).ln()
    } else {
        0.0
    };
    rho * (ec + h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::DiracExchange;

    fn point(ra: f64, rb: f64, ga: Vector3<f64>, gb: Vector3<f64>) -> DensityPoint {
        DensityPoint::new([ra, rb], [ga, gb])
    }

    #[test]
    fn test_names() {
        let f = XcFunctional::from_name("gga_x_pbe").unwrap();
        assert_eq!(f.label(), "xc_gga_x_pbe");
        assert!(f.needs_gradient());
        assert_eq!(f.exx_fraction(), 0.0);
        assert_eq!(XcFunctional::from_name("hyb_gga_xc_pbeh").unwrap().exx_fraction(), 0.25);
        assert!(!XcFunctional::from_name("LDA_X").unwrap().needs_gradient());
        assert!(XcFunctional::from_name("mgga_x_tpss").is_err());
        assert_eq!(XcKind::LdaCPw.to_string(), "lda_c_pw");
    }

    #[test]
    fn test_lda_x_matches_dirac() {
        let p = point(0.3, 0.1, Vector3::zeros(), Vector3::zeros());
        let lda = XcFunctional::new(XcKind::LdaX);
        let dirac = DiracExchange::default();
        assert!((lda.energy_density(&p) - dirac.energy_density(&p)).abs() < 1e-14);
        let (a, b) = (lda.potential(&p), dirac.potential(&p));
        assert!((a.v[0] - b.v[0]).abs() < 1e-14);
        assert!((a.v[1] - b.v[1]).abs() < 1e-14);
    }

    #[test]
    fn test_pw92_reference_values() {
        assert!((pw92_epsilon(1.0, 0.0) + 0.0598).abs() < 2e-4);
        assert!((pw92_epsilon(1.0, 1.0) + 0.0316).abs() < 2e-4);
        // polarisation lowers the magnitude of the correlation energy
        assert!(pw92_epsilon(2.0, 0.5) > pw92_epsilon(2.0, 0.0));
        let rho = 3.0 / (4.0 * PI);
        let p = point(rho / 2.0, rho / 2.0, Vector3::zeros(), Vector3::zeros());
        assert!((lda_c_pw(&p) - rho * pw92_epsilon(1.0, 0.0)).abs() < 1e-12);
        assert_eq!(lda_c_pw(&point(0.0, 0.0, Vector3::zeros(), Vector3::zeros())), 0.0);
    }

    #[test]
    fn test_pbe_reduces_to_lda_without_gradient() {
        let p = point(0.25, 0.15, Vector3::zeros(), Vector3::zeros());
        assert!((gga_x_pbe(&p).0 - lda_x(&p)).abs() < 1e-14);
        assert!((gga_c_pbe(&p) - lda_c_pw(&p)).abs() < 1e-14);
    }

    #[test]
    fn test_pbe_gradient_corrections() {
        let g = Vector3::new(0.3, -0.1, 0.2);
        let p = point(0.25, 0.15, g, g * 0.5);
        let lda = point(0.25, 0.15, Vector3::zeros(), Vector3::zeros());
        // exchange is enhanced, bounded by 1 + κ
        assert!(gga_x_pbe(&p).0 < lda_x(&lda));
        let huge = point(0.25, 0.15, g * 1e6, g * 1e6);
        assert!(gga_x_pbe(&huge).0 / lda_x(&lda) < 1.0 + PBE_KAPPA + 1e-10);
        // correlation is reduced
        assert!(gga_c_pbe(&p) > lda_c_pw(&lda));
        assert!(gga_c_pbe(&p) < 0.0);
    }

    #[test]
    fn test_pbe_x_analytic_potential() {
        let p = point(0.25, 0.15, Vector3::new(0.3, -0.1, 0.2), Vector3::new(0.05, 0.1, -0.2));
        let (_, analytic) = gga_x_pbe(&p);
        let numeric = finite_difference_potential(|q| gga_x_pbe(q).0, &p, true);
        for s in 0..2 {
            assert!((analytic.v[s] - numeric.v[s]).abs() < 1e-7, "{} {}", analytic.v[s], numeric.v[s]);
            assert!((analytic.g[s] - numeric.g[s]).norm() < 1e-7);
        }
    }

    #[test]
    fn test_pbeh_combination() {
        let p = point(0.2, 0.2, Vector3::new(0.1, 0.0, 0.0), Vector3::new(0.1, 0.0, 0.0));
        let pbeh = XcFunctional::new(XcKind::HybGgaXcPbeh);
        let expected = 0.75 * gga_x_pbe(&p).0 + gga_c_pbe(&p);
        assert_eq!(pbeh.energy_density(&p), expected);
        let pot = pbeh.potential(&p);
        let x = XcFunctional::new(XcKind::GgaXPbe).potential(&p);
        let c = XcFunctional::new(XcKind::GgaCPbe).potential(&p);
        assert!((pot.v[0] - (0.75 * x.v[0] + c.v[0])).abs() < 1e-12);
    }
}
