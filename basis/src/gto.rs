#![allow(non_snake_case)]
//! Primitive Cartesian Gaussians and their McMurchie-Davidson integrals.

extern crate nalgebra as na;

use crate::basis::Basis;
use crate::helper::boys_function;
use itertools::iproduct;
use na::Vector3;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub struct GTO1d {
    pub alpha: f64,
    pub l: i32,
    pub center: f64,
    pub norm: f64,
}

fn factorial(n: i32) -> f64 {
    (1..=n).fold(1.0, |acc, x| acc * x as f64)
}

impl GTO1d {
    pub fn new(alpha: f64, l: i32, center: f64) -> Self {
        let norm = GTO1d::compute_norm(alpha, l);
        Self {
            alpha,
            l,
            center,
            norm,
        }
    }

    // N^2 = 2^(3l) l! alpha^l sqrt(2 alpha / pi) / (2l)!
    fn compute_norm(alpha: f64, l: i32) -> f64 {
        let numerator = 2.0_f64.powi(3 * l) * factorial(l) * alpha.powi(l);
        let n_squared = numerator * (2.0 * alpha / PI).sqrt() / factorial(2 * l);
        n_squared.sqrt()
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        let x = x - self.center;
        self.norm * x.powi(self.l) * (-self.alpha * x * x).exp()
    }

    pub fn derivative(&self, x: f64) -> f64 {
        let x = x - self.center;
        let gauss = (-self.alpha * x * x).exp();
        let mut val = -2.0 * self.alpha * x.powi(self.l + 1);
        if self.l > 0 {
            val += self.l as f64 * x.powi(self.l - 1);
        }
        self.norm * val * gauss
    }

    #[cfg(test)]
    pub(crate) fn laplacian(&self, x: f64) -> f64 {
        let x = x - self.center;
        let l = self.l as f64;
        let mut val = -2.0 * self.alpha * (2.0 * l + 1.0) * x.powi(self.l)
            + 4.0 * self.alpha * self.alpha * x.powi(self.l + 2);
        if self.l > 1 {
            val += l * (l - 1.0) * x.powi(self.l - 2);
        }
        self.norm * val * (-self.alpha * x * x).exp()
    }

    /// Hermite expansion coefficient E^{ij}_t of the product of two
    /// unnormalised 1-D Gaussians with exponents `a`, `b` and separation
    /// `Qx = A - B`.
    pub fn Eab(i: i32, j: i32, t: i32, Qx: f64, a: f64, b: f64) -> f64 {
        let p = a + b;
        let q = a * b / p;

        if t < 0 || t > i + j || i < 0 || j < 0 {
            return 0.0;
        }
        if i == 0 && j == 0 {
            return (-q * Qx * Qx).exp();
        }
        if j == 0 {
            // X_PA = -(b/p) Qx
            GTO1d::Eab(i - 1, j, t - 1, Qx, a, b) / (2.0 * p)
                - GTO1d::Eab(i - 1, j, t, Qx, a, b) * q * Qx / a
                + GTO1d::Eab(i - 1, j, t + 1, Qx, a, b) * (t + 1) as f64
        } else {
            // X_PB = (a/p) Qx
            GTO1d::Eab(i, j - 1, t - 1, Qx, a, b) / (2.0 * p)
                + GTO1d::Eab(i, j - 1, t, Qx, a, b) * q * Qx / b
                + GTO1d::Eab(i, j - 1, t + 1, Qx, a, b) * (t + 1) as f64
        }
    }

    pub(crate) fn Sab(a: &GTO1d, b: &GTO1d) -> f64 {
        let p = a.alpha + b.alpha;
        let Qx = a.center - b.center;
        GTO1d::Eab(a.l, b.l, 0, Qx, a.alpha, b.alpha) * (PI / p).sqrt() * a.norm * b.norm
    }

    // -1/2 <a| d^2/dx^2 |b>, with the derivative expanded on b
    pub(crate) fn Tab(a: &GTO1d, b: &GTO1d) -> f64 {
        let p = a.alpha + b.alpha;
        let Qx = a.center - b.center;
        let lb = b.l as f64;

        let lower = lb * (lb - 1.0) * GTO1d::Eab(a.l, b.l - 2, 0, Qx, a.alpha, b.alpha);
        let same = -2.0 * b.alpha * (2.0 * lb + 1.0) * GTO1d::Eab(a.l, b.l, 0, Qx, a.alpha, b.alpha);
        let upper = 4.0 * b.alpha * b.alpha * GTO1d::Eab(a.l, b.l + 2, 0, Qx, a.alpha, b.alpha);

        -0.5 * a.norm * b.norm * (PI / p).sqrt() * (lower + same + upper)
    }
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone)]
pub struct GTO {
    pub alpha: f64,
    pub l_xyz: Vector3<i32>,
    pub center: Vector3<f64>,
    pub norm: f64,
    pub gto1d: [GTO1d; 3],
}

/// Table of Hermite Coulomb integrals R^0_{tuv}(p, PC) for t+u+v <= order.
pub struct HermiteCoulomb {
    dim: usize,
    values: Vec<f64>,
}

impl HermiteCoulomb {
    pub fn new(order: usize, p: f64, pc: &Vector3<f64>) -> Self {
        let dim = order + 1;
        let idx = |t: usize, u: usize, v: usize| (t * dim + u) * dim + v;
        let T = p * pc.norm_squared();

        // Build R^n from R^{n+1}, starting at the highest auxiliary index.
        let mut upper = vec![0.0; dim * dim * dim];
        for n in (0..=order).rev() {
            let mut level = vec![0.0; dim * dim * dim];
            level[0] = (-2.0 * p).powi(n as i32) * boys_function(n as i32, T);
            let max_sum = order - n;
            for (t, u, v) in iproduct!(0..=max_sum, 0..=max_sum, 0..=max_sum) {
                if t + u + v == 0 || t + u + v > max_sum {
                    continue;
                }
                let val = if t > 0 {
                    let mut r = pc.x * upper[idx(t - 1, u, v)];
                    if t > 1 {
                        r += (t - 1) as f64 * upper[idx(t - 2, u, v)];
                    }
                    r
                } else if u > 0 {
                    let mut r = pc.y * upper[idx(t, u - 1, v)];
                    if u > 1 {
                        r += (u - 1) as f64 * upper[idx(t, u - 2, v)];
                    }
                    r
                } else {
                    let mut r = pc.z * upper[idx(t, u, v - 1)];
                    if v > 1 {
                        r += (v - 1) as f64 * upper[idx(t, u, v - 2)];
                    }
                    r
                };
                level[idx(t, u, v)] = val;
            }
            upper = level;
        }

        Self { dim, values: upper }
    }

    pub fn get(&self, t: i32, u: i32, v: i32) -> f64 {
        let (t, u, v) = (t as usize, u as usize, v as usize);
        self.values[(t * self.dim + u) * self.dim + v]
    }
}

/// Overlap distribution of two normalised primitives: the combined exponent,
/// the Gaussian product centre and the nonzero Hermite coefficients
/// E_{tuv}, already multiplied by both normalisation constants.
#[derive(Debug, Clone)]
pub struct GaussianProduct {
    pub p: f64,
    pub center: Vector3<f64>,
    pub order: i32,
    pub coeffs: Vec<(i32, i32, i32, f64)>,
}

impl GaussianProduct {
    pub fn new(a: &GTO, b: &GTO) -> Self {
        let p = a.alpha + b.alpha;
        let center = (a.center * a.alpha + b.center * b.alpha) / p;
        let dab = a.center - b.center;
        let lab = a.l_xyz + b.l_xyz;

        let ex: Vec<f64> = (0..=lab.x)
            .map(|t| GTO1d::Eab(a.l_xyz.x, b.l_xyz.x, t, dab.x, a.alpha, b.alpha))
            .collect();
        let ey: Vec<f64> = (0..=lab.y)
            .map(|u| GTO1d::Eab(a.l_xyz.y, b.l_xyz.y, u, dab.y, a.alpha, b.alpha))
            .collect();
        let ez: Vec<f64> = (0..=lab.z)
            .map(|v| GTO1d::Eab(a.l_xyz.z, b.l_xyz.z, v, dab.z, a.alpha, b.alpha))
            .collect();

        let scale = a.norm * b.norm;
        let coeffs = iproduct!(0..=lab.x, 0..=lab.y, 0..=lab.z)
            .map(|(t, u, v)| (t, u, v, scale * ex[t as usize] * ey[u as usize] * ez[v as usize]))
            .filter(|&(_, _, _, e)| e != 0.0)
            .collect();

        Self {
            p,
            center,
            order: lab.x + lab.y + lab.z,
            coeffs,
        }
    }

    /// Attraction energy integral of this distribution to a unit point
    /// charge at `C`, i.e. the integral of ab/|r - C| (positive).
    pub fn potential_at(&self, C: &Vector3<f64>) -> f64 {
        let pc = self.center - C;
        let table = HermiteCoulomb::new(self.order as usize, self.p, &pc);
        let val: f64 = self
            .coeffs
            .iter()
            .map(|&(t, u, v, e)| e * table.get(t, u, v))
            .sum();
        2.0 * PI * val / self.p
    }

    /// Electron repulsion (ab|cd) between two distributions.
    pub fn repulsion(ab: &GaussianProduct, cd: &GaussianProduct) -> f64 {
        let alpha = ab.p * cd.p / (ab.p + cd.p);
        let pq = ab.center - cd.center;
        let table = HermiteCoulomb::new((ab.order + cd.order) as usize, alpha, &pq);

        let mut val = 0.0;
        for &(t, u, v, e1) in &ab.coeffs {
            for &(tau, nu, phi, e2) in &cd.coeffs {
                let sign = if (tau + nu + phi) % 2 == 0 { 1.0 } else { -1.0 };
                val += e1 * e2 * sign * table.get(t + tau, u + nu, v + phi);
            }
        }

        2.0 * PI.powf(2.5) * val / (ab.p * cd.p * (ab.p + cd.p).sqrt())
    }
}

impl GTO {
    pub fn new(alpha: f64, l_xyz: Vector3<i32>, center: Vector3<f64>) -> Self {
        let gto1d = [
            GTO1d::new(alpha, l_xyz.x, center.x),
            GTO1d::new(alpha, l_xyz.y, center.y),
            GTO1d::new(alpha, l_xyz.z, center.z),
        ];
        let norm = gto1d[0].norm * gto1d[1].norm * gto1d[2].norm;
        Self {
            alpha,
            l_xyz,
            center,
            norm,
            gto1d,
        }
    }

    pub fn angular_momentum(&self) -> i32 {
        self.l_xyz.x + self.l_xyz.y + self.l_xyz.z
    }

    pub fn set_center(&mut self, center: Vector3<f64>) {
        *self = GTO::new(self.alpha, self.l_xyz, center);
    }

    #[cfg(test)]
    pub(crate) fn laplacian(&self, r: &Vector3<f64>) -> f64 {
        let [gx, gy, gz] = &self.gto1d;
        gx.laplacian(r.x) * gy.evaluate(r.y) * gz.evaluate(r.z)
            + gx.evaluate(r.x) * gy.laplacian(r.y) * gz.evaluate(r.z)
            + gx.evaluate(r.x) * gy.evaluate(r.y) * gz.laplacian(r.z)
    }
}

impl Basis for GTO {
    fn evaluate(&self, r: &Vector3<f64>) -> f64 {
        self.gto1d[0].evaluate(r.x) * self.gto1d[1].evaluate(r.y) * self.gto1d[2].evaluate(r.z)
    }

    fn gradient(&self, r: &Vector3<f64>) -> Vector3<f64> {
        let [gx, gy, gz] = &self.gto1d;
        let (vx, vy, vz) = (gx.evaluate(r.x), gy.evaluate(r.y), gz.evaluate(r.z));
        Vector3::new(
            gx.derivative(r.x) * vy * vz,
            vx * gy.derivative(r.y) * vz,
            vx * vy * gz.derivative(r.z),
        )
    }

    fn Sab(a: &GTO, b: &GTO) -> f64 {
        GTO1d::Sab(&a.gto1d[0], &b.gto1d[0])
            * GTO1d::Sab(&a.gto1d[1], &b.gto1d[1])
            * GTO1d::Sab(&a.gto1d[2], &b.gto1d[2])
    }

    fn Tab(a: &GTO, b: &GTO) -> f64 {
        let s: Vec<f64> = (0..3).map(|k| GTO1d::Sab(&a.gto1d[k], &b.gto1d[k])).collect();
        let t: Vec<f64> = (0..3).map(|k| GTO1d::Tab(&a.gto1d[k], &b.gto1d[k])).collect();
        t[0] * s[1] * s[2] + s[0] * t[1] * s[2] + s[0] * s[1] * t[2]
    }

    fn Vab(a: &GTO, b: &GTO, R: Vector3<f64>, Z: f64) -> f64 {
        -Z * GaussianProduct::new(a, b).potential_at(&R)
    }

    fn JKabcd(a: &GTO, b: &GTO, c: &GTO, d: &GTO) -> f64 {
        GaussianProduct::repulsion(&GaussianProduct::new(a, b), &GaussianProduct::new(c, d))
    }
}
