#![allow(non_snake_case)]
use libm::erf;
use std::f64::consts::PI;

#[cfg(test)]
pub(crate) use quadrature::*;

/// Boys function F_m(T) = ∫_0^1 t^{2m} exp(-T t^2) dt.
///
/// Small arguments use a Taylor expansion, intermediate ones the
/// convergent series
///
///   F_m(T) = exp(-T) Σ_k (2T)^k / [(2m+1)(2m+3)...(2m+2k+1)]
///
/// and large ones the erf form of F_0 followed by upward recursion, which
/// is stable for T > m.
pub fn boys_function(m: i32, T: f64) -> f64 {
    let mf = m as f64;
    if T < 1e-12 {
        return 1.0 / (2.0 * mf + 1.0) - T / (2.0 * mf + 3.0);
    }

    if T <= 30.0 {
        let mut denom = 2.0 * mf + 1.0;
        let mut term = 1.0 / denom;
        let mut sum = term;
        for _ in 0..500 {
            denom += 2.0;
            term *= 2.0 * T / denom;
            sum += term;
            if term < 1e-17 * sum {
                break;
            }
        }
        return (-T).exp() * sum;
    }

    let mut f = 0.5 * (PI / T).sqrt() * erf(T.sqrt());
    let exp_t = (-T).exp();
    for k in 0..m {
        f = ((2.0 * k as f64 + 1.0) * f - exp_t) / (2.0 * T);
    }
    f
}


// Simpson quadrature used to check analytic integrals
#[cfg(test)]
mod quadrature {
    use nalgebra::Vector3;
    use rayon::prelude::*;

    pub(crate) fn simpson_integration<F>(f: F, a: f64, b: f64, n: usize) -> f64
    where
        F: Fn(f64) -> f64,
    {
        let n = if n % 2 == 0 { n } else { n + 1 };
        let h = (b - a) / n as f64;

        let mut sum = f(a) + f(b);
        for i in 1..n {
            let x = a + i as f64 * h;
            sum += simpson_weight(i, n) * f(x);
        }
        sum * h / 3.0
    }

    fn simpson_weight(i: usize, n: usize) -> f64 {
        if i == 0 || i == n {
            1.0
        } else if i % 2 == 1 {
            4.0
        } else {
            2.0
        }
    }

    /// Parallel Simpson's rule over the box `[a, b]`, `n` subdivisions per axis.
    pub(crate) fn simpson_integration_3d<F>(f: F, a: Vector3<f64>, b: Vector3<f64>, n: usize) -> f64
    where
        F: Fn(&Vector3<f64>) -> f64 + Sync,
    {
        let n = if n % 2 == 0 { n } else { n + 1 };
        let h = (b - a) / n as f64;

        let sum: f64 = (0..=n)
            .into_par_iter()
            .map(|i| {
                let mut partial = 0.0;
                for j in 0..=n {
                    for k in 0..=n {
                        let r = Vector3::new(
                            a.x + i as f64 * h.x,
                            a.y + j as f64 * h.y,
                            a.z + k as f64 * h.z,
                        );
                        let w = simpson_weight(i, n) * simpson_weight(j, n) * simpson_weight(k, n);
                        partial += w * f(&r);
                    }
                }
                partial
            })
            .sum();

        sum * h.x * h.y * h.z / 27.0
    }
}
