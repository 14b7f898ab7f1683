#![allow(dead_code)]

use basis::OrbitalBasis;
use meanfield::app::{build_geometry, build_hamiltonian, BasisRegistry, Geometry, Integrals, NwchemLoader};
use meanfield::config::{Config, Method};
use meanfield::guess::guess_core_hamiltonian;
use meanfield::observable::Restriction;
use meanfield::occ::{AufbauOccModel, OccModel};
use meanfield::orbitals::Orbitals;
use meanfield::EffHam;
use nalgebra::DMatrix;
use rand::thread_rng;
use rand_distr::{Distribution, Normal};

pub const H2: &str = "
geometry:
  - element: H
    coords: [0.0, 0.0, 0.0]
  - element: H
    coords: [0.0, 0.0, 1.4]
";

pub const WATER: &str = "
geometry:
  - element: O
    coords: [0.0, -0.143225816552, 0.0]
  - element: H
    coords: [1.638036840407, 1.136548822547, 0.0]
  - element: H
    coords: [-1.638036840407, 1.136548822547, 0.0]
";

pub const WATER_ENERGY: f64 = -74.942079928192;
pub const WATER_NUCNUC: f64 = 8.002367061810450;

pub fn basis_dir() -> String {
    format!("{}/tests/basis_sets", env!("CARGO_MANIFEST_DIR"))
}

/// Parses a geometry block plus extra YAML, pointing the basis directory at
/// the bundled STO-3G files.
pub fn config(geometry: &str, extra: &str) -> Config {
    let text = format!("{}\nbasis:\n  directory: \"{}\"\n{}", geometry, basis_dir(), extra);
    serde_yml::from_str::<Config>(&text).unwrap().with_defaults()
}

pub struct Model {
    pub geometry: Geometry,
    pub basis: OrbitalBasis,
    pub integrals: Integrals,
    pub ham: EffHam,
}

pub fn model(config: &Config, method: Method, restriction: Restriction) -> Model {
    let geometry = build_geometry(config).unwrap();
    let names: Vec<String> = geometry.symbols().iter().map(|s| config.basis_for(s)).collect();
    let mut registry = BasisRegistry::new(NwchemLoader {
        directory: config.basis_directory(),
    });
    let basis = registry.build(&geometry, &names).unwrap();
    let integrals = Integrals::compute(&basis, &geometry);
    let ham = build_hamiltonian(method, restriction, &basis, &geometry, &integrals, &config.grid_params()).unwrap();
    Model {
        geometry,
        basis,
        integrals,
        ham,
    }
}

/// Core-Hamiltonian density matrices with aufbau occupations.
pub fn core_guess_dms(integrals: &Integrals, restriction: Restriction, nalpha: f64, nbeta: f64) -> Vec<DMatrix<f64>> {
    let nbasis = integrals.overlap.nrows();
    let mut orbs: Vec<Orbitals> = (0..restriction.ndm()).map(|_| Orbitals::new(nbasis)).collect();
    guess_core_hamiltonian(&integrals.overlap, &integrals.core(), &mut orbs).unwrap();
    AufbauOccModel::new(nalpha, nbeta).unwrap().assign(&mut orbs).unwrap();
    orbs.iter().map(|o| o.to_dm()).collect()
}

/// Random symmetric matrix with entries of size `scale`.
pub fn random_symmetric(n: usize, scale: f64) -> DMatrix<f64> {
    let normal = Normal::new(0.0, scale).unwrap();
    let mut rng = thread_rng();
    let m = DMatrix::from_fn(n, n, |_, _| normal.sample(&mut rng));
    (&m + m.transpose()) * 0.5
}

/// `s Σ_σ tr(F_σ Δ_σ)`
pub fn directional_derivative(ham: &EffHam, focks: &[DMatrix<f64>], deltas: &[DMatrix<f64>]) -> f64 {
    let sum: f64 = focks.iter().zip(deltas).map(|(f, d)| f.dot(d)).sum();
    sum * ham.deriv_scale()
}
