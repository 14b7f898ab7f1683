//! Configuration of a mean-field run.
//!
//! The YAML file deserialises into [`Config`]. Every section and field is
//! optional; [`Config::with_defaults`] fills in whatever was left out and
//! [`Config::with_overrides`] applies the command-line options on top.

mod args;

pub use args::Args;

use crate::grid::GridParams;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub geometry: Vec<Atom>,
    pub units: Option<Units>,
    pub charge: Option<i32>,
    pub multiplicity: Option<usize>,
    pub restricted: Option<bool>,
    pub basis: Option<BasisParams>,
    pub method: Option<Method>,
    pub scf: Option<ScfParams>,
    pub occupation: Option<OccupationParams>,
    pub grid: Option<GridSection>,
    pub checkpoint: Option<String>,
    pub restart: Option<String>,
}

/// Atomic position configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Atom {
    pub element: String,
    pub coords: [f64; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    Bohr,
    Angstrom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Hf,
    Hfs,
    Lda,
    Pbe,
    Pbe0,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Hf => "HF",
            Method::Hfs => "HFS",
            Method::Lda => "LDA",
            Method::Pbe => "PBE",
            Method::Pbe0 => "PBE0",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    Plain,
    Oda,
    Cdiis,
    Ediis,
    Ediis2,
}

impl SolverKind {
    /// Convergence threshold used when none is configured.
    pub fn default_threshold(self) -> f64 {
        match self {
            SolverKind::Plain | SolverKind::Oda => 1e-8,
            SolverKind::Cdiis | SolverKind::Ediis | SolverKind::Ediis2 => 1e-6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OccupationKind {
    Aufbau,
    Fermi,
}

/// Basis set selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BasisParams {
    pub name: Option<String>,
    pub directory: Option<String>,
    pub per_element: Option<HashMap<String, String>>,
}

impl Default for BasisParams {
    fn default() -> Self {
        BasisParams {
            name: Some("sto-3g".to_string()),
            directory: Some("tests/basis_sets".to_string()),
            per_element: Some(HashMap::new()),
        }
    }
}

impl BasisParams {
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.name.is_none() {
            self.name = defaults.name;
        }
        if self.directory.is_none() {
            self.directory = defaults.directory;
        }
        if self.per_element.is_none() {
            self.per_element = defaults.per_element;
        }
        self
    }
}

/// SCF solver parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScfParams {
    pub solver: Option<SolverKind>,
    pub threshold: Option<f64>,
    pub max_iter: Option<usize>,
    pub nvector: Option<usize>,
    pub level_shift: Option<f64>,
    pub prune_old_states: Option<bool>,
}

impl Default for ScfParams {
    fn default() -> Self {
        ScfParams {
            solver: Some(SolverKind::Cdiis),
            threshold: None,
            max_iter: Some(128),
            nvector: Some(6),
            level_shift: Some(0.0),
            prune_old_states: Some(false),
        }
    }
}

impl ScfParams {
    /// Apply default values to any missing parameters. A missing threshold
    /// stays unset, its default depends on the solver.
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.solver.is_none() {
            self.solver = defaults.solver;
        }
        if self.max_iter.is_none() {
            self.max_iter = defaults.max_iter;
        }
        if self.nvector.is_none() {
            self.nvector = defaults.nvector;
        }
        if self.level_shift.is_none() {
            self.level_shift = defaults.level_shift;
        }
        if self.prune_old_states.is_none() {
            self.prune_old_states = defaults.prune_old_states;
        }
        self
    }
}

/// Occupation model parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OccupationParams {
    pub model: Option<OccupationKind>,
    /// Kelvin, only used by the Fermi model
    pub temperature: Option<f64>,
}

impl Default for OccupationParams {
    fn default() -> Self {
        OccupationParams {
            model: Some(OccupationKind::Aufbau),
            temperature: Some(300.0),
        }
    }
}

impl OccupationParams {
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.model.is_none() {
            self.model = defaults.model;
        }
        if self.temperature.is_none() {
            self.temperature = defaults.temperature;
        }
        self
    }
}

/// Integration grid parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GridSection {
    pub radial_points: Option<usize>,
    pub theta_points: Option<usize>,
}

impl Default for GridSection {
    fn default() -> Self {
        let params = GridParams::default();
        GridSection {
            radial_points: Some(params.radial_points),
            theta_points: Some(params.theta_points),
        }
    }
}

impl GridSection {
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.radial_points.is_none() {
            self.radial_points = defaults.radial_points;
        }
        if self.theta_points.is_none() {
            self.theta_points = defaults.theta_points;
        }
        self
    }
}

impl Config {
    /// Apply defaults to all configuration sections
    pub fn with_defaults(mut self) -> Self {
        self.units.get_or_insert(Units::Bohr);
        self.charge.get_or_insert(0);
        let multiplicity = *self.multiplicity.get_or_insert(1);
        self.restricted.get_or_insert(multiplicity == 1);
        self.method.get_or_insert(Method::Hf);
        self.basis = Some(self.basis.take().unwrap_or_default().with_defaults());
        self.scf = Some(self.scf.take().unwrap_or_default().with_defaults());
        self.occupation = Some(self.occupation.take().unwrap_or_default().with_defaults());
        self.grid = Some(self.grid.take().unwrap_or_default().with_defaults());
        self
    }

    /// Command-line options take precedence over the file.
    pub fn with_overrides(mut self, args: &Args) -> Self {
        if let Some(charge) = args.charge {
            self.charge = Some(charge);
        }
        if let Some(multiplicity) = args.multiplicity {
            self.multiplicity = Some(multiplicity);
            if multiplicity != 1 {
                self.restricted = Some(false);
            }
        }
        if args.unrestricted {
            self.restricted = Some(false);
        }
        if let Some(method) = args.method {
            self.method = Some(method);
        }
        let mut scf = self.scf.take().unwrap_or_default();
        if let Some(solver) = args.solver {
            scf.solver = Some(solver);
        }
        if let Some(threshold) = args.threshold {
            scf.threshold = Some(threshold);
        }
        if let Some(max_iter) = args.max_iter {
            scf.max_iter = Some(max_iter);
        }
        self.scf = Some(scf);
        self.with_defaults()
    }

    pub fn units(&self) -> Units {
        self.units.unwrap_or(Units::Bohr)
    }

    pub fn charge(&self) -> i32 {
        self.charge.unwrap_or(0)
    }

    pub fn multiplicity(&self) -> usize {
        self.multiplicity.unwrap_or(1)
    }

    pub fn is_restricted(&self) -> bool {
        self.restricted.unwrap_or(self.multiplicity() == 1)
    }

    pub fn method(&self) -> Method {
        self.method.unwrap_or(Method::Hf)
    }

    pub fn basis_name(&self) -> String {
        self.basis
            .as_ref()
            .and_then(|b| b.name.clone())
            .unwrap_or_else(|| "sto-3g".to_string())
    }

    pub fn basis_directory(&self) -> String {
        self.basis
            .as_ref()
            .and_then(|b| b.directory.clone())
            .unwrap_or_else(|| "tests/basis_sets".to_string())
    }

    /// Basis set name for one element, honouring per-element overrides.
    pub fn basis_for(&self, symbol: &str) -> String {
        self.basis
            .as_ref()
            .and_then(|b| b.per_element.as_ref())
            .and_then(|m| m.get(symbol).cloned())
            .unwrap_or_else(|| self.basis_name())
    }

    pub fn solver(&self) -> SolverKind {
        self.scf.as_ref().and_then(|s| s.solver).unwrap_or(SolverKind::Cdiis)
    }

    pub fn threshold(&self) -> f64 {
        self.scf
            .as_ref()
            .and_then(|s| s.threshold)
            .unwrap_or_else(|| self.solver().default_threshold())
    }

    pub fn max_iter(&self) -> usize {
        self.scf.as_ref().and_then(|s| s.max_iter).unwrap_or(128)
    }

    pub fn nvector(&self) -> usize {
        self.scf.as_ref().and_then(|s| s.nvector).unwrap_or(6)
    }

    pub fn level_shift(&self) -> f64 {
        self.scf.as_ref().and_then(|s| s.level_shift).unwrap_or(0.0)
    }

    pub fn prune_old_states(&self) -> bool {
        self.scf.as_ref().and_then(|s| s.prune_old_states).unwrap_or(false)
    }

    pub fn occupation_model(&self) -> OccupationKind {
        self.occupation
            .as_ref()
            .and_then(|o| o.model)
            .unwrap_or(OccupationKind::Aufbau)
    }

    pub fn temperature(&self) -> f64 {
        self.occupation.as_ref().and_then(|o| o.temperature).unwrap_or(300.0)
    }

    pub fn grid_params(&self) -> GridParams {
        let defaults = GridParams::default();
        let section = self.grid.as_ref();
        GridParams {
            radial_points: section.and_then(|g| g.radial_points).unwrap_or(defaults.radial_points),
            theta_points: section.and_then(|g| g.theta_points).unwrap_or(defaults.theta_points),
        }
    }
}
