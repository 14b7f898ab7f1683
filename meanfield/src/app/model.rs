//! Assembly of effective Hamiltonians for the supported methods.

use crate::app::geometry::Geometry;
use crate::builtin::DiracExchange;
use crate::config::Method;
use crate::grid::{GridParams, MolecularGrid};
use crate::gridgroup::{GridGroup, GridObservable};
use crate::hamiltonian::EffHam;
use crate::observable::{DirectTerm, ExchangeTerm, Observable, Restriction, TwoIndexTerm};
use crate::xc::{XcFunctional, XcKind};
use ::basis::{compute_nucnuc, ElectronRepulsion, OrbitalBasis};
use color_eyre::eyre::Result;
use nalgebra::DMatrix;
use std::sync::Arc;
use tracing::info;

/// Molecular integrals shared by all terms of a model.
pub struct Integrals {
    pub overlap: DMatrix<f64>,
    pub kinetic: DMatrix<f64>,
    pub nuclear: DMatrix<f64>,
    pub er: Arc<ElectronRepulsion>,
    pub nucnuc: f64,
}

impl Integrals {
    pub fn compute(basis: &OrbitalBasis, geometry: &Geometry) -> Self {
        info!("Computing integrals for {} basis functions", basis.nbasis());
        let charges = geometry.charges();
        Self {
            overlap: basis.compute_overlap(),
            kinetic: basis.compute_kinetic(),
            nuclear: basis.compute_nuclear_attraction(&geometry.coords, &charges),
            er: Arc::new(basis.compute_electron_repulsion()),
            nucnuc: compute_nucnuc(&geometry.coords, &charges),
        }
    }

    /// Kinetic plus nuclear attraction.
    pub fn core(&self) -> DMatrix<f64> {
        &self.kinetic + &self.nuclear
    }
}

fn grid_terms(method: Method) -> Vec<Box<dyn GridObservable>> {
    match method {
        Method::Hf => Vec::new(),
        Method::Hfs => vec![Box::new(DiracExchange::default())],
        Method::Lda => vec![
            Box::new(XcFunctional::new(XcKind::LdaX)),
            Box::new(XcFunctional::new(XcKind::LdaCPw)),
        ],
        Method::Pbe => vec![
            Box::new(XcFunctional::new(XcKind::GgaXPbe)),
            Box::new(XcFunctional::new(XcKind::GgaCPbe)),
        ],
        Method::Pbe0 => vec![Box::new(XcFunctional::new(XcKind::HybGgaXcPbeh))],
    }
}

/// Fraction of exact exchange in the method.
pub fn exx_fraction(method: Method) -> f64 {
    match method {
        Method::Hf => 1.0,
        Method::Pbe0 => XcFunctional::new(XcKind::HybGgaXcPbeh).exx_fraction(),
        Method::Hfs | Method::Lda | Method::Pbe => 0.0,
    }
}

/// Kinetic, nuclear attraction and Hartree terms, the exchange-correlation
/// terms of `method`, and the nuclear repulsion as an external energy.
pub fn build_hamiltonian(
    method: Method,
    restriction: Restriction,
    basis: &OrbitalBasis,
    geometry: &Geometry,
    integrals: &Integrals,
    grid_params: &GridParams,
) -> Result<EffHam> {
    let mut terms: Vec<Box<dyn Observable>> = vec![
        Box::new(TwoIndexTerm::new(integrals.kinetic.clone(), "kin", restriction)),
        Box::new(TwoIndexTerm::new(integrals.nuclear.clone(), "ne", restriction)),
        Box::new(DirectTerm::new(integrals.er.clone(), "hartree", restriction)),
    ];

    let fraction = exx_fraction(method);
    if fraction > 0.0 {
        terms.push(Box::new(ExchangeTerm::with_fraction(
            integrals.er.clone(),
            "x_hf",
            restriction,
            fraction,
        )));
    }

    let xc = grid_terms(method);
    if !xc.is_empty() {
        let grid = MolecularGrid::new(&geometry.coords, &geometry.numbers(), grid_params)?;
        info!("Integration grid: {} points", grid.size());
        terms.push(Box::new(GridGroup::new(basis, Arc::new(grid), xc, "grid", restriction)?));
    }

    info!("Model: {} ({} terms)", method, terms.len());
    EffHam::new(restriction, terms, vec![("nn".to_string(), integrals.nucnuc)])
}
