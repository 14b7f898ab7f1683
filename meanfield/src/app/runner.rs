//! One complete calculation: geometry to converged orbitals.

use crate::app::basis::{BasisRegistry, NwchemLoader};
use crate::app::geometry::{build_geometry, Geometry};
use crate::app::model::{build_hamiltonian, Integrals};
use crate::config::{Config, OccupationKind, SolverKind};
use crate::error::ElectronCountError;
use crate::guess::guess_core_hamiltonian;
use crate::hamiltonian::EffHam;
use crate::io::Checkpoint;
use crate::observable::Restriction;
use crate::occ::{AufbauOccModel, FermiOccModel, OccModel};
use crate::orbitals::Orbitals;
use crate::project::project_orbitals_mgs;
use crate::scf::PlainScfSolver;
use crate::scf_cdiis::CdiisScfSolver;
use crate::scf_diis::{DiisMethod, DiisScfSolver};
use crate::scf_ediis::{EdiisScfSolver, EDIIS_MAX_STATES};
use crate::scf_ediis2::Ediis2ScfSolver;
use crate::scf_oda::OdaScfSolver;
use ::basis::OrbitalBasis;
use color_eyre::eyre::{eyre, Result, WrapErr};
use nalgebra::{DMatrix, Vector3};
use periodic_table_on_an_enum::Element;
use tracing::info;

/// State of a finished calculation.
pub struct Calculation {
    pub geometry: Geometry,
    pub basis: OrbitalBasis,
    pub basis_names: Vec<String>,
    pub integrals: Integrals,
    pub ham: EffHam,
    pub orbitals: Vec<Orbitals>,
    pub energy: f64,
    pub iterations: usize,
}

impl Calculation {
    pub fn restriction(&self) -> Restriction {
        self.ham.restriction()
    }

    pub fn to_checkpoint(&self, config: &Config) -> Checkpoint {
        Checkpoint {
            method: config.method(),
            restricted: self.restriction() == Restriction::Restricted,
            elements: self.geometry.symbols().iter().map(|s| s.to_string()).collect(),
            coords: self.geometry.coords.iter().map(|c| [c.x, c.y, c.z]).collect(),
            basis: self.basis_names.clone(),
            energy: self.energy,
            orbitals: self.orbitals.clone(),
        }
    }
}

pub fn build_occ_model(config: &Config, geometry: &Geometry) -> Result<Box<dyn OccModel>> {
    let (nalpha, nbeta) = geometry.electron_counts(config.charge(), config.multiplicity())?;
    if config.is_restricted() && nalpha != nbeta {
        return Err(ElectronCountError(format!(
            "A restricted calculation needs a closed shell, got {} alpha and {} beta electrons",
            nalpha, nbeta
        ))
        .into());
    }
    info!("Electrons: {} alpha, {} beta", nalpha, nbeta);
    let (nalpha, nbeta) = (nalpha as f64, nbeta as f64);
    Ok(match config.occupation_model() {
        OccupationKind::Aufbau => Box::new(AufbauOccModel::new(nalpha, nbeta)?),
        OccupationKind::Fermi => Box::new(FermiOccModel::with_temperature(
            nalpha,
            nbeta,
            config.temperature(),
            1e-8,
        )?),
    })
}

/// Orbitals of a checkpoint, projected onto the current basis. The
/// checkpoint must hold `counts` (alpha, beta) electrons.
fn restart_orbitals(
    path: &str,
    registry: &mut BasisRegistry<NwchemLoader>,
    basis: &OrbitalBasis,
    restriction: Restriction,
    counts: (usize, usize),
) -> Result<Vec<Orbitals>> {
    let checkpoint = Checkpoint::load(path)?;
    let elements = checkpoint
        .elements
        .iter()
        .map(|s| Element::from_symbol(s).ok_or_else(|| eyre!("Invalid element symbol in checkpoint: {}", s)))
        .collect::<Result<Vec<_>>>()?;
    let old_geometry = Geometry {
        elements,
        coords: checkpoint.coords.iter().map(|c| Vector3::new(c[0], c[1], c[2])).collect(),
    };
    let old_basis = registry.build(&old_geometry, &checkpoint.basis)?;

    let sources: Vec<&Orbitals> = match (restriction, checkpoint.orbitals.as_slice()) {
        (Restriction::Restricted, [alpha, ..]) => vec![alpha],
        (Restriction::Unrestricted, [alpha]) => vec![alpha, alpha],
        (Restriction::Unrestricted, [alpha, beta]) => vec![alpha, beta],
        _ => return Err(eyre!("Checkpoint {} holds no usable orbitals", path)),
    };
    let expected = [counts.0 as f64, counts.1 as f64];
    for (orb0, (nel, spin)) in sources.iter().zip(expected.iter().zip(["alpha", "beta"])) {
        let found = orb0.occupations.sum();
        if (found - nel).abs() > 1e-6 {
            return Err(ElectronCountError(format!(
                "Checkpoint {} holds {:.6} {} electrons, expected {}",
                path, found, spin, nel
            ))
            .into());
        }
    }
    let mut orbs = Vec::with_capacity(sources.len());
    for orb0 in sources {
        let mut orb1 = Orbitals::new(basis.nbasis());
        project_orbitals_mgs(&old_basis, basis, orb0, &mut orb1, 1e-10)?;
        orbs.push(orb1);
    }
    info!("Initial guess: projected from checkpoint {}", path);
    Ok(orbs)
}

/// Rejects DIIS history sizes the chosen solver cannot handle.
pub fn check_solver_settings(config: &Config) -> Result<()> {
    let nvector = config.nvector();
    match config.solver() {
        SolverKind::Plain | SolverKind::Oda => Ok(()),
        _ if nvector < 2 => Err(eyre!("DIIS needs at least 2 stored states, got nvector = {}", nvector)),
        SolverKind::Ediis | SolverKind::Ediis2 if nvector > EDIIS_MAX_STATES => Err(eyre!(
            "The {:?} solver keeps at most {} states, got nvector = {}",
            config.solver(),
            EDIIS_MAX_STATES,
            nvector
        )),
        _ => Ok(()),
    }
}

fn run_dm_solver<M: DiisMethod>(
    solver: DiisScfSolver<M>,
    config: &Config,
    ham: &mut EffHam,
    overlap: &DMatrix<f64>,
    occ_model: &dyn OccModel,
    dms: &mut [DMatrix<f64>],
) -> Result<usize> {
    let solver = DiisScfSolver {
        threshold: config.threshold(),
        maxiter: config.max_iter(),
        nvector: config.nvector(),
        prune_old_states: config.prune_old_states(),
        ..solver
    };
    solver.solve(ham, overlap, occ_model, dms)
}

/// Runs the configured solver. Density-matrix solvers finish with one
/// diagonalisation of the converged Fock matrices so that orbitals are
/// available afterwards.
pub fn run_solver(
    config: &Config,
    ham: &mut EffHam,
    overlap: &DMatrix<f64>,
    occ_model: &dyn OccModel,
    orbs: &mut [Orbitals],
) -> Result<usize> {
    let mut dms: Vec<DMatrix<f64>> = orbs.iter().map(|o| o.to_dm()).collect();
    let iterations = match config.solver() {
        SolverKind::Plain => {
            let solver = PlainScfSolver {
                threshold: config.threshold(),
                maxiter: config.max_iter(),
                level_shift: config.level_shift(),
                ..Default::default()
            };
            return solver.solve(ham, overlap, occ_model, orbs);
        }
        SolverKind::Oda => {
            let solver = OdaScfSolver {
                threshold: config.threshold(),
                maxiter: config.max_iter(),
                ..Default::default()
            };
            solver.solve(ham, overlap, occ_model, &mut dms)?
        }
        SolverKind::Cdiis => run_dm_solver(CdiisScfSolver::default(), config, ham, overlap, occ_model, &mut dms)?,
        SolverKind::Ediis => run_dm_solver(EdiisScfSolver::default(), config, ham, overlap, occ_model, &mut dms)?,
        SolverKind::Ediis2 => {
            run_dm_solver(Ediis2ScfSolver::default(), config, ham, overlap, occ_model, &mut dms)?
        }
    };

    ham.reset(&dms)?;
    let mut focks: Vec<DMatrix<f64>> = vec![DMatrix::zeros(overlap.nrows(), overlap.ncols()); ham.ndm()];
    ham.compute_fock(&mut focks)?;
    for (orb, fock) in orbs.iter_mut().zip(&focks) {
        orb.from_fock(fock, overlap)?;
    }
    occ_model.assign(orbs)?;
    Ok(iterations)
}

/// Geometry, basis, integrals, model, initial guess and SCF for one
/// configuration.
pub fn run_calculation(config: &Config) -> Result<Calculation> {
    check_solver_settings(config)?;
    let geometry = build_geometry(config)?;
    let basis_names: Vec<String> = geometry.symbols().iter().map(|s| config.basis_for(s)).collect();
    let mut registry = BasisRegistry::new(NwchemLoader {
        directory: config.basis_directory(),
    });
    let basis = registry.build(&geometry, &basis_names)?;
    let integrals = Integrals::compute(&basis, &geometry);

    let restriction = if config.is_restricted() {
        Restriction::Restricted
    } else {
        Restriction::Unrestricted
    };
    let mut ham = build_hamiltonian(
        config.method(),
        restriction,
        &basis,
        &geometry,
        &integrals,
        &config.grid_params(),
    )?;
    let occ_model = build_occ_model(config, &geometry)?;
    let counts = geometry.electron_counts(config.charge(), config.multiplicity())?;

    let mut orbitals = match &config.restart {
        Some(path) => restart_orbitals(path, &mut registry, &basis, restriction, counts)
            .wrap_err_with(|| format!("Failed to restart from {}", path))?,
        None => {
            let mut orbs: Vec<Orbitals> = (0..restriction.ndm()).map(|_| Orbitals::new(basis.nbasis())).collect();
            guess_core_hamiltonian(&integrals.overlap, &integrals.core(), &mut orbs)?;
            occ_model.assign(&mut orbs)?;
            orbs
        }
    };

    let iterations = run_solver(config, &mut ham, &integrals.overlap, occ_model.as_ref(), &mut orbitals)?;

    let dms: Vec<DMatrix<f64>> = orbitals.iter().map(|o| o.to_dm()).collect();
    ham.reset(&dms)?;
    let energy = ham.compute_energy()?;
    info!("Final {} energy: {:.12} after {} iterations", config.method(), energy, iterations);

    Ok(Calculation {
        geometry,
        basis,
        basis_names,
        integrals,
        ham,
        orbitals,
        energy,
        iterations,
    })
}
