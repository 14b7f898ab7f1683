//! Self-consistent field solvers for Hartree-Fock and Kohn-Sham DFT.
//!
//! An [`EffHam`] sums [`Observable`] energy terms over one (restricted) or two
//! (unrestricted) density matrices. The SCF solvers optimise either orbitals
//! ([`PlainScfSolver`]) or density matrices ([`OdaScfSolver`] and the DIIS
//! family) against such a Hamiltonian.

pub mod app;
pub mod builtin;
pub mod cache;
pub mod config;
pub mod convergence;
pub mod error;
pub mod grid;
pub mod gridgroup;
pub mod guess;
pub mod hamiltonian;
pub mod io;
pub mod observable;
pub mod occ;
pub mod orbitals;
pub mod project;
pub mod response;
pub mod scf;
pub mod scf_cdiis;
pub mod scf_diis;
pub mod scf_ediis;
pub mod scf_ediis2;
pub mod scf_oda;
pub mod utils;
pub mod xc;

pub use cache::Cache;
pub use error::{DensityMatrixError, ElectronCountError, NoScfConvergence, ProjectionError};
pub use hamiltonian::EffHam;
pub use observable::{DirectTerm, ExchangeTerm, Observable, Restriction, TwoIndexTerm};
pub use occ::{AufbauOccModel, AufbauSpinOccModel, FermiOccModel, OccModel};
pub use orbitals::Orbitals;
pub use scf::PlainScfSolver;
pub use scf_cdiis::CdiisScfSolver;
pub use scf_diis::{DiisHistory, DiisMethod, DiisScfSolver};
pub use scf_ediis::EdiisScfSolver;
pub use scf_ediis2::Ediis2ScfSolver;
pub use scf_oda::OdaScfSolver;
