//! Gaussian basis sets and molecular integrals.

pub mod basis;
pub mod cgto;
pub mod gto;
pub mod helper;
pub mod integrals;


pub use basis::{AOBasis, Basis};
pub use cgto::{ContractedGTO, ElementBasis};
pub use integrals::{compute_nucnuc, ElectronRepulsion, OrbitalBasis};
