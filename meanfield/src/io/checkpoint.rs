//! JSON checkpoints of converged calculations.

use crate::config::Method;
use crate::orbitals::Orbitals;
use color_eyre::eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Everything needed to rebuild the basis of a finished run and to restart
/// from its orbitals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub method: Method,
    pub restricted: bool,
    pub elements: Vec<String>,
    /// Bohr
    pub coords: Vec<[f64; 3]>,
    /// Basis set name per atom
    pub basis: Vec<String>,
    pub energy: f64,
    pub orbitals: Vec<Orbitals>,
}

impl Checkpoint {
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self).wrap_err("Failed to serialise checkpoint")?;
        fs::write(path, text).wrap_err_with(|| format!("Failed to write checkpoint {}", path.display()))?;
        info!("Checkpoint written to {}", path.display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text =
            fs::read_to_string(path).wrap_err_with(|| format!("Unable to read checkpoint {}", path.display()))?;
        serde_json::from_str(&text).wrap_err_with(|| format!("Malformed checkpoint {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DVector;

    #[test]
    fn test_save_and_load() {
        let mut orb = Orbitals::new(2);
        orb.occupations = DVector::from_vec(vec![1.0, 0.0]);
        orb.energies = DVector::from_vec(vec![-0.5, 0.3]);
        let checkpoint = Checkpoint {
            method: Method::Lda,
            restricted: true,
            elements: vec!["H".into(), "H".into()],
            coords: vec![[0.0, 0.0, 0.0], [0.0, 0.0, 1.4]],
            basis: vec!["sto-3g".into(), "sto-3g".into()],
            energy: -1.1,
            orbitals: vec![orb],
        };
        let path = std::env::temp_dir().join(format!("meanfield-checkpoint-{}.json", std::process::id()));
        checkpoint.save(&path).unwrap();
        let loaded = Checkpoint::load(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(loaded.method, Method::Lda);
        assert_eq!(loaded.orbitals[0].energies, checkpoint.orbitals[0].energies);
        assert_eq!(loaded.coords[1][2], 1.4);
        assert!(Checkpoint::load(path).is_err());
    }
}
