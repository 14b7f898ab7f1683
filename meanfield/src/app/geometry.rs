use crate::config::{Config, Units};
use crate::error::ElectronCountError;
use crate::grid::ANGSTROM;
use color_eyre::eyre::{eyre, Result};
use nalgebra::Vector3;
use periodic_table_on_an_enum::Element;
use tracing::info;

/// Elements and coordinates (bohr) of the molecule.
pub struct Geometry {
    pub elements: Vec<Element>,
    pub coords: Vec<Vector3<f64>>,
}

impl Geometry {
    pub fn natom(&self) -> usize {
        self.elements.len()
    }

    pub fn symbols(&self) -> Vec<&'static str> {
        self.elements.iter().map(|e| e.get_symbol()).collect()
    }

    pub fn numbers(&self) -> Vec<usize> {
        self.elements.iter().map(|e| e.get_atomic_number() as usize).collect()
    }

    /// Nuclear charges, equal to the atomic numbers.
    pub fn charges(&self) -> Vec<f64> {
        self.numbers().into_iter().map(|z| z as f64).collect()
    }

    /// Number of alpha and beta electrons for a total charge and spin
    /// multiplicity.
    pub fn electron_counts(&self, charge: i32, multiplicity: usize) -> Result<(usize, usize)> {
        let protons: i64 = self.numbers().iter().map(|&z| z as i64).sum();
        let nel = protons - charge as i64;
        if nel <= 0 {
            return Err(ElectronCountError(format!("Charge {} leaves {} electrons", charge, nel)).into());
        }
        if multiplicity == 0 {
            return Err(ElectronCountError("The multiplicity must be at least one".into()).into());
        }
        let unpaired = multiplicity as i64 - 1;
        if unpaired > nel || (nel - unpaired) % 2 != 0 {
            return Err(ElectronCountError(format!(
                "Multiplicity {} is impossible with {} electrons",
                multiplicity, nel
            ))
            .into());
        }
        let nbeta = (nel - unpaired) / 2;
        Ok(((nbeta + unpaired) as usize, nbeta as usize))
    }
}

/// Build the molecular geometry defined in the YAML configuration.
pub fn build_geometry(config: &Config) -> Result<Geometry> {
    info!("Preparing geometry...");
    if config.geometry.is_empty() {
        return Err(eyre!("The geometry has no atoms"));
    }
    let scale = match config.units() {
        Units::Bohr => 1.0,
        Units::Angstrom => ANGSTROM,
    };

    let mut elements = Vec::with_capacity(config.geometry.len());
    let mut coords = Vec::with_capacity(config.geometry.len());
    for atom in &config.geometry {
        let element = Element::from_symbol(&atom.element)
            .ok_or_else(|| eyre!("Invalid element symbol: {}", atom.element))?;
        let position = Vector3::new(atom.coords[0], atom.coords[1], atom.coords[2]) * scale;
        info!(
            "  {:>2} {:>14.8} {:>14.8} {:>14.8}",
            element.get_symbol(),
            position.x,
            position.y,
            position.z
        );
        elements.push(element);
        coords.push(position);
    }

    Ok(Geometry { elements, coords })
}
