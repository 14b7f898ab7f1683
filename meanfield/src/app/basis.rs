use crate::app::geometry::Geometry;
use crate::io::fetch_basis;
use ::basis::{ElementBasis, OrbitalBasis};
use color_eyre::eyre::{eyre, Result};
use std::collections::HashMap;
use tracing::info;

/// Source of per-element basis sets.
pub trait BasisLoader {
    fn load(&self, symbol: &str, name: &str) -> Result<ElementBasis>;
}

/// Local NWChem files with a Basis Set Exchange fallback.
pub struct NwchemLoader {
    pub directory: String,
}

impl BasisLoader for NwchemLoader {
    fn load(&self, symbol: &str, name: &str) -> Result<ElementBasis> {
        fetch_basis(symbol, name, &self.directory)
    }
}

/// Caches loaded element basis sets by (symbol, basis name).
pub struct BasisRegistry<L: BasisLoader> {
    loader: L,
    cache: HashMap<(String, String), ElementBasis>,
}

impl<L: BasisLoader> BasisRegistry<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            cache: HashMap::new(),
        }
    }

    pub fn get(&mut self, symbol: &str, name: &str) -> Result<&ElementBasis> {
        let key = (symbol.to_string(), name.to_lowercase());
        if !self.cache.contains_key(&key) {
            info!("Loading {} basis for {}", name, symbol);
            let basis = self.loader.load(symbol, name)?;
            self.cache.insert(key.clone(), basis);
        }
        self.cache
            .get(&key)
            .ok_or_else(|| eyre!("Basis {} for {} vanished from the registry", name, symbol))
    }

    /// Orbital basis of a molecule with one basis set name per atom.
    pub fn build(&mut self, geometry: &Geometry, names: &[String]) -> Result<OrbitalBasis> {
        if names.len() != geometry.natom() {
            return Err(eyre!("Got {} basis names for {} atoms", names.len(), geometry.natom()));
        }
        let symbols = geometry.symbols();
        for (symbol, name) in symbols.iter().zip(names) {
            self.get(symbol, name)?;
        }
        let bases: Vec<&ElementBasis> = symbols
            .iter()
            .zip(names)
            .map(|(symbol, name)| {
                self.cache
                    .get(&(symbol.to_string(), name.to_lowercase()))
                    .ok_or_else(|| eyre!("Basis {} for {} was not loaded", name, symbol))
            })
            .collect::<Result<_>>()?;
        let basis = OrbitalBasis::new(&geometry.coords, &bases)?;
        info!("Orbital basis: {} functions on {} atoms", basis.nbasis(), geometry.natom());
        Ok(basis)
    }
}
