//! Tagged key-value store shared by the energy terms of an effective
//! Hamiltonian.

use color_eyre::eyre::{eyre, Result};
use nalgebra::{DMatrix, DVector};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub enum CacheItem {
    Scalar(f64),
    Matrix(DMatrix<f64>),
    Array(DVector<f64>),
}

#[derive(Debug, Clone, Default)]
pub struct Cache {
    items: HashMap<String, (CacheItem, String)>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_scalar(&mut self, key: &str, value: f64, tags: &str) {
        self.items.insert(key.to_string(), (CacheItem::Scalar(value), tags.to_string()));
    }

    pub fn insert_matrix(&mut self, key: &str, value: DMatrix<f64>, tags: &str) {
        self.items.insert(key.to_string(), (CacheItem::Matrix(value), tags.to_string()));
    }

    pub fn insert_array(&mut self, key: &str, value: DVector<f64>, tags: &str) {
        self.items.insert(key.to_string(), (CacheItem::Array(value), tags.to_string()));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    pub fn scalar(&self, key: &str) -> Result<f64> {
        match self.items.get(key) {
            Some((CacheItem::Scalar(v), _)) => Ok(*v),
            Some(_) => Err(eyre!("Cache entry '{}' is not a scalar", key)),
            None => Err(eyre!("Missing cache entry '{}'", key)),
        }
    }

    pub fn matrix(&self, key: &str) -> Result<&DMatrix<f64>> {
        match self.items.get(key) {
            Some((CacheItem::Matrix(m), _)) => Ok(m),
            Some(_) => Err(eyre!("Cache entry '{}' is not a matrix", key)),
            None => Err(eyre!("Missing cache entry '{}'", key)),
        }
    }

    pub fn array(&self, key: &str) -> Result<&DVector<f64>> {
        match self.items.get(key) {
            Some((CacheItem::Array(a), _)) => Ok(a),
            Some(_) => Err(eyre!("Cache entry '{}' is not an array", key)),
            None => Err(eyre!("Missing cache entry '{}'", key)),
        }
    }

    /// Returns the matrix under `key`, computing and storing it first if it
    /// is absent.
    pub fn load_matrix_with<F>(&mut self, key: &str, tags: &str, f: F) -> Result<&DMatrix<f64>>
    where
        F: FnOnce(&Cache) -> Result<DMatrix<f64>>,
    {
        if !self.contains(key) {
            let value = f(self)?;
            self.insert_matrix(key, value, tags);
        }
        self.matrix(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.items.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Drops every entry whose tags contain `tag`.
    pub fn clear_tagged(&mut self, tag: char) {
        self.items.retain(|_, (_, tags)| !tags.contains(tag));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_access() {
        let mut cache = Cache::new();
        cache.insert_scalar("energy", -1.5, "");
        cache.insert_matrix("dm_alpha", DMatrix::identity(2, 2), "");
        cache.insert_array("rho", DVector::from_element(3, 0.5), "");
        assert_eq!(cache.scalar("energy").unwrap(), -1.5);
        assert_eq!(cache.matrix("dm_alpha").unwrap()[(1, 1)], 1.0);
        assert_eq!(cache.array("rho").unwrap().len(), 3);
        assert!(cache.matrix("energy").is_err());
        assert!(cache.scalar("missing").is_err());
        assert_eq!(cache.keys(), vec!["dm_alpha", "energy", "rho"]);
    }

    #[test]
    fn test_load_and_clear_tagged() {
        let mut cache = Cache::new();
        cache.insert_matrix("dm_alpha", DMatrix::identity(2, 2), "");
        let doubled = cache
            .load_matrix_with("dm_full", "", |c| Ok(c.matrix("dm_alpha")? * 2.0))
            .unwrap()
            .clone();
        assert_eq!(doubled[(0, 0)], 2.0);
        // second call does not recompute
        let again = cache
            .load_matrix_with("dm_full", "", |_| Err(eyre!("should not run")))
            .unwrap();
        assert_eq!(again[(0, 0)], 2.0);

        cache.insert_matrix("delta_dm_alpha", DMatrix::zeros(2, 2), "d");
        cache.insert_scalar("energy", 1.0, "");
        cache.clear_tagged('d');
        assert_eq!(cache.keys(), vec!["dm_alpha", "dm_full", "energy"]);
        cache.clear();
        assert!(cache.keys().is_empty());
    }
}
