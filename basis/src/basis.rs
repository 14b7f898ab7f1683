#![allow(non_snake_case)]
//! Interfaces shared by primitive and contracted Gaussian functions.

use nalgebra::Vector3;
use std::sync::Arc;

/// A single real basis function together with its one- and two-electron
/// integrals. Two-electron integrals use chemists' notation `(ab|cd)`.
pub trait Basis {
    fn evaluate(&self, r: &Vector3<f64>) -> f64;
    fn gradient(&self, r: &Vector3<f64>) -> Vector3<f64>;
    fn Sab(a: &Self, b: &Self) -> f64;
    fn Tab(a: &Self, b: &Self) -> f64;
    /// Attraction of the product `ab` to a point charge `Z` at `R`.
    fn Vab(a: &Self, b: &Self, R: Vector3<f64>, Z: f64) -> f64;
    fn JKabcd(a: &Self, b: &Self, c: &Self, d: &Self) -> f64;
}

/// The basis set of one element, as a collection of functions that all sit
/// on the same nucleus.
pub trait AOBasis {
    type BasisType: Basis;

    fn basis_size(&self) -> usize;
    fn get_basis(&self) -> Vec<Arc<Self::BasisType>>;
    fn set_center(&mut self, center: Vector3<f64>);
    fn get_center(&self) -> Option<Vector3<f64>>;
}
