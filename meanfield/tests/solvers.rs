mod common;

use common::*;
use meanfield::app::{check_solver_settings, run_calculation};
use meanfield::config::{Method, SolverKind};
use meanfield::observable::Restriction;
use meanfield::scf_oda::check_cubic;
use meanfield::NoScfConvergence;
use nalgebra::DMatrix;

fn water_with(solver: &str) -> f64 {
    let extra = format!("scf:\n  solver: {}\n  max_iter: 200\n", solver);
    let calc = run_calculation(&config(WATER, &extra)).unwrap();
    calc.energy
}

#[test]
fn test_all_solvers_agree_on_water() {
    for solver in ["plain", "oda", "cdiis", "ediis", "ediis2"] {
        let energy = water_with(solver);
        assert!((energy - WATER_ENERGY).abs() < 1e-5, "{}: energy = {}", solver, energy);
    }
}

#[test]
fn test_pruned_cdiis() {
    let extra = "scf:\n  solver: cdiis\n  nvector: 8\n  prune_old_states: true\n";
    let calc = run_calculation(&config(WATER, extra)).unwrap();
    assert!((calc.energy - WATER_ENERGY).abs() < 1e-5);
}

#[test]
fn test_level_shift_converges_to_same_state() {
    let extra = "scf:\n  solver: plain\n  level_shift: 0.5\n  max_iter: 300\n";
    let calc = run_calculation(&config(WATER, extra)).unwrap();
    assert!((calc.energy - WATER_ENERGY).abs() < 1e-5);
}

#[test]
fn test_fermi_occupations_at_low_temperature() {
    let extra = "occupation:\n  model: fermi\n  temperature: 300\n";
    let calc = run_calculation(&config(WATER, extra)).unwrap();
    assert!((calc.energy - WATER_ENERGY).abs() < 1e-5);
    assert!((calc.orbitals[0].occupations.sum() - 5.0).abs() < 1e-6);
}

#[test]
fn test_iteration_limit_is_reported() {
    let config = config(WATER, "scf:\n  solver: cdiis\n  max_iter: 1\n");
    let err = run_calculation(&config).err().unwrap();
    let failure = err.downcast_ref::<NoScfConvergence>().unwrap();
    assert_eq!(failure.iterations, 1);
    assert!(failure.error > config.threshold());
    assert_eq!(config.solver(), SolverKind::Cdiis);
}

#[test]
fn test_oversized_ediis_history_is_rejected_up_front() {
    for solver in ["ediis", "ediis2"] {
        let extra = format!("scf:\n  solver: {}\n  nvector: 20\n", solver);
        let config = config(WATER, &extra);
        assert!(check_solver_settings(&config).is_err());
        let err = run_calculation(&config).err().expect("history too large");
        assert!(err.downcast_ref::<NoScfConvergence>().is_none());
        assert!(err.to_string().contains("nvector = 20"), "{}", err);
    }
    // CDIIS has no such limit
    assert!(check_solver_settings(&config(WATER, "scf:\n  solver: cdiis\n  nvector: 20\n")).is_ok());
    assert!(check_solver_settings(&config(WATER, "scf:\n  solver: cdiis\n  nvector: 1\n")).is_err());
}

#[test]
fn test_hf_energy_is_cubic_along_a_line() {
    let cfg = config(WATER, "");
    let mut m = model(&cfg, Method::Hf, Restriction::Restricted);
    let dm0s = core_guess_dms(&m.integrals, Restriction::Restricted, 5.0, 5.0);
    let n = dm0s[0].nrows();

    let mut fock0s = vec![DMatrix::<f64>::zeros(n, n)];
    m.ham.reset(&dm0s).unwrap();
    let e0 = m.ham.compute_energy().unwrap();
    m.ham.compute_fock(&mut fock0s).unwrap();

    let mut orb = meanfield::Orbitals::new(n);
    orb.from_fock(&fock0s[0], &m.integrals.overlap).unwrap();
    orb.occupations.rows_mut(0, 5).fill(1.0);
    let dm1s = vec![orb.to_dm()];

    let mut fock1s = vec![DMatrix::<f64>::zeros(n, n)];
    m.ham.reset(&dm1s).unwrap();
    let e1 = m.ham.compute_energy().unwrap();
    m.ham.compute_fock(&mut fock1s).unwrap();

    let deltas = vec![&dm1s[0] - &dm0s[0]];
    let g0 = directional_derivative(&m.ham, &fock0s, &deltas);
    let g1 = directional_derivative(&m.ham, &fock1s, &deltas);
    let deviation = check_cubic(&mut m.ham, &dm0s, &dm1s, e0, e1, g0, g1).unwrap();
    assert!(deviation < 1e-8, "deviation = {}", deviation);
}
