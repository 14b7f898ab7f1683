use crate::app::runner::Calculation;
use crate::observable::Restriction;
use crate::utils::{get_homo_lumo, get_spin};
use color_eyre::eyre::Result;
use tracing::info;

pub fn report_summary(calc: &Calculation) -> Result<()> {
    info!("SCF calculation finished after {} iterations.", calc.iterations);
    calc.ham.log_energy()?;

    let spins: &[&str] = match calc.restriction() {
        Restriction::Restricted => &["Doubly occupied"],
        Restriction::Unrestricted => &["Alpha", "Beta"],
    };
    info!("Orbital energies:");
    for (label, orb) in spins.iter().zip(&calc.orbitals) {
        info!("  {} orbitals:", label);
        for (i, (energy, occ)) in orb.energies.iter().zip(orb.occupations.iter()).enumerate() {
            info!("    {:>4} {:>16.8} au  occ = {:.4}", i + 1, energy, occ);
        }
    }

    let (homo, lumo) = get_homo_lumo(&calc.orbitals)?;
    match lumo {
        Some(lumo) => info!("HOMO = {:.8} au, LUMO = {:.8} au, gap = {:.8} au", homo, lumo, lumo - homo),
        None => info!("HOMO = {:.8} au, no virtual orbitals", homo),
    }

    if let [alpha, beta] = calc.orbitals.as_slice() {
        let (sz, ssq) = get_spin(alpha, beta, &calc.integrals.overlap);
        info!("<Sz> = {:.6}, <S^2> = {:.6}", sz, ssq);
    }

    info!("Total energy: {:.12} au", calc.energy);
    Ok(())
}
