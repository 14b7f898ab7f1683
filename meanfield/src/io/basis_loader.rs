//! Basis set loading from local NWChem files or the Basis Set Exchange.

use basis::ElementBasis;
use color_eyre::eyre::{Result, WrapErr};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// `<directory>/<name>.<symbol>.nwchem`, lowercased.
pub fn basis_file_path(directory: &str, name: &str, symbol: &str) -> PathBuf {
    Path::new(directory).join(format!("{}.{}.nwchem", name.to_lowercase(), symbol.to_lowercase()))
}

/// Reads the basis set `name` for one element, preferring a local file over
/// a download.
pub fn fetch_basis(symbol: &str, name: &str, directory: &str) -> Result<ElementBasis> {
    let local_path = basis_file_path(directory, name, symbol);
    if local_path.exists() {
        debug!("Loading {} for {} from {}", name, symbol, local_path.display());
        let text = fs::read_to_string(&local_path)
            .wrap_err_with(|| format!("Failed to read basis set file: {}", local_path.display()))?;
        return ElementBasis::parse_nwchem(&text, name)
            .wrap_err_with(|| format!("Malformed basis set file: {}", local_path.display()));
    }

    let url = format!(
        "https://www.basissetexchange.org/api/basis/{}/format/nwchem?elements={}",
        name, symbol
    );
    info!("No local {} basis for {}, fetching {}", name, symbol, url);
    let response = reqwest::blocking::get(&url)
        .and_then(|r| r.error_for_status())
        .wrap_err_with(|| format!("Failed to fetch basis set {} for {}", name, symbol))?;
    let text = response
        .text()
        .wrap_err("Failed to get response text from basis set API")?;
    ElementBasis::parse_nwchem(&text, name)
        .wrap_err_with(|| format!("Basis Set Exchange returned an unusable {} basis for {}", name, symbol))
}
