mod basis;
mod geometry;
mod model;
mod report;
mod runner;

pub use self::basis::{BasisLoader, BasisRegistry, NwchemLoader};
pub use geometry::{build_geometry, Geometry};
pub use model::{build_hamiltonian, exx_fraction, Integrals};
pub use report::report_summary;
pub use runner::{build_occ_model, check_solver_settings, run_calculation, run_solver, Calculation};

use crate::config::{Args, Config};
use crate::io::setup_output;
use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use std::fs;
use tracing::info;

pub struct MeanFieldApplication {
    args: Args,
    config: Config,
}

impl MeanFieldApplication {
    pub fn from_cli() -> Result<Self> {
        let args = Args::parse();
        let config = load_config(&args)?;
        Ok(Self { args, config })
    }

    pub fn run(self) -> Result<()> {
        setup_output(self.args.output.as_ref())?;
        info!(
            "{} calculation ({}), solver {:?}",
            self.config.method(),
            if self.config.is_restricted() { "restricted" } else { "unrestricted" },
            self.config.solver()
        );

        let calc = run_calculation(&self.config)?;
        report_summary(&calc)?;

        if let Some(path) = &self.config.checkpoint {
            calc.to_checkpoint(&self.config).save(path)?;
        }
        Ok(())
    }
}

/// Reads the YAML file, fills in defaults and applies the command-line
/// overrides.
pub fn load_config(args: &Args) -> Result<Config> {
    let config_content = fs::read_to_string(&args.config_file)
        .wrap_err_with(|| format!("Unable to read configuration file: {}", args.config_file))?;

    let config = serde_yml::from_str::<Config>(&config_content)
        .wrap_err("Failed to parse configuration file")?
        .with_defaults()
        .with_overrides(args);

    Ok(config)
}
