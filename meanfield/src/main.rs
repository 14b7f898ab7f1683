//! Command-line entry point for mean-field calculations driven by a YAML
//! configuration.

use color_eyre::eyre::Result;
use meanfield::app::MeanFieldApplication;

fn main() -> Result<()> {
    color_eyre::install()?;
    MeanFieldApplication::from_cli()?.run()
}
