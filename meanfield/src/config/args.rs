//! Command-line options. Every option left out falls back to the YAML file.

use super::{Method, SolverKind};
use clap::Parser;

/// Mean-field (HF / DFT) calculation driven by a YAML configuration
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    pub config_file: String,

    /// Write the log to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<String>,

    /// Molecular charge
    #[arg(long, allow_hyphen_values = true)]
    pub charge: Option<i32>,

    /// Spin multiplicity (2S+1)
    #[arg(long)]
    pub multiplicity: Option<usize>,

    /// Use separate alpha and beta orbitals
    #[arg(long)]
    pub unrestricted: bool,

    /// Electronic structure method
    #[arg(long, value_enum)]
    pub method: Option<Method>,

    /// SCF solver
    #[arg(long, value_enum)]
    pub solver: Option<SolverKind>,

    /// SCF convergence threshold
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Maximum number of SCF iterations
    #[arg(long)]
    pub max_iter: Option<usize>,
}
