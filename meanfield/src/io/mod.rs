//! File and network I/O: logging setup, basis set files and checkpoints.

mod basis_loader;
mod checkpoint;
mod output;

pub use basis_loader::{basis_file_path, fetch_basis};
pub use checkpoint::Checkpoint;
pub use output::setup_output;
