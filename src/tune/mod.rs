//! Hyperparameter sweep over the regularization strength.

pub mod grid;
pub mod resources;
pub mod runner;

pub use grid::LamGrid;
pub use resources::Resources;
pub use runner::{TrialRun, TuneRunner};
