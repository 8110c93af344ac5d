//! Lagged regression models fitted per target gene and the proximal
//! training loop that makes their input layers group-sparse.

pub mod network;
pub mod penalty;
pub mod train;

pub use network::LaggedModel;
pub use train::{train_model, TrialOutcome};
