pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod graph;
pub mod model;
pub mod tune;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::storage::LocalStorage;
pub use config::toml_config::TomlConfig;
pub use core::{engine::SweepEngine, pipeline::GrangerPipeline};
pub use utils::error::{LagError, Result};
