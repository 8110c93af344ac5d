// Adapters layer: concrete implementations for external systems (filesystem storage, dataset files, result files).

pub mod dataset;
pub mod results;
pub mod storage;
