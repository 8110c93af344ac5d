// Domain layer: run settings, dataset and result models, and the ports the pipeline is built on.

pub mod model;
pub mod ports;
