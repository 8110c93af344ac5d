use crate::domain::model::{Dataset, DiffusedInputs, Dynamics, SweepReport, TrainingSettings};
use crate::tune::{LamGrid, Resources};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::Path;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn base_path(&self) -> &Path;
}

pub trait ConfigProvider: Send + Sync {
    fn dataset(&self) -> &str;
    fn root_dir(&self) -> &Path;
    fn dynamics(&self) -> Dynamics;
    /// Keep velocity transition probabilities instead of binarizing them.
    fn proba(&self) -> bool;
    fn root_cell(&self) -> Option<usize>;
    fn training(&self) -> TrainingSettings;
    fn lam_grid(&self) -> LamGrid;
    fn resources(&self) -> Resources;
    fn max_concurrent_trials(&self) -> Option<usize>;
    fn archive(&self) -> bool;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Dataset>;
    async fn transform(&self, data: Dataset) -> Result<DiffusedInputs>;
    async fn load(&self, inputs: DiffusedInputs) -> Result<SweepReport>;
}
