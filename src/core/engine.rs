use crate::core::Pipeline;
use crate::domain::model::SweepReport;
use crate::utils::error::{LagError, Result};
use crate::utils::monitor::{SweepMonitor, SweepPhase};
use std::time::Instant;

pub struct SweepEngine<P: Pipeline> {
    pipeline: P,
    monitor: SweepMonitor,
}

impl<P: Pipeline> SweepEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SweepMonitor::new(monitor_enabled),
        }
    }

    pub fn monitor(&self) -> &SweepMonitor {
        &self.monitor
    }

    /// Extract, diffuse, sweep. Trial failures are persisted first and then
    /// surfaced as [`LagError::TrialsFailed`].
    pub async fn run(&self) -> Result<SweepReport> {
        let start = Instant::now();
        tracing::info!("Starting Granger causality sweep...");
        self.monitor.mark(SweepPhase::Start);

        let dataset = self.pipeline.extract().await?;
        tracing::info!(
            "Loaded {} cells × {} genes",
            dataset.n_cells(),
            dataset.n_genes()
        );
        self.monitor.mark(SweepPhase::Extract);

        let inputs = self.pipeline.transform(dataset).await?;
        tracing::info!(
            "Diffused regulators over {} lags ({} features)",
            inputs.features.lag,
            inputs.features.design.ncols()
        );
        self.monitor.mark(SweepPhase::Transform);

        let report = self.pipeline.load(inputs).await?;
        self.monitor.mark(SweepPhase::Trials);
        self.monitor.finish(&report.records);

        tracing::info!(
            "Finished in {:.2?}; results in {}",
            start.elapsed(),
            report.trial_dir.display()
        );

        let failed = report.failed();
        if failed > 0 {
            return Err(LagError::TrialsFailed {
                failed,
                total: report.records.len(),
            });
        }
        Ok(report)
    }
}
