use crate::adapters::dataset::load_dataset;
use crate::adapters::results::{
    gc_csv, loss_csv, time_txt, to_json, trial_stem, zip_archive, SweepSummary,
};
use crate::core::{ConfigProvider, Pipeline, Storage};
use crate::domain::model::{
    Dataset, DiffusedInputs, RunPaths, SweepReport, TrialRecord, TrialStatus,
};
use crate::graph::diffusion::calculate_ax;
use crate::graph::{build_lookback_operator, GraphOptions};
use crate::model::train_model;
use crate::tune::TuneRunner;
use crate::utils::error::Result;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Lookback operator, regulator/target split and lagged diffusion.
pub fn diffuse(dataset: &Dataset, options: GraphOptions, lag: usize) -> Result<DiffusedInputs> {
    let b = build_lookback_operator(dataset, options)?;
    let regulators = dataset.regulators();
    let targets = dataset.targets();
    tracing::info!(
        "# of Regs: {}, # of Targets: {}",
        regulators.names.len(),
        targets.names.len()
    );

    let features = calculate_ax(&b, &regulators.values, lag)?;
    Ok(DiffusedInputs {
        regulator_names: regulators.names,
        target_names: targets.names,
        features,
        targets: targets.values,
    })
}

fn storage_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub struct GrangerPipeline<S: Storage, C: ConfigProvider> {
    storage: S,
    config: C,
}

impl<S: Storage, C: ConfigProvider> GrangerPipeline<S, C> {
    pub fn new(storage: S, config: C) -> Self {
        Self { storage, config }
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    /// Run layout relative to the storage root.
    pub fn paths(&self) -> RunPaths {
        let dir_name = self.config.training().dir_name(self.config.dynamics());
        RunPaths::new(Path::new(""), self.config.dataset(), dir_name)
    }

    async fn write_trial_file(
        &self,
        paths: &RunPaths,
        name: String,
        data: Vec<u8>,
        archived: &mut Vec<(String, Vec<u8>)>,
    ) -> Result<()> {
        self.storage
            .write_file(&storage_key(&paths.trial_dir.join(&name)), &data)
            .await?;
        if self.config.archive() {
            archived.push((name, data));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for GrangerPipeline<S, C> {
    async fn extract(&self) -> Result<Dataset> {
        let paths = self.paths();
        let dir = storage_key(&paths.data_dir);
        tracing::info!("Loading dataset '{}' from {}", self.config.dataset(), dir);
        load_dataset(&self.storage, &dir, self.config.dataset()).await
    }

    async fn transform(&self, data: Dataset) -> Result<DiffusedInputs> {
        let options = GraphOptions {
            dynamics: self.config.dynamics(),
            proba: self.config.proba(),
            root_cell: self.config.root_cell(),
        };
        let lag = self.config.training().lag;
        tracing::debug!("Building {} lookback operator (proba={})", options.dynamics, options.proba);

        tokio::task::spawn_blocking(move || diffuse(&data, options, lag)).await?
    }

    async fn load(&self, inputs: DiffusedInputs) -> Result<SweepReport> {
        let start = Instant::now();
        let paths = self.paths();
        let settings = self.config.training();
        let grid = self.config.lam_grid();
        grid.validate()?;
        let lams = grid.values();

        let runner = TuneRunner::new(self.config.resources(), self.config.max_concurrent_trials());
        let inputs = Arc::new(inputs);
        let shared = Arc::clone(&inputs);
        let trainer = settings.clone();
        let runs = runner
            .run(&lams, move |lam| train_model(&trainer.trial_config(lam), &shared))
            .await?;

        let mut records = Vec::with_capacity(runs.len());
        let mut archived = Vec::new();
        for run in runs {
            let stem = trial_stem(run.lam);
            let record = match run.result {
                Ok(outcome) => {
                    let gc = gc_csv(&inputs.regulator_names, &inputs.target_names, &outcome.gc)?;
                    self.write_trial_file(&paths, format!("{}.gc.csv", stem), gc, &mut archived)
                        .await?;
                    let loss = loss_csv(&outcome.loss_trace)?;
                    self.write_trial_file(&paths, format!("{}.loss.csv", stem), loss, &mut archived)
                        .await?;
                    TrialRecord {
                        lam: run.lam,
                        status: TrialStatus::Completed,
                        iterations: outcome.iterations,
                        final_loss: Some(outcome.best_loss),
                        early_stopped: outcome.early_stopped,
                        elapsed_secs: run.elapsed.as_secs_f64(),
                        finished_at: Utc::now(),
                        error: None,
                    }
                }
                Err(e) => TrialRecord {
                    lam: run.lam,
                    status: TrialStatus::Errored,
                    iterations: 0,
                    final_loss: None,
                    early_stopped: false,
                    elapsed_secs: run.elapsed.as_secs_f64(),
                    finished_at: Utc::now(),
                    error: Some(e.to_string()),
                },
            };
            self.write_trial_file(&paths, format!("{}.json", stem), to_json(&record)?, &mut archived)
                .await?;
            records.push(record);
        }
        records.sort_by(|a, b| a.lam.total_cmp(&b.lam));

        let total_secs = start.elapsed().as_secs_f64();
        let failed = records
            .iter()
            .filter(|r| r.status == TrialStatus::Errored)
            .count();
        let summary = SweepSummary {
            dataset: self.config.dataset(),
            dir_name: &paths.dir_name,
            config: &settings,
            max_concurrent_trials: runner.max_concurrent(),
            total_secs,
            completed: records.len() - failed,
            failed,
            trials: &records,
        };
        self.storage
            .write_file(
                &storage_key(&paths.analysis_dir.join("sweep.json")),
                &to_json(&summary)?,
            )
            .await?;
        self.storage
            .write_file(&storage_key(&paths.time_file), &time_txt(total_secs))
            .await?;
        tracing::info!("Sweep took {:.3}s ({} trials)", total_secs, records.len());

        if self.config.archive() {
            let zip_path = paths.gc_dir.join(format!("{}.zip", paths.dir_name));
            tracing::debug!("Archiving {} files to {}", archived.len(), zip_path.display());
            self.storage
                .write_file(&storage_key(&zip_path), &zip_archive(&archived)?)
                .await?;
        }

        Ok(SweepReport {
            trial_dir: self.storage.base_path().join(&paths.trial_dir),
            records,
            total_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::LocalStorage;
    use crate::domain::model::{Dynamics, TrainingSettings};
    use crate::tune::{LamGrid, Resources};
    use tempfile::TempDir;

    struct MockConfig {
        root: std::path::PathBuf,
        dynamics: Dynamics,
        archive: bool,
    }

    impl ConfigProvider for MockConfig {
        fn dataset(&self) -> &str {
            "toy"
        }

        fn root_dir(&self) -> &Path {
            &self.root
        }

        fn dynamics(&self) -> Dynamics {
            self.dynamics
        }

        fn proba(&self) -> bool {
            false
        }

        fn root_cell(&self) -> Option<usize> {
            None
        }

        fn training(&self) -> TrainingSettings {
            TrainingSettings {
                lag: 2,
                max_iter: 40,
                check_every: 10,
                learning_rate: 0.01,
                ..TrainingSettings::default()
            }
        }

        fn lam_grid(&self) -> LamGrid {
            LamGrid {
                explicit: Some(vec![1.0, 0.1]),
                ..LamGrid::default()
            }
        }

        fn resources(&self) -> Resources {
            Resources::default()
        }

        fn max_concurrent_trials(&self) -> Option<usize> {
            Some(2)
        }

        fn archive(&self) -> bool {
            self.archive
        }
    }

    async fn write_toy_dataset(storage: &LocalStorage) {
        let dir = "datasets/preprocessed/toy";
        let mut x = String::from("cell,g0,g1,g2\n");
        let mut obs = String::from("cell,dpt_pseudotime\n");
        let mut edges = String::from("source,target,distance\n");
        for i in 0..6 {
            let t = i as f32 / 5.0;
            x.push_str(&format!("c{},{},{},{}\n", i, t, 1.0 - t, t * t));
            obs.push_str(&format!("c{},{}\n", i, t));
            if i < 5 {
                edges.push_str(&format!("{},{},1.0\n{},{},1.0\n", i, i + 1, i + 1, i));
            }
        }
        let var = "gene,is_reg,is_target\ng0,1,0\ng1,1,0\ng2,0,1\n";
        for (file, body) in [
            ("X.csv", x),
            ("obs.csv", obs),
            ("distances.csv", edges),
            ("var.csv", var.to_string()),
        ] {
            storage
                .write_file(&format!("{}/{}", dir, file), body.as_bytes())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_extract_and_transform() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());
        write_toy_dataset(&storage).await;
        let config = MockConfig {
            root: dir.path().to_path_buf(),
            dynamics: Dynamics::Pseudotime,
            archive: false,
        };
        let pipeline = GrangerPipeline::new(storage, config);

        let dataset = pipeline.extract().await.unwrap();
        assert_eq!(dataset.n_cells(), 6);

        let inputs = pipeline.transform(dataset).await.unwrap();
        assert_eq!(inputs.regulator_names, vec!["g0", "g1"]);
        assert_eq!(inputs.target_names, vec!["g2"]);
        assert_eq!(inputs.features.design.dim(), (6, 4));
        // the earliest cell has no predecessors
        assert!(inputs.features.design.row(0).iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn test_load_writes_trial_files() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());
        write_toy_dataset(&storage).await;
        let config = MockConfig {
            root: dir.path().to_path_buf(),
            dynamics: Dynamics::Pseudotime,
            archive: true,
        };
        let pipeline = GrangerPipeline::new(storage, config);
        let paths = pipeline.paths();

        let dataset = pipeline.extract().await.unwrap();
        let inputs = pipeline.transform(dataset).await.unwrap();
        let report = pipeline.load(inputs).await.unwrap();

        assert_eq!(report.failed(), 0);
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[0].lam, 0.1);
        assert_eq!(report.trial_dir, dir.path().join(&paths.trial_dir));

        for file in ["lam0.1.gc.csv", "lam0.1.loss.csv", "lam0.1.json", "lam1.gc.csv"] {
            assert!(report.trial_dir.join(file).exists(), "missing {}", file);
        }
        let time = std::fs::read_to_string(dir.path().join(&paths.time_file)).unwrap();
        assert!(time.trim_end().contains("e+") || time.trim_end().contains("e-"));
        assert!(dir.path().join(&paths.analysis_dir).join("sweep.json").exists());
        assert!(dir
            .path()
            .join(&paths.gc_dir)
            .join(format!("{}.zip", paths.dir_name))
            .exists());
    }

    #[test]
    fn test_paths_follow_settings() {
        let pipeline = GrangerPipeline::new(
            LocalStorage::new("/proj"),
            MockConfig {
                root: "/proj".into(),
                dynamics: Dynamics::RnaVelocity,
                archive: false,
            },
        );
        let paths = pipeline.paths();
        assert_eq!(paths.dir_name, "baseline.trial0.h16.H.lag2.rna_velocity");
        assert_eq!(
            paths.trial_dir,
            Path::new("results/toy/gc/baseline.trial0.h16.H.lag2.rna_velocity")
        );
    }
}
