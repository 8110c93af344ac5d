use crate::tune::resources::Resources;
use crate::utils::error::{LagError, Result};
use crate::utils::monitor;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// One finished grid point.
#[derive(Debug)]
pub struct TrialRun<T> {
    pub lam: f64,
    pub result: Result<T>,
    pub elapsed: Duration,
}

/// Grid search executor: runs a blocking trainable once per lambda, as many
/// at a time as the per-trial resource request allows.
#[derive(Debug, Clone)]
pub struct TuneRunner {
    resources: Resources,
    max_concurrent: usize,
}

impl TuneRunner {
    pub fn new(resources: Resources, cap: Option<usize>) -> Self {
        let cpus = rayon::current_num_threads();
        let max_concurrent = resources.max_concurrency(cpus, monitor::total_memory_bytes(), cap);
        Self {
            resources,
            max_concurrent,
        }
    }

    pub fn with_concurrency(resources: Resources, max_concurrent: usize) -> Self {
        Self {
            resources,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn resources(&self) -> Resources {
        self.resources
    }

    /// Run every lambda; failures are reported per trial and never cancel
    /// the rest. Results come back in grid order.
    pub async fn run<T, F>(&self, lams: &[f64], trainable: F) -> Result<Vec<TrialRun<T>>>
    where
        T: Send + 'static,
        F: Fn(f64) -> Result<T> + Send + Sync + 'static,
    {
        let trainable = Arc::new(trainable);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        tracing::info!(
            "Launching {} trials ({} concurrent, {} cpu / {} MiB each)",
            lams.len(),
            self.max_concurrent,
            self.resources.cpu,
            self.resources.memory_bytes / 1024 / 1024
        );

        let mut handles = Vec::with_capacity(lams.len());
        for &lam in lams {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| LagError::processing(format!("trial scheduler closed: {}", e)))?;
            let trainable = Arc::clone(&trainable);
            handles.push((
                lam,
                tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    let start = Instant::now();
                    tracing::debug!("Trial lam={} started", lam);
                    let result = trainable(lam);
                    (result, start.elapsed())
                }),
            ));
        }

        let mut runs = Vec::with_capacity(handles.len());
        for (lam, handle) in handles {
            let run = match handle.await {
                Ok((result, elapsed)) => TrialRun {
                    lam,
                    result,
                    elapsed,
                },
                Err(e) if e.is_panic() => TrialRun {
                    lam,
                    result: Err(LagError::training(format!("trial panicked: {}", e))),
                    elapsed: Duration::ZERO,
                },
                Err(e) => return Err(LagError::JoinError(e)),
            };
            match &run.result {
                Ok(_) => tracing::info!("Trial lam={} finished in {:.2?}", lam, run.elapsed),
                Err(e) => tracing::error!("Trial lam={} failed: {}", lam, e),
            }
            runs.push(run);
        }
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_results_in_grid_order() {
        let runner = TuneRunner::with_concurrency(Resources::default(), 3);
        let runs = runner
            .run(&[0.1, 1.0, 10.0], |lam| Ok(lam * 2.0))
            .await
            .unwrap();
        let values: Vec<f64> = runs.iter().map(|r| *r.result.as_ref().unwrap()).collect();
        assert_eq!(values, vec![0.2, 2.0, 20.0]);
        assert_eq!(runs[2].lam, 10.0);
    }

    #[tokio::test]
    async fn test_failures_do_not_cancel_other_trials() {
        let runner = TuneRunner::with_concurrency(Resources::default(), 2);
        let runs = runner
            .run(&[0.1, 1.0, 10.0], |lam| {
                if lam == 1.0 {
                    Err(LagError::training("diverged"))
                } else {
                    Ok(lam)
                }
            })
            .await
            .unwrap();
        assert!(runs[0].result.is_ok());
        assert!(runs[1].result.is_err());
        assert!(runs[2].result.is_ok());
    }

    #[tokio::test]
    async fn test_panicking_trial_is_recorded() {
        let runner = TuneRunner::with_concurrency(Resources::default(), 1);
        let runs = runner
            .run(&[0.5, 2.0], |lam| {
                if lam > 1.0 {
                    panic!("boom");
                }
                Ok(lam)
            })
            .await
            .unwrap();
        assert!(runs[0].result.is_ok());
        assert!(runs[1].result.is_err());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (running.clone(), peak.clone());

        let runner = TuneRunner::with_concurrency(Resources::default(), 2);
        runner
            .run(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], move |lam| {
                let now = r.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(20));
                r.fetch_sub(1, Ordering::SeqCst);
                Ok(lam)
            })
            .await
            .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(running.load(Ordering::SeqCst), 0);
    }
}
