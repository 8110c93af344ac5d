use anyhow::Context;
use clap::Parser;
use tf_lag::core::ConfigProvider;
use tf_lag::domain::model::RunPaths;
use tf_lag::tune::TuneRunner;
use tf_lag::utils::error::ErrorSeverity;
use tf_lag::utils::{logger, validation::Validate};
use tf_lag::{GrangerPipeline, LocalStorage, SweepEngine, TomlConfig};

#[derive(Parser)]
#[command(name = "toml-sweep")]
#[command(about = "Run a Granger causality sweep described by a TOML file")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "sweep.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    monitor: Option<bool>,

    /// Show the resolved plan without reading data or training
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match TomlConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    // 初始化日誌
    if config.json_logs() {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(args.verbose);
    }
    tracing::info!("📁 Loaded configuration from: {}", args.config);

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    display_config_summary(&config, &args);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - no data will be read");
        perform_dry_run(&config)?;
        return Ok(());
    }

    let monitor_enabled = args.monitor.unwrap_or_else(|| config.monitoring_enabled());
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let storage = LocalStorage::new(config.root_dir().to_path_buf());
    let pipeline = GrangerPipeline::new(storage, config);
    let engine = SweepEngine::new_with_monitoring(pipeline, monitor_enabled);

    match engine.run().await {
        Ok(report) => {
            tracing::info!("✅ Sweep completed: {} trials", report.records.len());
            println!("✅ Sweep completed in {:.2}s", report.total_secs);
            println!("📁 Results saved to: {}", report.trial_dir.display());
        }
        Err(e) => {
            tracing::error!(
                "❌ Sweep failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}

fn display_config_summary(config: &TomlConfig, args: &Args) {
    let training = config.training();
    println!("📋 Configuration Summary:");
    println!("  Dataset: {}", config.dataset());
    println!("  Root: {}", config.root_dir().display());
    println!("  Dynamics: {} (proba: {})", config.dynamics(), config.proba());
    println!(
        "  Model: {} / {} penalty, lag {}, hidden {}",
        training.method, training.penalty, training.lag, training.hidden
    );
    println!(
        "  Training: {} iterations, lr {}, check every {}",
        training.max_iter, training.learning_rate, training.check_every
    );

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}

fn perform_dry_run(config: &TomlConfig) -> anyhow::Result<()> {
    let training = config.training();
    let paths = RunPaths::new(
        config.root_dir(),
        config.dataset(),
        training.dir_name(config.dynamics()),
    );

    println!("🔍 Dry Run Analysis:");
    println!();

    println!("📂 Directories:");
    let data_state = if paths.data_dir.is_dir() { "found" } else { "MISSING" };
    println!("  Input: {} ({})", paths.data_dir.display(), data_state);
    println!("  Trials: {}", paths.trial_dir.display());
    println!("  Time file: {}", paths.time_file.display());
    println!("  Sweep log: {}", paths.analysis_dir.display());
    if config.archive() {
        println!("  Archive: {}.zip", paths.trial_dir.display());
    }

    println!();
    let lams = config.lam_grid().values();
    println!("📊 Lambda grid ({} trials):", lams.len());
    let rendered: Vec<String> = lams.iter().map(|l| l.to_string()).collect();
    println!("  {}", rendered.join(", "));

    println!();
    let resources = config.resources();
    let runner = TuneRunner::new(resources, config.max_concurrent_trials());
    println!("⚙️ Resources:");
    println!(
        "  Per trial: {} cpu, {} MiB",
        resources.cpu,
        resources.memory_bytes / 1024 / 1024
    );
    println!("  Concurrent trials: {}", runner.max_concurrent());

    let plan = serde_json::to_string_pretty(&training).context("rendering training settings")?;
    println!();
    println!("🛠️ Training settings:");
    println!("{}", plan);

    println!();
    println!("✅ Dry run analysis complete.");

    Ok(())
}
