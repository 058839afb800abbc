mod aggregate;

use aggregate::AggregateError;
use clap::Parser;
use optbench_runner::{config::HarnessConfig, optimizer::Optimizer};
use std::{error::Error, path::PathBuf, process::exit};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "optbench-analysis",
    about = "Aggregate timed benchmark results and publish them to the results store"
)]
struct Args {
    /// Benchmark whose timed results get aggregated
    #[arg(short, long)]
    benchmark: String,

    /// Restrict to one optimizer, defaults to every configuration
    #[arg(short, long)]
    optimizer: Option<String>,

    /// Harness config file
    #[arg(short, long, default_value = "optbench.yaml")]
    config: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if let Err(error) = run(&args) {
        error!("{error}");

        let mut cause = error.source();
        while let Some(current) = cause {
            error!("caused by: {current}");
            cause = current.source();
        }

        exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let config = HarnessConfig::load(&args.config)?;

    let optimizers: Vec<Optimizer> = match &args.optimizer {
        Some(name) => vec![name.parse()?],
        None => Optimizer::all().to_vec(),
    };

    for optimizer in optimizers {
        publish_aggregates(&config, &args.benchmark, &optimizer)?;
    }

    Ok(())
}

fn publish_aggregates(
    config: &HarnessConfig,
    benchmark: &str,
    optimizer: &Optimizer,
) -> Result<(), AggregateError> {
    let results_dir = config.timed_results_dir(benchmark, optimizer);
    let samples = aggregate::collect_samples(&results_dir)?;

    if samples.is_empty() {
        warn!("No timed results for [{benchmark}][{optimizer}], nothing to publish");
        return Ok(());
    }

    let rows = aggregate::aggregate(samples);
    aggregate::publish(config, benchmark, optimizer, &rows)?;

    info!(
        "Aggregated {} (query, variation) pairs for [{benchmark}][{optimizer}]",
        rows.len()
    );

    Ok(())
}
