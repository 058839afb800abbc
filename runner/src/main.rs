use clap::{Parser, Subcommand};
use optbench_runner::{
    config::HarnessConfig,
    optimizer::Optimizer,
    pipeline::{self, PipelineError},
    runs::TestCase,
};
use std::{error::Error, path::PathBuf, process::exit};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "optbench", about = "Benchmark query-optimizer variants against a SQL engine")]
struct Cli {
    /// Harness config file
    #[arg(short, long, default_value = "optbench.yaml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one benchmark under one optimizer, timed or explain-only
    Run {
        /// Optimizer name (HEURISTIC, CARDINALITY, TABLE_SIZE, DATA_SIZE, DATA_SIZE_SIMPLIFIED)
        #[arg(short, long)]
        optimizer: String,
        /// Benchmark to be used
        #[arg(short, long)]
        benchmark: String,
        /// Capture explain plans instead of timing execution
        #[arg(short, long)]
        explain: bool,
    },
    /// Build the differentiating indices for a benchmark and rebuild the baseline union
    Index {
        #[arg(short, long)]
        benchmark: String,
    },
    /// Full pipeline: explain every optimizer, build indices, rebuild the union, time every optimizer
    Pipeline {
        #[arg(short, long)]
        benchmark: String,
    },
    /// Timed sweep over every optimizer, reusing persisted indices
    Sweep {
        #[arg(short, long)]
        benchmark: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(error) = run(&cli) {
        error!("{error}");

        let mut cause = error.source();
        while let Some(current) = cause {
            error!("caused by: {current}");
            cause = current.source();
        }

        exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), PipelineError> {
    let config = HarnessConfig::load(&cli.config)?;

    match &cli.command {
        Command::Run {
            optimizer,
            benchmark,
            explain,
        } => {
            let optimizer: Optimizer = optimizer.parse()?;
            pipeline::run_test_case(&config, &optimizer, &TestCase::from_name(benchmark), *explain)
        }
        Command::Index { benchmark } => {
            let test_case = TestCase::from_name(benchmark);
            let baseline = Optimizer::baseline();

            for optimizer in Optimizer::all() {
                if optimizer == baseline {
                    continue;
                }

                pipeline::identify_differentiating_queries(
                    &config, &optimizer, &baseline, &test_case,
                )?;
            }

            pipeline::union_of_differentiating_queries(&config, &test_case)?;

            Ok(())
        }
        Command::Pipeline { benchmark } => {
            pipeline::end_to_end_explain_run(&config, &TestCase::from_name(benchmark))
        }
        Command::Sweep { benchmark } => {
            pipeline::end_to_end_run(&config, &TestCase::from_name(benchmark))
        }
    }
}
