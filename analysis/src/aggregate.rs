use globset::Glob;
use itertools::Itertools;
use optbench_runner::{
    config::HarnessConfig,
    engine::{EngineError, EngineSession},
    optimizer::{EngineSettings, Optimizer},
    runs::TimedResults,
};
use std::{fs, io, path::Path};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("Failed to read timed-result files")]
    Io(#[from] io::Error),
    #[error("Timed-result file is not valid JSON")]
    Json(#[from] serde_json::Error),
    #[error("Result-file glob was invalid")]
    Glob(#[from] globset::Error),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("Results store rejected statement")]
    Store(#[from] duckdb::Error),
}

/// mean and sample standard deviation over all runs of one variation
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    pub query_id: String,
    pub variation_id: u32,
    pub runs: usize,
    pub mean: f64,
    pub std: Option<f64>,
}

/// Flatten every timed-result file in `results_dir` to
/// (query id, variation id, duration) samples.
pub fn collect_samples(results_dir: &Path) -> Result<Vec<(String, u32, f64)>, AggregateError> {
    let mut samples = Vec::new();

    if !results_dir.is_dir() {
        return Ok(samples);
    }

    let matcher = Glob::new("*.json")?.compile_matcher();

    for entry in fs::read_dir(results_dir)? {
        let path = entry?.path();

        if path.file_name().map_or(true, |name| !matcher.is_match(name)) {
            continue;
        }

        debug!("Loading timed results from {}", path.display());
        let results: TimedResults = serde_json::from_str(&fs::read_to_string(&path)?)?;

        for (query_id, timed_variations) in results {
            for result in timed_variations {
                samples.push((query_id.clone(), result.variation_id, result.duration));
            }
        }
    }

    Ok(samples)
}

/// Group samples by (query id, variation id) and reduce to mean and sample
/// standard deviation. A variation seen only once has no deviation.
pub fn aggregate(samples: Vec<(String, u32, f64)>) -> Vec<AggregateRow> {
    samples
        .into_iter()
        .map(|(query_id, variation_id, duration)| ((query_id, variation_id), duration))
        .into_group_map()
        .into_iter()
        .map(|((query_id, variation_id), durations)| {
            let runs = durations.len();
            let mean = durations.iter().sum::<f64>() / runs as f64;
            let std = (runs > 1).then(|| {
                (durations
                    .iter()
                    .map(|duration| (duration - mean).powi(2))
                    .sum::<f64>()
                    / (runs - 1) as f64)
                    .sqrt()
            });

            AggregateRow {
                query_id,
                variation_id,
                runs,
                mean,
                std,
            }
        })
        .sorted_by(|a, b| {
            a.query_id
                .cmp(&b.query_id)
                .then(a.variation_id.cmp(&b.variation_id))
        })
        .collect()
}

/// Publish one optimizer's aggregate table to the results store, replacing
/// any prior table of that name. Schema is namespaced by benchmark, the
/// table is named for the optimizer.
pub fn publish(
    config: &HarnessConfig,
    benchmark: &str,
    optimizer: &Optimizer,
    rows: &[AggregateRow],
) -> Result<(), AggregateError> {
    let settings = EngineSettings::new(Optimizer::baseline(), config.bridge_cost);
    let session = EngineSession::open(&config.store, &settings)?;
    let connection = session.raw();

    connection.execute(&format!("CREATE SCHEMA IF NOT EXISTS {benchmark}"), [])?;

    let table = format!("{benchmark}.{}", optimizer.name().to_lowercase());
    connection.execute(
        &format!(
            "CREATE OR REPLACE TABLE {table} (
                query_id VARCHAR NOT NULL,
                variation_id INTEGER NOT NULL,
                runs INTEGER NOT NULL,
                mean DOUBLE NOT NULL,
                std DOUBLE
            )"
        ),
        [],
    )?;

    let mut statement =
        connection.prepare(&format!("INSERT INTO {table} VALUES (?, ?, ?, ?, ?)"))?;
    for row in rows {
        statement.execute(duckdb::params![
            row.query_id,
            row.variation_id,
            row.runs as i64,
            row.mean,
            row.std,
        ])?;
    }
    drop(statement);

    info!("Published {} aggregate rows to {table}", rows.len());

    session.close()?;

    Ok(())
}
