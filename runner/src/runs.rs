use crate::{
    config::HarnessConfig,
    corpus::{Corpus, CorpusError},
    engine::{EngineError, EngineSession, QueryRunStatus},
    index::{self, IndexError},
    optimizer::{EngineSettings, Optimizer},
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, io};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Corpus(#[from] CorpusError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("Failed to persist run artifacts")]
    Io(#[from] io::Error),
    #[error("Failed to serialize run artifacts")]
    Json(#[from] serde_json::Error),
}

/// one timed variation inside a result file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub variation_id: u32,
    pub duration: f64,
    pub status: QueryRunStatus,
    pub message: String,
}

/// result-file shape: query id -> ordered variation results
pub type TimedResults = BTreeMap<String, Vec<QueryResult>>;

/// One benchmark run against one connection.
///
/// `raise_on_error` decides whether a failing query aborts the whole run or
/// is captured as a FAILED result while the run continues.
#[derive(Debug, Clone)]
pub struct TestCase {
    pub benchmark: String,
    pub raise_on_error: bool,
}

impl TestCase {
    pub fn new(benchmark: impl Into<String>, raise_on_error: bool) -> Self {
        Self {
            benchmark: benchmark.into(),
            raise_on_error,
        }
    }

    /// named benchmarks abort on the first failure
    pub fn from_name(benchmark: &str) -> Self {
        Self::new(benchmark, true)
    }

    pub fn run(
        &self,
        config: &HarnessConfig,
        optimizer: &Optimizer,
        explain: bool,
    ) -> Result<(), RunError> {
        if explain {
            self.run_explains(config, optimizer)
        } else {
            let results = self.run_timed(config, optimizer)?;
            self.save_timed_results(config, optimizer, &results)
        }
    }

    /// Explain pass: materialize the plan cache for every (query, variation).
    ///
    /// Plan files are immutable cache entries; an existing file is skipped,
    /// never regenerated.
    pub fn run_explains(
        &self,
        config: &HarnessConfig,
        optimizer: &Optimizer,
    ) -> Result<(), RunError> {
        let corpus = Corpus::new(&config.query_root);
        let settings = EngineSettings::new(*optimizer, config.bridge_cost);
        let session = EngineSession::open(&config.connection, &settings)?;

        for query_id in corpus.query_ids(&self.benchmark)? {
            info!("======= Explaining query: {query_id} =======");

            let query_dir = config.plans_dir(&self.benchmark, optimizer).join(&query_id);
            fs::create_dir_all(&query_dir)?;

            for variation_id in corpus.variation_ids(&self.benchmark, &query_id)? {
                let plan_path = query_dir.join(format!("{variation_id}.json"));

                if plan_path.exists() {
                    info!("Skipping [{query_id}][{variation_id}]");
                    continue;
                }

                let sql = corpus.query_text(&self.benchmark, &query_id, variation_id, true)?;

                if let Some(plan) = session.explain(&sql, self.raise_on_error)? {
                    // normalize the payload so cached plans compare cleanly
                    let plan: serde_json::Value = serde_json::from_str(&plan)?;
                    fs::write(&plan_path, serde_json::to_string_pretty(&plan)?)?;

                    info!("Explain of [{query_id}][{variation_id}] [SUCCESS].");
                }
            }
        }

        session.close()?;

        Ok(())
    }

    /// Timed pass: execute exactly the variations the differentiating index
    /// lists for this optimizer, nothing else.
    pub fn run_timed(
        &self,
        config: &HarnessConfig,
        optimizer: &Optimizer,
    ) -> Result<TimedResults, RunError> {
        let variations = index::load(&config.index_file(&self.benchmark, optimizer))?;

        let corpus = Corpus::new(&config.query_root);
        let settings = EngineSettings::new(*optimizer, config.bridge_cost);
        let session = EngineSession::open(&config.connection, &settings)?;

        let mut all_results = TimedResults::new();

        for query_id in corpus.query_ids(&self.benchmark)? {
            info!("======= Executing query: {query_id} =======");

            let selected = variations
                .get(&query_id)
                .ok_or_else(|| IndexError::MissingQuery {
                    query_id: query_id.clone(),
                })?;

            let mut results_for_query = Vec::with_capacity(selected.len());

            for &variation_id in selected {
                let sql = corpus.query_text(&self.benchmark, &query_id, variation_id, false)?;
                let outcome = session.execute(&sql, self.raise_on_error)?;

                info!(
                    "Execution of [{query_id}][{variation_id}] took {:.6} seconds [{}].",
                    outcome.duration, outcome.status
                );

                results_for_query.push(QueryResult {
                    variation_id,
                    duration: outcome.duration,
                    status: outcome.status,
                    message: outcome.message,
                });
            }

            all_results.insert(query_id, results_for_query);
        }

        session.close()?;

        Ok(all_results)
    }

    /// Serialize one run to a freshly timestamped file; repeated runs
    /// accumulate instead of overwriting.
    pub fn save_timed_results(
        &self,
        config: &HarnessConfig,
        optimizer: &Optimizer,
        results: &TimedResults,
    ) -> Result<(), RunError> {
        let results_dir = config.timed_results_dir(&self.benchmark, optimizer);
        fs::create_dir_all(&results_dir)?;

        let timestamp = Local::now().format("%Y%m%d%H%M%S");
        let path = results_dir.join(format!("{timestamp}.json"));

        fs::write(&path, serde_json::to_string_pretty(results)?)?;
        info!("Saved timed results to {}", path.display());

        Ok(())
    }
}
