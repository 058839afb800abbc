use crate::{
    config::{ConfigErrors, HarnessConfig},
    corpus::{Corpus, CorpusError},
    index::{self, DiffIndex, IndexError},
    optimizer::{Optimizer, UnknownOptimizer},
    runs::{RunError, TestCase},
    tracker::{self, TrackerError},
};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error(transparent)]
    Optimizer(#[from] UnknownOptimizer),
    #[error(transparent)]
    Corpus(#[from] CorpusError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Run(#[from] RunError),
}

/// Run one (optimizer, benchmark) combination, timed or explain-only.
pub fn run_test_case(
    config: &HarnessConfig,
    optimizer: &Optimizer,
    test_case: &TestCase,
    explain: bool,
) -> Result<(), PipelineError> {
    info!(
        "Starting test case [{}] with optimizer [{optimizer}]",
        test_case.benchmark
    );

    test_case.run(config, optimizer, explain)?;

    Ok(())
}

/// Determine which variations plan differently under `optimizer` than under
/// `baseline` and persist that as the optimizer's differentiating index.
///
/// Missing plan sets are repaired with an explain pass first; the diff
/// itself never swallows errors, a corrupted index would silently produce
/// wrong skip decisions downstream.
pub fn identify_differentiating_queries(
    config: &HarnessConfig,
    optimizer: &Optimizer,
    baseline: &Optimizer,
    test_case: &TestCase,
) -> Result<DiffIndex, PipelineError> {
    for candidate in [optimizer, baseline] {
        if !tracker::is_complete(config, candidate, &test_case.benchmark)? {
            run_test_case(config, candidate, test_case, true)?;
        }
    }

    let corpus = Corpus::new(&config.query_root);
    let query_ids = corpus.query_ids(&test_case.benchmark)?;

    let diff = index::diff_plans(
        &query_ids,
        &config.plans_dir(&test_case.benchmark, optimizer),
        &config.plans_dir(&test_case.benchmark, baseline),
        optimizer,
        baseline,
    )?;

    index::store(&diff, &config.index_file(&test_case.benchmark, optimizer))?;

    Ok(diff)
}

/// Rebuild the baseline's index as the union of every non-baseline
/// optimizer's persisted index: every variation any optimizer disagrees with
/// the baseline on. Indices that don't exist yet are skipped.
pub fn union_of_differentiating_queries(
    config: &HarnessConfig,
    test_case: &TestCase,
) -> Result<DiffIndex, PipelineError> {
    let baseline = Optimizer::baseline();

    let mut indices = Vec::new();
    for optimizer in Optimizer::all() {
        if optimizer == baseline {
            continue;
        }

        let path = config.index_file(&test_case.benchmark, &optimizer);
        if path.exists() {
            info!("Loading differentiating queries for {optimizer}");
            indices.push(index::load(&path)?);
        }
    }

    let union = index::union(indices);
    index::store(&union, &config.index_file(&test_case.benchmark, &baseline))?;

    Ok(union)
}

/// Full differentiation pipeline for one benchmark. The step order is
/// load-bearing: indices are built before the union, the union before any
/// timed run consumes it.
pub fn end_to_end_explain_run(
    config: &HarnessConfig,
    test_case: &TestCase,
) -> Result<(), PipelineError> {
    let baseline = Optimizer::baseline();

    for optimizer in Optimizer::all() {
        run_test_case(config, &optimizer, test_case, true)?;
    }

    for optimizer in Optimizer::all() {
        if optimizer == baseline {
            continue;
        }

        identify_differentiating_queries(config, &optimizer, &baseline, test_case)?;
    }

    union_of_differentiating_queries(config, test_case)?;

    for optimizer in Optimizer::all() {
        let path = config.index_file(&test_case.benchmark, &optimizer);
        if !path.exists() {
            return Err(PipelineError::Index(IndexError::MissingIndex { path }));
        }

        run_test_case(config, &optimizer, test_case, false)?;
    }

    Ok(())
}

/// Timed sweep over all optimizers, reusing the persisted indices.
pub fn end_to_end_run(config: &HarnessConfig, test_case: &TestCase) -> Result<(), PipelineError> {
    for optimizer in Optimizer::all() {
        run_test_case(config, &optimizer, test_case, false)?;
    }

    Ok(())
}
