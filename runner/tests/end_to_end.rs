use optbench_runner::{
    config::{ConnectionConfig, HarnessConfig},
    engine::QueryRunStatus,
    index::{self, DiffIndex, IndexError},
    optimizer::{EstimationFunction, Optimizer},
    pipeline,
    runs::{RunError, TestCase, TimedResults},
    tracker,
};
use std::fs;
use tempfile::TempDir;

const BENCHMARK: &str = "tpch";

fn test_config(root: &std::path::Path) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.query_root = root.join("data");
    config.results_root = root.join("results");
    config.index_root = root.join("index");
    config.connection = ConnectionConfig::default();
    config
}

fn write_corpus(config: &HarnessConfig, queries: &[(&str, &[(u32, &str)])]) {
    for (query_id, variations) in queries {
        let query_dir = config
            .query_root
            .join(BENCHMARK)
            .join("queries")
            .join(query_id);
        fs::create_dir_all(&query_dir).unwrap();

        for (variation_id, sql) in variations.iter() {
            fs::write(query_dir.join(format!("{variation_id}.sql")), sql).unwrap();
        }
    }
}

fn default_corpus(config: &HarnessConfig) {
    write_corpus(
        config,
        &[
            (
                "q01",
                &[(1, "SELECT 1"), (2, "SELECT 1 + 1"), (3, "SELECT 2")],
            ),
            ("q02", &[(1, "SELECT 'x'")]),
        ],
    );
}

fn candidate() -> Optimizer {
    Optimizer::CostBased(EstimationFunction::Cardinality)
}

#[test]
fn explain_pass_materializes_plans_and_never_regenerates() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    default_corpus(&config);

    let test_case = TestCase::from_name(BENCHMARK);
    let optimizer = candidate();

    test_case.run_explains(&config, &optimizer).unwrap();

    for (query_id, variation_id) in [("q01", 1), ("q01", 2), ("q01", 3), ("q02", 1)] {
        let plan_path = config.plan_file(BENCHMARK, &optimizer, query_id, variation_id);
        let plan = fs::read_to_string(&plan_path).unwrap();
        serde_json::from_str::<serde_json::Value>(&plan).unwrap();
    }

    assert!(tracker::is_complete(&config, &optimizer, BENCHMARK).unwrap());

    // plan files are immutable cache entries: a second pass must skip them
    let sentinel_path = config.plan_file(BENCHMARK, &optimizer, "q01", 1);
    fs::write(&sentinel_path, "SENTINEL").unwrap();

    test_case.run_explains(&config, &optimizer).unwrap();

    assert_eq!(fs::read_to_string(&sentinel_path).unwrap(), "SENTINEL");
}

#[test]
fn identify_repairs_plans_and_diffs_against_baseline() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    default_corpus(&config);

    let test_case = TestCase::from_name(BENCHMARK);
    let optimizer = candidate();
    let baseline = Optimizer::baseline();

    // neither plan set exists yet, identify has to run both explain passes
    let diff =
        pipeline::identify_differentiating_queries(&config, &optimizer, &baseline, &test_case)
            .unwrap();

    // the stock engine ignores the optimizer settings, so plans are identical
    assert_eq!(
        diff.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["q01", "q02"]
    );
    assert!(diff.values().all(|variations| variations.is_empty()));
    assert!(config.index_file(BENCHMARK, &optimizer).exists());

    // doctor one candidate plan; completion checks look at directories only,
    // so the next diff sees the changed bytes
    let doctored = config.plan_file(BENCHMARK, &optimizer, "q01", 3);
    fs::write(&doctored, "{\"doctored\": true}").unwrap();

    let diff =
        pipeline::identify_differentiating_queries(&config, &optimizer, &baseline, &test_case)
            .unwrap();

    assert_eq!(diff["q01"], vec![3]);
    assert!(diff["q02"].is_empty());
}

#[test]
fn union_rebuilds_the_baseline_index() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    default_corpus(&config);

    let test_case = TestCase::from_name(BENCHMARK);

    index::store(
        &DiffIndex::from([("q01".to_owned(), vec![1, 2])]),
        &config.index_file(
            BENCHMARK,
            &Optimizer::CostBased(EstimationFunction::Cardinality),
        ),
    )
    .unwrap();
    index::store(
        &DiffIndex::from([("q01".to_owned(), vec![2, 3]), ("q02".to_owned(), vec![])]),
        &config.index_file(
            BENCHMARK,
            &Optimizer::CostBased(EstimationFunction::TableSize),
        ),
    )
    .unwrap();

    let union = pipeline::union_of_differentiating_queries(&config, &test_case).unwrap();

    assert_eq!(union["q01"], vec![1, 2, 3]);
    assert!(union["q02"].is_empty());

    let persisted = index::load(&config.index_file(BENCHMARK, &Optimizer::baseline())).unwrap();
    assert_eq!(persisted, union);
}

#[test]
fn timed_run_executes_only_indexed_variations() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    default_corpus(&config);

    let test_case = TestCase::from_name(BENCHMARK);
    let optimizer = candidate();

    index::store(
        &DiffIndex::from([("q01".to_owned(), vec![2]), ("q02".to_owned(), vec![])]),
        &config.index_file(BENCHMARK, &optimizer),
    )
    .unwrap();

    test_case.run(&config, &optimizer, false).unwrap();

    let results_dir = config.timed_results_dir(BENCHMARK, &optimizer);
    let files: Vec<_> = fs::read_dir(&results_dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(files.len(), 1);

    let results: TimedResults =
        serde_json::from_str(&fs::read_to_string(&files[0]).unwrap()).unwrap();

    assert_eq!(results["q01"].len(), 1);
    assert_eq!(results["q01"][0].variation_id, 2);
    assert_eq!(results["q01"][0].status, QueryRunStatus::Success);
    assert!(results["q02"].is_empty());
}

#[test]
fn timed_run_without_index_fails() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    default_corpus(&config);

    let result = TestCase::from_name(BENCHMARK).run_timed(&config, &candidate());

    assert!(matches!(
        result,
        Err(RunError::Index(IndexError::MissingIndex { .. }))
    ));
}

#[test]
fn failing_variation_aborts_when_raising() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_corpus(
        &config,
        &[(
            "q01",
            &[
                (1, "SELECT 1"),
                (2, "SELECT * FROM no_such_table"),
                (3, "SELECT 3"),
            ],
        )],
    );

    let optimizer = candidate();
    index::store(
        &DiffIndex::from([("q01".to_owned(), vec![1, 2, 3])]),
        &config.index_file(BENCHMARK, &optimizer),
    )
    .unwrap();

    let result = TestCase::new(BENCHMARK, true).run_timed(&config, &optimizer);

    assert!(matches!(result, Err(RunError::Engine(_))));
    // aborted runs leave no partial result file behind
    assert!(!config.timed_results_dir(BENCHMARK, &optimizer).exists());
}

#[test]
fn failing_variation_is_captured_when_not_raising() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_corpus(
        &config,
        &[(
            "q01",
            &[
                (1, "SELECT 1"),
                (2, "SELECT * FROM no_such_table"),
                (3, "SELECT 3"),
            ],
        )],
    );

    let optimizer = candidate();
    index::store(
        &DiffIndex::from([("q01".to_owned(), vec![1, 2, 3])]),
        &config.index_file(BENCHMARK, &optimizer),
    )
    .unwrap();

    let results = TestCase::new(BENCHMARK, false)
        .run_timed(&config, &optimizer)
        .unwrap();

    let outcomes = &results["q01"];
    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0].status, QueryRunStatus::Success);
    assert_eq!(outcomes[1].status, QueryRunStatus::Failed);
    assert!(!outcomes[1].message.is_empty());
    // the failure did not stop the remaining variations
    assert_eq!(outcomes[2].status, QueryRunStatus::Success);
}

#[test]
fn end_to_end_explain_run_covers_every_optimizer() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    default_corpus(&config);

    let test_case = TestCase::from_name(BENCHMARK);

    pipeline::end_to_end_explain_run(&config, &test_case).unwrap();

    for optimizer in Optimizer::all() {
        assert!(
            config.index_file(BENCHMARK, &optimizer).exists(),
            "missing index for {optimizer}"
        );
        assert!(tracker::is_complete(&config, &optimizer, BENCHMARK).unwrap());

        let results_dir = config.timed_results_dir(BENCHMARK, &optimizer);
        assert_eq!(fs::read_dir(&results_dir).unwrap().count(), 1);
    }
}
