use crate::optimizer::Optimizer;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs::File,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Failed to read config file")]
    Io(#[from] std::io::Error),
    #[error("Config file is not valid YAML")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config failed preflight checks")]
    Preflight,
}

/// Top-level harness configuration.
///
/// The three roots are path contracts shared with downstream tooling:
///   {query_root}/{benchmark}/queries/{query_id}/{variation_id}.sql
///   {results_root}/{benchmark}/{optimizer}/plans/{query_id}/{variation_id}.json
///   {results_root}/{benchmark}/{optimizer}/timed_results/{timestamp}.json
///   {index_root}/{benchmark}/{optimizer}.json
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    #[serde(default = "default_query_root")]
    pub query_root: PathBuf,
    #[serde(default = "default_results_root")]
    pub results_root: PathBuf,
    #[serde(default = "default_index_root")]
    pub index_root: PathBuf,

    // tuning constant forwarded to the engine's optimizer
    #[serde(default = "default_bridge_cost")]
    pub bridge_cost: u64,

    // connection the benchmark queries run against
    #[serde(alias = "db", default)]
    pub connection: ConnectionConfig,

    // results store the aggregator publishes to
    #[serde(default = "default_store")]
    pub store: ConnectionConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    // in-memory when absent
    #[serde(default)]
    pub path: Option<PathBuf>,

    // free-form engine options, applied via SET after the connection opens
    #[serde(default)]
    pub settings: BTreeMap<String, String>,

    // auxiliary databases attached under an alias for the whole session
    #[serde(default)]
    pub attach: Vec<AttachConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct AttachConfig {
    pub path: String,
    pub alias: String,
}

impl HarnessConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let file = File::open(path)?;
        let config: HarnessConfig = serde_yaml::from_reader(file)?;

        if config.preflight_checks() {
            return Err(ConfigErrors::Preflight);
        }

        Ok(config)
    }

    /// attempt to catch all config problems at once instead of piece-by-piece
    pub fn preflight_checks(&self) -> bool {
        let mut contains_error = false;

        if !self.query_root.is_dir() {
            error!(
                "query_root {} is not a directory, no corpus to run",
                self.query_root.display()
            );
            contains_error = true;
        }

        let mut aliases = BTreeSet::new();
        for attach in self.connection.attach.iter() {
            if attach.alias.is_empty() {
                error!(
                    "connection.attach entry for {} has an empty alias",
                    attach.path
                );
                contains_error = true;
            }

            if !aliases.insert(attach.alias.as_str()) {
                error!("connection.attach alias {} is defined twice", attach.alias);
                contains_error = true;
            }
        }

        if self.bridge_cost == 0 {
            warn!("bridge_cost is 0, the engine will treat bridge arcs as free");
        }

        contains_error
    }

    pub fn plans_dir(&self, benchmark: &str, optimizer: &Optimizer) -> PathBuf {
        self.results_root
            .join(benchmark)
            .join(optimizer.name())
            .join("plans")
    }

    pub fn plan_file(
        &self,
        benchmark: &str,
        optimizer: &Optimizer,
        query_id: &str,
        variation_id: u32,
    ) -> PathBuf {
        self.plans_dir(benchmark, optimizer)
            .join(query_id)
            .join(format!("{variation_id}.json"))
    }

    pub fn timed_results_dir(&self, benchmark: &str, optimizer: &Optimizer) -> PathBuf {
        self.results_root
            .join(benchmark)
            .join(optimizer.name())
            .join("timed_results")
    }

    pub fn index_dir(&self, benchmark: &str) -> PathBuf {
        self.index_root.join(benchmark)
    }

    pub fn index_file(&self, benchmark: &str, optimizer: &Optimizer) -> PathBuf {
        self.index_dir(benchmark)
            .join(format!("{}.json", optimizer.name()))
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            query_root: default_query_root(),
            results_root: default_results_root(),
            index_root: default_index_root(),
            bridge_cost: default_bridge_cost(),
            connection: ConnectionConfig::default(),
            store: default_store(),
        }
    }
}

fn default_query_root() -> PathBuf {
    PathBuf::from_str("data").unwrap()
}

fn default_results_root() -> PathBuf {
    PathBuf::from_str("results").unwrap()
}

fn default_index_root() -> PathBuf {
    PathBuf::from_str("index").unwrap()
}

fn default_bridge_cost() -> u64 {
    10_000
}

fn default_store() -> ConnectionConfig {
    ConnectionConfig {
        path: Some(PathBuf::from_str("optbench-results.db").unwrap()),
        settings: BTreeMap::new(),
        attach: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::EstimationFunction;

    #[test]
    fn defaults_fill_in() {
        let config: HarnessConfig = serde_yaml::from_str("{}").unwrap();

        assert_eq!(config.query_root, PathBuf::from("data"));
        assert_eq!(config.bridge_cost, 10_000);
        assert!(config.connection.path.is_none());
        assert!(config.connection.attach.is_empty());
        assert_eq!(
            config.store.path,
            Some(PathBuf::from("optbench-results.db"))
        );
    }

    #[test]
    fn db_alias_and_attach_parse() {
        let config: HarnessConfig = serde_yaml::from_str(
            "query_root: /corpus\n\
             db:\n  \
               path: bench.db\n  \
               settings:\n    \
                 threads: '1'\n  \
               attach:\n    \
                 - path: ~/local_v112.db\n      \
                   alias: local\n",
        )
        .unwrap();

        assert_eq!(config.connection.path, Some(PathBuf::from("bench.db")));
        assert_eq!(config.connection.settings.get("threads").unwrap(), "1");
        assert_eq!(config.connection.attach[0].alias, "local");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_yaml::from_str::<HarnessConfig>("surprise: true").is_err());
    }

    #[test]
    fn duplicate_attach_alias_fails_preflight() {
        let mut config = HarnessConfig::default();
        config.query_root = std::env::temp_dir();
        config.connection.attach = vec![
            AttachConfig {
                path: "a.db".to_owned(),
                alias: "local".to_owned(),
            },
            AttachConfig {
                path: "b.db".to_owned(),
                alias: "local".to_owned(),
            },
        ];

        assert!(config.preflight_checks());
    }

    #[test]
    fn path_contracts_match_layout() {
        let config = HarnessConfig::default();
        let optimizer = Optimizer::CostBased(EstimationFunction::Cardinality);

        assert_eq!(
            config.plan_file("tpch", &optimizer, "q07", 1),
            PathBuf::from("results/tpch/CARDINALITY/plans/q07/1.json")
        );
        assert_eq!(
            config.timed_results_dir("tpch", &optimizer),
            PathBuf::from("results/tpch/CARDINALITY/timed_results")
        );
        assert_eq!(
            config.index_file("tpch", &Optimizer::Heuristic),
            PathBuf::from("index/tpch/HEURISTIC.json")
        );
    }
}
