use serde::{Deserialize, Serialize};
use std::{env, fmt, str::FromStr};
use thiserror::Error;

/// Cost-estimation functions the engine's cost-based join-order optimizer
/// can be steered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EstimationFunction {
    Cardinality,
    TableSize,
    DataSize,
    DataSizeSimplified,
}

impl EstimationFunction {
    pub const ALL: [EstimationFunction; 4] = [
        EstimationFunction::Cardinality,
        EstimationFunction::TableSize,
        EstimationFunction::DataSize,
        EstimationFunction::DataSizeSimplified,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Cardinality => "CARDINALITY",
            Self::TableSize => "TABLE_SIZE",
            Self::DataSize => "DATA_SIZE",
            Self::DataSizeSimplified => "DATA_SIZE_SIMPLIFIED",
        }
    }
}

/// Optimizer configuration under which the engine plans queries.
///
/// The cost-based mode cannot exist without its estimation function, so the
/// function rides along as the variant payload instead of being an optional
/// field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Optimizer {
    Heuristic,
    CostBased(EstimationFunction),
}

#[derive(Error, Debug, Clone)]
#[error("unknown optimizer {0:?}, expected HEURISTIC, CARDINALITY, TABLE_SIZE, DATA_SIZE or DATA_SIZE_SIMPLIFIED")]
pub struct UnknownOptimizer(String);

impl Optimizer {
    /// the reference configuration every cost-based configuration is diffed against
    pub fn baseline() -> Self {
        Self::Heuristic
    }

    /// all standard configurations in pipeline order, baseline first
    pub fn all() -> [Optimizer; 5] {
        [
            Optimizer::Heuristic,
            Optimizer::CostBased(EstimationFunction::Cardinality),
            Optimizer::CostBased(EstimationFunction::TableSize),
            Optimizer::CostBased(EstimationFunction::DataSize),
            Optimizer::CostBased(EstimationFunction::DataSizeSimplified),
        ]
    }

    /// Canonical name, used as a path component for plans, indices and
    /// timed results. Injective over (mode, estimation function).
    pub fn name(&self) -> &'static str {
        match self {
            Self::Heuristic => "HEURISTIC",
            Self::CostBased(estimation) => estimation.name(),
        }
    }

    /// mode discriminator as the engine spells it
    pub fn mode_name(&self) -> &'static str {
        match self {
            Self::Heuristic => "HEURISTIC",
            Self::CostBased(_) => "DP",
        }
    }

    pub fn estimation(&self) -> Option<EstimationFunction> {
        match self {
            Self::Heuristic => None,
            Self::CostBased(estimation) => Some(*estimation),
        }
    }
}

impl fmt::Display for Optimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Optimizer {
    type Err = UnknownOptimizer;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Optimizer::all()
            .into_iter()
            .find(|optimizer| optimizer.name() == s.to_uppercase())
            .ok_or_else(|| UnknownOptimizer(s.to_owned()))
    }
}

/// Engine-side optimizer selection.
///
/// The engine's own optimizer implementation reads these as process
/// environment variables. They are materialized right before a connection
/// opens and never read back afterwards, so the settings travel as an
/// explicit value into `EngineSession::open` instead of being poked into the
/// environment at call sites.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub optimizer: Optimizer,
    pub bridge_cost: u64,
}

impl EngineSettings {
    pub fn new(optimizer: Optimizer, bridge_cost: u64) -> Self {
        Self {
            optimizer,
            bridge_cost,
        }
    }

    /// environment variables the engine expects
    pub fn vars(&self) -> Vec<(&'static str, String)> {
        let mut vars = vec![("OPTIMIZER", self.optimizer.mode_name().to_owned())];

        if let Some(estimation) = self.optimizer.estimation() {
            vars.push(("ESTIMATION", estimation.name().to_owned()));
        }

        vars.push(("BRIDGE_COST", self.bridge_cost.to_string()));

        vars
    }

    pub(crate) fn apply(&self) {
        for (key, value) in self.vars() {
            env::set_var(key, value);
        }
    }
}
