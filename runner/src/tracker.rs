use crate::{
    config::HarnessConfig,
    corpus::{Corpus, CorpusError},
    optimizer::Optimizer,
};
use std::{collections::BTreeSet, fs, io};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error(transparent)]
    Corpus(#[from] CorpusError),
    #[error("Failed to inspect plans directory")]
    Io(#[from] io::Error),
}

/// Whether (optimizer, benchmark) already has a full set of captured plans.
///
/// True iff the plans directory exists and its plan subdirectories match the
/// corpus query ids exactly. Extra and missing query ids both count as
/// incomplete; per-variation plan files are still skip-if-exists at
/// execution time.
pub fn is_complete(
    config: &HarnessConfig,
    optimizer: &Optimizer,
    benchmark: &str,
) -> Result<bool, TrackerError> {
    let plans_dir = config.plans_dir(benchmark, optimizer);

    if !plans_dir.is_dir() {
        debug!(
            "No plans directory for [{benchmark}][{optimizer}], explain pass required"
        );
        return Ok(false);
    }

    let expected: BTreeSet<String> = Corpus::new(&config.query_root)
        .query_ids(benchmark)?
        .into_iter()
        .collect();

    let mut present = BTreeSet::new();
    for entry in fs::read_dir(&plans_dir)? {
        let entry = entry?;

        if entry.file_type()?.is_dir() {
            present.insert(entry.file_name().to_string_lossy().into_owned());
        }
    }

    Ok(expected == present)
}
