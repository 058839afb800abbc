use crate::optimizer::Optimizer;
use itertools::Itertools;
use std::{
    collections::{BTreeMap, BTreeSet},
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::info;

/// query id -> variation ids whose plan differs from the baseline's
pub type DiffIndex = BTreeMap<String, Vec<u32>>;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("No differentiating index at {}, run the differentiation workflow first", .path.display())]
    MissingIndex { path: PathBuf },
    #[error("Index has no entry for query {query_id}")]
    MissingQuery { query_id: String },
    #[error("Plan missing at {}, candidate and baseline plan sets are inconsistent", .path.display())]
    MissingPlan { path: PathBuf },
    #[error("Plan file {} does not have a numeric variation id", .path.display())]
    InvalidVariationId { path: PathBuf },
    #[error("Failed to read plan or index file")]
    Io(#[from] io::Error),
    #[error("Index file is not valid JSON")]
    Json(#[from] serde_json::Error),
}

/// Diff a candidate optimizer's captured plans against the baseline's.
///
/// Every query id ends up in the result, with an empty list when no
/// variation differs. Plans compare as raw text: any byte difference counts,
/// structural comparison is deliberately out. A variation present on one
/// side but not the other is a fatal precondition violation.
pub fn diff_plans(
    query_ids: &[String],
    candidate_dir: &Path,
    baseline_dir: &Path,
    candidate: &Optimizer,
    baseline: &Optimizer,
) -> Result<DiffIndex, IndexError> {
    let mut index = DiffIndex::new();

    for query_id in query_ids {
        let mut differing = Vec::new();

        let mut variation_files = Vec::new();
        for entry in fs::read_dir(candidate_dir.join(query_id))? {
            let path = entry?.path();

            if path.extension().map_or(false, |extension| extension == "json") {
                let variation_id: u32 = path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .and_then(|stem| stem.parse().ok())
                    .ok_or_else(|| IndexError::InvalidVariationId { path: path.clone() })?;

                variation_files.push((variation_id, path));
            }
        }
        variation_files.sort_unstable_by_key(|(variation_id, _)| *variation_id);

        for (variation_id, path) in variation_files {
            let plan = fs::read_to_string(&path)?;

            let baseline_path = baseline_dir.join(query_id).join(format!("{variation_id}.json"));
            let baseline_plan =
                fs::read_to_string(&baseline_path).map_err(|error| match error.kind() {
                    io::ErrorKind::NotFound => IndexError::MissingPlan {
                        path: baseline_path.clone(),
                    },
                    _ => IndexError::Io(error),
                })?;

            if plan != baseline_plan {
                info!("[{query_id}][{variation_id}] is different for {candidate} and {baseline}");
                differing.push(variation_id);
            }
        }

        index.insert(query_id.clone(), differing);
    }

    Ok(index)
}

/// Set union of differentiating variations across indices, per query id.
/// Variation ids come out sorted ascending, making the serialized union
/// deterministic.
pub fn union<I: IntoIterator<Item = DiffIndex>>(indices: I) -> DiffIndex {
    let mut union: BTreeMap<String, BTreeSet<u32>> = BTreeMap::new();

    for index in indices {
        for (query_id, variations) in index {
            union.entry(query_id).or_default().extend(variations);
        }
    }

    union
        .into_iter()
        .map(|(query_id, variations)| (query_id, variations.into_iter().collect_vec()))
        .collect()
}

/// Overwrites any prior index file; writes are not atomic.
pub fn store(index: &DiffIndex, path: &Path) -> Result<(), IndexError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(path, serde_json::to_string_pretty(index)?)?;

    Ok(())
}

pub fn load(path: &Path) -> Result<DiffIndex, IndexError> {
    let text = fs::read_to_string(path).map_err(|error| match error.kind() {
        io::ErrorKind::NotFound => IndexError::MissingIndex {
            path: path.to_owned(),
        },
        _ => IndexError::Io(error),
    })?;

    Ok(serde_json::from_str(&text)?)
}
