use itertools::Itertools;
use std::{cmp::Ordering, fs, io, path::PathBuf};
use thiserror::Error;

/// suffix query variation files carry inside the corpus
pub const QUERY_FILE_SUFFIX: &str = "sql";

#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("No query text at {}", .path.display())]
    NotFound { path: PathBuf },
    #[error("{} is not a valid query directory", .path.display())]
    NotADirectory { path: PathBuf },
    #[error("{} does not have a numeric variation id", .path.display())]
    InvalidVariationId { path: PathBuf },
    #[error("Failed to read query corpus")]
    Io(#[from] io::Error),
}

/// Read-only accessor over the externally authored query corpus.
///
/// Layout contract: {query_root}/{benchmark}/queries/{query_id}/{variation_id}.sql
#[derive(Debug, Clone)]
pub struct Corpus {
    query_root: PathBuf,
}

impl Corpus {
    pub fn new(query_root: impl Into<PathBuf>) -> Self {
        Self {
            query_root: query_root.into(),
        }
    }

    pub fn queries_dir(&self, benchmark: &str) -> PathBuf {
        self.query_root.join(benchmark).join("queries")
    }

    fn variation_path(&self, benchmark: &str, query_id: &str, variation_id: u32) -> PathBuf {
        self.queries_dir(benchmark)
            .join(query_id)
            .join(format!("{variation_id}.{QUERY_FILE_SUFFIX}"))
    }

    /// Query text for one variation, optionally wrapped so the engine
    /// produces a JSON plan instead of executing the statement.
    pub fn query_text(
        &self,
        benchmark: &str,
        query_id: &str,
        variation_id: u32,
        explain: bool,
    ) -> Result<String, CorpusError> {
        let path = self.variation_path(benchmark, query_id, variation_id);
        let text = fs::read_to_string(&path).map_err(|error| match error.kind() {
            io::ErrorKind::NotFound => CorpusError::NotFound { path },
            _ => CorpusError::Io(error),
        })?;

        Ok(if explain {
            format!("EXPLAIN (FORMAT json) {text}")
        } else {
            text
        })
    }

    /// Query ids of a benchmark in natural order ("q2" before "q10").
    pub fn query_ids(&self, benchmark: &str) -> Result<Vec<String>, CorpusError> {
        let dir = self.queries_dir(benchmark);
        let entries = fs::read_dir(&dir).map_err(|error| match error.kind() {
            io::ErrorKind::NotFound => CorpusError::NotFound { path: dir },
            _ => CorpusError::Io(error),
        })?;

        let mut query_ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                query_ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        Ok(query_ids
            .into_iter()
            .sorted_by(|a, b| natural_cmp(a, b))
            .collect())
    }

    /// Variation ids of one query, ascending by numeric id.
    pub fn variation_ids(&self, benchmark: &str, query_id: &str) -> Result<Vec<u32>, CorpusError> {
        let dir = self.queries_dir(benchmark).join(query_id);

        if !dir.is_dir() {
            return Err(CorpusError::NotADirectory { path: dir });
        }

        let mut variation_ids = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();

            if path
                .extension()
                .map_or(false, |extension| extension == QUERY_FILE_SUFFIX)
            {
                let variation_id = path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .and_then(|stem| stem.parse().ok())
                    .ok_or(CorpusError::InvalidVariationId { path })?;

                variation_ids.push(variation_id);
            }
        }

        variation_ids.sort_unstable();

        Ok(variation_ids)
    }
}

/// Natural-order comparison: runs of digits compare by value, everything
/// else byte-wise. "q2" < "q10", "1a" < "10a".
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.as_bytes();
    let mut right = b.as_bytes();

    loop {
        match (left.first(), right.first()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                if l.is_ascii_digit() && r.is_ascii_digit() {
                    let (l_num, l_rest) = take_number(left);
                    let (r_num, r_rest) = take_number(right);

                    match l_num.cmp(&r_num) {
                        Ordering::Equal => {
                            left = l_rest;
                            right = r_rest;
                        }
                        unequal => return unequal,
                    }
                } else {
                    match l.cmp(r) {
                        Ordering::Equal => {
                            left = &left[1..];
                            right = &right[1..];
                        }
                        unequal => return unequal,
                    }
                }
            }
        }
    }
}

fn take_number(bytes: &[u8]) -> (u64, &[u8]) {
    let end = bytes
        .iter()
        .position(|byte| !byte.is_ascii_digit())
        .unwrap_or(bytes.len());

    let number = bytes[..end]
        .iter()
        .fold(0u64, |acc, byte| acc * 10 + u64::from(byte - b'0'));

    (number, &bytes[end..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, Corpus) {
        let dir = TempDir::new().unwrap();

        for (query_id, variations) in [
            ("q1", vec![1, 2, 10]),
            ("q2", vec![1]),
            ("q10", vec![3, 1]),
        ] {
            let query_dir = dir.path().join("tpch/queries").join(query_id);
            fs::create_dir_all(&query_dir).unwrap();

            for variation_id in variations {
                fs::write(
                    query_dir.join(format!("{variation_id}.sql")),
                    format!("SELECT {variation_id}"),
                )
                .unwrap();
            }
        }

        let corpus = Corpus::new(dir.path());
        (dir, corpus)
    }

    #[test]
    fn query_ids_are_natural_sorted() {
        let (_dir, corpus) = fixture();

        assert_eq!(corpus.query_ids("tpch").unwrap(), vec!["q1", "q2", "q10"]);
    }

    #[test]
    fn variation_ids_are_numeric_sorted() {
        let (_dir, corpus) = fixture();

        assert_eq!(corpus.variation_ids("tpch", "q1").unwrap(), vec![1, 2, 10]);
        assert_eq!(corpus.variation_ids("tpch", "q10").unwrap(), vec![1, 3]);
    }

    #[test]
    fn variations_of_missing_query_fail() {
        let (_dir, corpus) = fixture();

        assert!(matches!(
            corpus.variation_ids("tpch", "q99"),
            Err(CorpusError::NotADirectory { .. })
        ));
    }

    #[test]
    fn query_text_wraps_explain() {
        let (_dir, corpus) = fixture();

        assert_eq!(
            corpus.query_text("tpch", "q2", 1, false).unwrap(),
            "SELECT 1"
        );
        assert_eq!(
            corpus.query_text("tpch", "q2", 1, true).unwrap(),
            "EXPLAIN (FORMAT json) SELECT 1"
        );
    }

    #[test]
    fn missing_variation_is_not_found() {
        let (_dir, corpus) = fixture();

        assert!(matches!(
            corpus.query_text("tpch", "q2", 7, false),
            Err(CorpusError::NotFound { .. })
        ));
        assert!(matches!(
            corpus.query_ids("job"),
            Err(CorpusError::NotFound { .. })
        ));
    }

    #[test]
    fn natural_cmp_handles_job_style_ids() {
        let mut ids = vec!["10a", "1a", "2b", "1b"];
        ids.sort_by(|a, b| natural_cmp(a, b));

        assert_eq!(ids, vec!["1a", "1b", "2b", "10a"]);
        assert_eq!(natural_cmp("q07", "q07"), Ordering::Equal);
        assert_eq!(natural_cmp("q7", "q07"), Ordering::Equal);
    }
}
