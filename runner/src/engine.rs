use crate::{config::ConnectionConfig, optimizer::EngineSettings};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Instant};
use thiserror::Error;
use tracing::{debug, warn};
use tracing_unwrap::OptionExt;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to open engine connection")]
    Connect(#[source] duckdb::Error),
    #[error("Failed to attach {alias}")]
    Attach {
        alias: String,
        #[source]
        source: duckdb::Error,
    },
    #[error("Engine rejected query")]
    Query(#[source] duckdb::Error),
    #[error("Failed to close engine connection")]
    Close(#[source] duckdb::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryRunStatus {
    Failed,
    Success,
}

impl fmt::Display for QueryRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Failed => "FAILED",
            Self::Success => "SUCCESS",
        })
    }
}

/// outcome of one timed statement, fetch included in the measured window
#[derive(Debug, Clone)]
pub struct TimedOutcome {
    pub duration: f64,
    pub status: QueryRunStatus,
    pub message: String,
}

/// One engine connection with scoped acquisition.
///
/// Opening applies the optimizer settings, the configured engine options and
/// every configured ATTACH. Dropping the session detaches all aliases again
/// and releases the connection on every exit path; `close` does the same but
/// surfaces close errors.
#[derive(Debug)]
pub struct EngineSession {
    connection: Option<duckdb::Connection>,
    attached: Vec<String>,
}

impl EngineSession {
    pub fn open(
        config: &ConnectionConfig,
        settings: &EngineSettings,
    ) -> Result<Self, EngineError> {
        // the engine-side optimizer reads its selection from the process
        // environment, materialized right before the connection opens
        settings.apply();

        let connection = match &config.path {
            Some(path) => duckdb::Connection::open(path),
            None => duckdb::Connection::open_in_memory(),
        }
        .map_err(EngineError::Connect)?;

        for (key, value) in config.settings.iter() {
            connection
                .execute(&format!("SET {key} = '{value}'"), [])
                .map_err(EngineError::Connect)?;
        }

        let mut session = Self {
            connection: Some(connection),
            attached: Vec::new(),
        };

        for attach in config.attach.iter() {
            session.attach(&attach.path, &attach.alias)?;
        }

        debug!(
            "Opened engine connection under optimizer [{}]",
            settings.optimizer
        );

        Ok(session)
    }

    // invariant: Some until close() or drop
    fn connection(&self) -> &duckdb::Connection {
        self.connection.as_ref().unwrap_or_log()
    }

    /// raw handle, for callers issuing their own statements (results store)
    pub fn raw(&self) -> &duckdb::Connection {
        self.connection()
    }

    pub fn attach(&mut self, path: &str, alias: &str) -> Result<(), EngineError> {
        let path = path.trim();

        self.connection()
            .execute(&format!("ATTACH '{path}' AS {alias}"), [])
            .map_err(|source| EngineError::Attach {
                alias: alias.to_owned(),
                source,
            })?;

        debug!("Attached {path} as {alias}");
        self.attached.push(alias.to_owned());

        Ok(())
    }

    /// Run a statement and fetch every row, measuring wall-clock time around
    /// both. A failing query propagates when `raise_on_error` is set and is
    /// otherwise captured as a FAILED outcome. No retries.
    pub fn execute(&self, sql: &str, raise_on_error: bool) -> Result<TimedOutcome, EngineError> {
        let start = Instant::now();
        let outcome = self.run_to_completion(sql);
        let duration = start.elapsed().as_secs_f64();

        match outcome {
            Ok(_rows) => Ok(TimedOutcome {
                duration,
                status: QueryRunStatus::Success,
                message: String::new(),
            }),
            Err(error) if raise_on_error => Err(EngineError::Query(error)),
            Err(error) => Ok(TimedOutcome {
                duration,
                status: QueryRunStatus::Failed,
                message: error.to_string(),
            }),
        }
    }

    fn run_to_completion(&self, sql: &str) -> Result<usize, duckdb::Error> {
        let mut statement = self.connection().prepare(sql)?;
        let mut rows = statement.query([])?;
        let mut fetched = 0;

        while rows.next()?.is_some() {
            fetched += 1;
        }

        Ok(fetched)
    }

    /// Run an explain-wrapped statement and return the plan payload (second
    /// column of the first result row). Failure policy mirrors `execute`; a
    /// non-raising failure yields no plan.
    pub fn explain(&self, sql: &str, raise_on_error: bool) -> Result<Option<String>, EngineError> {
        match self
            .connection()
            .query_row(sql, [], |row| row.get::<_, String>(1))
        {
            Ok(plan) => Ok(Some(plan)),
            Err(error) if raise_on_error => Err(EngineError::Query(error)),
            Err(error) => {
                warn!("Explain failed, no plan captured: {error}");
                Ok(None)
            }
        }
    }

    fn detach_all(&mut self) {
        let Some(connection) = self.connection.as_ref() else {
            return;
        };

        for alias in std::mem::take(&mut self.attached) {
            if let Err(error) = connection.execute(&format!("DETACH {alias}"), []) {
                warn!("Failed to detach {alias}: {error}");
            }
        }
    }

    pub fn close(mut self) -> Result<(), EngineError> {
        self.detach_all();

        if let Some(connection) = self.connection.take() {
            connection
                .close()
                .map_err(|(_connection, error)| EngineError::Close(error))?;
            debug!("Closed engine connection");
        }

        Ok(())
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        // the handle itself closes when dropped
        self.detach_all();
    }
}
