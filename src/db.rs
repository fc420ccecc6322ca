use std::{fmt::Display, path::Path};

use chrono::{DateTime, SecondsFormat, Utc};
use gluesql::prelude::*;
use log::{debug, error};

const INIT_SQL: &str = include_str!("../resources/sql/init.sql");

const COLUMNS: &str = "created_at, platform, author, message, response, visemes";

#[derive(Debug)]
pub enum Error {
    Open(String),
    ExecutionError {
        command: String,
        error: gluesql::prelude::Error,
    },
    TooManyStatements(usize),
    SelectFailure,
    InsertFailure,
    UnexpectedRow(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open(e) => write!(f, "Unable to open database: {e}"),
            Self::ExecutionError { command, error } => {
                write!(f, "Failed to execute: {command}\nOriginal error: {error}")
            }
            Self::TooManyStatements(v) => write!(f, "Found {v} statements, declining to execute"),
            Self::SelectFailure => write!(f, "Select failure"),
            Self::InsertFailure => write!(f, "Insert failure"),
            Self::UnexpectedRow(v) => write!(f, "Unexpected row: {v}"),
        }
    }
}

impl std::error::Error for Error {}

type Result<T> = std::result::Result<T, Error>;

/// One completed response cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseRecord {
    pub created_at: DateTime<Utc>,
    pub platform: String,
    pub author: String,
    pub message: String,
    pub response: String,
    pub visemes: usize,
}

/// Persistent log of everything the streamer has said.
pub struct History {
    db: Glue<SledStorage>,
}

impl std::fmt::Debug for History {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("History").finish_non_exhaustive()
    }
}

impl History {
    /// Open or create the history database stored in the directory at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Opening history at {}", path.display());

        let storage =
            SledStorage::new(&path.to_string_lossy()).map_err(|e| Error::Open(e.to_string()))?;

        let mut history = Self {
            db: Glue::new(storage),
        };
        history.run(INIT_SQL).map_err(|e| {
            error!("Unable to initialize database: {e}");
            e
        })?;

        Ok(history)
    }

    pub fn record(&mut self, record: &ResponseRecord) -> Result<()> {
        let command = format!(
            "INSERT INTO responses ({COLUMNS}) VALUES ({}, {}, {}, {}, {}, {});",
            quote(&record.created_at.to_rfc3339_opts(SecondsFormat::Micros, true)),
            quote(&record.platform),
            quote(&record.author),
            quote(&record.message),
            quote(&record.response),
            record.visemes
        );

        self.insert(command)
    }

    /// The newest `limit` records, newest first.
    pub fn recent(&mut self, limit: usize) -> Result<Vec<ResponseRecord>> {
        let rows = self.select(format!(
            "SELECT {COLUMNS} FROM responses ORDER BY created_at DESC LIMIT {limit};"
        ))?;

        rows.into_iter().map(parse_row).collect()
    }

    /// Execute a sql command and return the raw results.
    fn run(&mut self, command: impl AsRef<str>) -> Result<Vec<Payload>> {
        let command = command.as_ref();
        self.db.execute(command).map_err(|error| {
            error!("Unable to execute:\n{}", command);
            Error::ExecutionError {
                command: command.to_string(),
                error,
            }
        })
    }

    /// Run a select query. The results will be assumed to be from a select statement.
    fn select(&mut self, command: impl AsRef<str>) -> Result<Vec<Vec<Value>>> {
        let mut payloads = self.run(command)?;
        if payloads.len() > 1 {
            error!("Found too many statements, unable to select");
            return Err(Error::TooManyStatements(payloads.len()));
        }

        if let Some(payload) = payloads.pop() {
            let Payload::Select { rows, .. } = payload else {
                error!("Unhandled payload data: {payload:?}");
                return Err(Error::SelectFailure);
            };

            return Ok(rows);
        }

        Ok(vec![])
    }

    /// Run an insert statement. The results will be assumed to be from an insert statement.
    fn insert(&mut self, command: impl AsRef<str>) -> Result<()> {
        let payloads = self.run(command)?;
        if payloads.is_empty() {
            error!("No payloads returned, insertion probably failed");
            return Err(Error::InsertFailure);
        }

        Ok(())
    }
}

/// Single quote a string literal, doubling embedded quotes.
fn quote(v: &str) -> String {
    format!("'{}'", v.replace('\'', "''"))
}

fn parse_row(row: Vec<Value>) -> Result<ResponseRecord> {
    let unexpected = || Error::UnexpectedRow(format!("{row:?}"));

    let text = |idx: usize| match row.get(idx) {
        Some(Value::Str(v)) => Ok(v.clone()),
        _ => Err(unexpected()),
    };

    let created_at = DateTime::parse_from_rfc3339(&text(0)?)
        .map_err(|_| unexpected())?
        .with_timezone(&Utc);
    let visemes = match row.get(5) {
        Some(Value::I64(v)) => usize::try_from(*v).map_err(|_| unexpected())?,
        _ => return Err(unexpected()),
    };

    Ok(ResponseRecord {
        created_at,
        platform: text(1)?,
        author: text(2)?,
        message: text(3)?,
        response: text(4)?,
        visemes,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn record(second: u32, message: &str) -> ResponseRecord {
        ResponseRecord {
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, second).unwrap(),
            platform: "youtube".into(),
            author: "viewer".into(),
            message: message.into(),
            response: format!("re: {message}"),
            visemes: 42,
        }
    }

    #[test]
    fn quoting() {
        assert_eq!(quote("plain"), "'plain'");
        assert_eq!(quote("it's"), "'it''s'");
    }

    #[test]
    fn record_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = History::open(dir.path().join("db")).unwrap();

        history.record(&record(1, "first")).unwrap();
        history.record(&record(3, "it's third")).unwrap();
        history.record(&record(2, "second")).unwrap();

        let recent = history.recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0], record(3, "it's third"));
        assert_eq!(recent[1].message, "second");

        assert_eq!(history.recent(10).unwrap().len(), 3);
    }

    #[test]
    fn reopen_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");

        {
            let mut history = History::open(&path).unwrap();
            history.record(&record(1, "hello")).unwrap();
        }

        let mut history = History::open(&path).unwrap();
        assert_eq!(history.recent(5).unwrap(), vec![record(1, "hello")]);
    }

    #[test]
    fn bad_rows_are_rejected() {
        assert!(matches!(
            parse_row(vec![Value::Str("yesterday".into())]),
            Err(Error::UnexpectedRow(_))
        ));
    }
}
