use std::{fmt::Display, path::PathBuf};

use crate::db;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Config {
        path: Option<PathBuf>,
        reason: String,
    },
    /// Audio bytes that could not be decoded into a waveform.
    Waveform(String),
    DimensionMismatch {
        expected: usize,
        actual: usize,
    },
    /// A call to the language model or speech synthesis service failed.
    Service {
        service: &'static str,
        reason: String,
    },
    Timeout {
        service: &'static str,
        seconds: f64,
    },
    Database(db::Error),
    Json(serde_json::Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {e}"),
            Self::Config { path, reason } => match path {
                Some(path) => write!(f, "Invalid config {}: {reason}", path.display()),
                None => write!(f, "Invalid config: {reason}"),
            },
            Self::Waveform(reason) => write!(f, "Unable to read waveform: {reason}"),
            Self::DimensionMismatch { expected, actual } => {
                write!(f, "Expected a vector of {expected} values, found {actual}")
            }
            Self::Service { service, reason } => write!(f, "{service} request failed: {reason}"),
            Self::Timeout { service, seconds } => {
                write!(f, "{service} did not respond within {seconds}s")
            }
            Self::Database(e) => write!(f, "Database error: {e}"),
            Self::Json(e) => write!(f, "JSON error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Database(e) => Some(e),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<db::Error> for Error {
    fn from(value: db::Error) -> Self {
        Self::Database(value)
    }
}

impl From<hound::Error> for Error {
    fn from(value: hound::Error) -> Self {
        Self::Waveform(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
