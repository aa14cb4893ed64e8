use std::fmt;

use laura_engine::EngineError;
use laura_pager::PagerError;
use laura_query::QueryError;

/// The top-level public error type. Composes upward from the
/// lower crates' error enums via `From`.
#[derive(Debug)]
pub enum DbError {
    NotFound(String),
    Duplicate(String),
    InvalidName(String),
    InvalidArgument(String),
    NoTextIndex,
    PageFull,
    IoError(String),
    Serialization(String),
    Shutdown(String),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::NotFound(what) => write!(f, "not found: {what}"),
            DbError::Duplicate(key) => write!(f, "duplicate: {key}"),
            DbError::InvalidName(name) => write!(f, "invalid name: {name}"),
            DbError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            DbError::NoTextIndex => write!(f, "no text index on any of the requested fields"),
            DbError::PageFull => write!(f, "page full"),
            DbError::IoError(msg) => write!(f, "io error: {msg}"),
            DbError::Serialization(msg) => write!(f, "serialization error: {msg}"),
            DbError::Shutdown(msg) => write!(f, "shutdown: {msg}"),
        }
    }
}

impl std::error::Error for DbError {}

impl From<EngineError> for DbError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Pager(pe) => DbError::from(pe),
            EngineError::NotFound(what) => DbError::NotFound(what),
            EngineError::Duplicate(key) => DbError::Duplicate(key),
            EngineError::InvalidName(name) => DbError::InvalidName(name),
            EngineError::InvalidArgument(msg) => DbError::InvalidArgument(msg),
            EngineError::PageFull => DbError::PageFull,
            EngineError::Serialization(msg) => DbError::Serialization(msg),
        }
    }
}

impl From<PagerError> for DbError {
    fn from(e: PagerError) -> Self {
        match e {
            PagerError::PageFull => DbError::PageFull,
            other => DbError::IoError(other.to_string()),
        }
    }
}

impl From<QueryError> for DbError {
    fn from(e: QueryError) -> Self {
        DbError::InvalidArgument(e.to_string())
    }
}
