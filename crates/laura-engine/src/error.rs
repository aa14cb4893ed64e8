use std::fmt;

use laura_pager::PagerError;

#[derive(Debug)]
pub enum EngineError {
    Pager(PagerError),
    NotFound(String),
    Duplicate(String),
    InvalidName(String),
    InvalidArgument(String),
    PageFull,
    Serialization(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Pager(e) => write!(f, "page io error: {e}"),
            EngineError::NotFound(what) => write!(f, "not found: {what}"),
            EngineError::Duplicate(key) => write!(f, "duplicate key: {key}"),
            EngineError::InvalidName(name) => write!(f, "invalid name: {name}"),
            EngineError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            EngineError::PageFull => write!(f, "page full"),
            EngineError::Serialization(msg) => write!(f, "serialization error: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<PagerError> for EngineError {
    fn from(e: PagerError) -> Self {
        match e {
            PagerError::PageFull => EngineError::PageFull,
            other => EngineError::Pager(other),
        }
    }
}

impl From<bson::ser::Error> for EngineError {
    fn from(e: bson::ser::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}

impl From<bson::de::Error> for EngineError {
    fn from(e: bson::de::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}
