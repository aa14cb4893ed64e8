use std::fmt;

#[derive(Debug)]
pub enum QueryError {
    InvalidFilter(String),
    InvalidUpdate(String),
    InvalidRegex(String),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::InvalidFilter(msg) => write!(f, "invalid filter: {msg}"),
            QueryError::InvalidUpdate(msg) => write!(f, "invalid update: {msg}"),
            QueryError::InvalidRegex(msg) => write!(f, "invalid regex: {msg}"),
        }
    }
}

impl std::error::Error for QueryError {}
