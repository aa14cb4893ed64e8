use std::fmt;
use std::io;

#[derive(Debug)]
pub enum PagerError {
    Io(io::Error),
    PageFull,
    InvalidSlot(u32),
    CorruptPage(String),
}

impl fmt::Display for PagerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PagerError::Io(e) => write!(f, "page io error: {e}"),
            PagerError::PageFull => write!(f, "page has insufficient contiguous free space"),
            PagerError::InvalidSlot(id) => write!(f, "invalid slot id: {id}"),
            PagerError::CorruptPage(msg) => write!(f, "corrupt page: {msg}"),
        }
    }
}

impl std::error::Error for PagerError {}

impl From<io::Error> for PagerError {
    fn from(e: io::Error) -> Self {
        PagerError::Io(e)
    }
}
