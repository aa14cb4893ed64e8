mod error;
mod lru;
mod page;
mod pager;

pub use error::PagerError;
pub use lru::{Lru, LruStats};
pub use page::{SlottedPage, LOW_WATER_MARK, PAGE_SIZE};
pub use pager::{PageBuf, Pager};
