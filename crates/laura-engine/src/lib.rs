//! Catalog, metadata codec, document store, and index set — the on-disk
//! and in-memory primitives the collection façade (`laura-db`) builds on.

pub mod catalog;
pub mod codec;
pub mod error;
pub mod index;
pub mod store;
pub mod value;

pub use catalog::{Catalog, CatalogEntry};
pub use codec::{
    CollectionMetadata, CollectionOptions, IndexKind, IndexMetadata, IndexStatistics,
};
pub use error::EngineError;
pub use index::{IndexHandle, OrderedIndex, PartialIndex, Predicate, TextIndex, TtlIndex, UniqueIndex};
pub use store::{DocumentStore, StoreStats};
pub use value::{compare_values, extract, values_equal, IndexKey};
