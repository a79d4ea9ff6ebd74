//! Storage layer: collaborator traits and the key-mapping rules.
//!
//! - `document_store`: partition/sort-keyed item store with conditional and
//!   transactional writes (SQLite implementation bundled)
//! - `object_store`: byte storage with streamed reads, server-side copy, and
//!   presigned targets (filesystem implementation bundled)
//! - `keys`: the one place that derives store keys from domain records

pub mod document_store;
pub mod keys;
pub mod object_store;

pub use document_store::{
    DocumentStore, Item, PutCondition, QueryOptions, QueryOrder, SqliteDocumentStore, StoreError,
    TransactPut,
};
pub use object_store::{LocalObjectStore, ObjectMeta, ObjectStore, PresignedUrl};
