//! Persistent storage for document collections.
//!
//! Architecture:
//! ```text
//! ┌─────────────────┐   field maps   ┌──────────────────┐
//! │ LocalCollection │ ─────────────► │  DocumentStore   │
//! │ DocumentServer  │                │  (RocksDB)       │
//! └─────────────────┘                └────────┬─────────┘
//!                                             │ column families
//!                          ┌──────────────────┴─────────────────┐
//!                          │ CF "documents" — LZ4 JSON fields   │
//!                          │ CF "metadata"  — bincode metadata  │
//!                          └────────────────────────────────────┘
//! ```
//!
//! Keys are `<collection>\0<id>`, so one prefix scan lists a collection.

pub mod rocks;

pub use rocks::{DocumentMetadata, DocumentStore, StoreConfig, StoreError};
