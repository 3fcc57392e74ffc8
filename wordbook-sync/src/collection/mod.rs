//! Remote document collections.
//!
//! [`RemoteCollection`] is the contract the word store needs from the
//! document database. Three backends implement it:
//!
//! - [`memory::MemoryCollection`] — in-process map, used by tests and by a
//!   server started without storage
//! - [`local::LocalCollection`] — one collection of a RocksDB [`DocumentStore`]
//! - [`remote::WsCollection`] — a collection served by a [`DocumentServer`]
//!   over WebSocket
//!
//! [`DocumentStore`]: crate::storage::DocumentStore
//! [`DocumentServer`]: crate::server::DocumentServer

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;
use crate::record::Fields;

pub mod local;
pub mod memory;
pub mod remote;

/// A stored document: id plus field data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

/// A named group of documents in a document database.
#[async_trait]
pub trait RemoteCollection: Send + Sync {
    /// Every document in the collection.
    async fn list(&self) -> Result<Vec<Document>, RemoteError>;

    /// Store a new document and return the id assigned to it.
    async fn insert(&self, fields: Fields) -> Result<String, RemoteError>;

    /// Read one document, `None` if it does not exist.
    async fn read_one(&self, id: &str) -> Result<Option<Document>, RemoteError>;

    /// Replace the fields of an existing document.
    /// Fails with [`RemoteError::NotFound`] when the document is absent.
    async fn overwrite(&self, id: &str, fields: Fields) -> Result<(), RemoteError>;

    /// Remove a document. Removing an absent document succeeds.
    async fn remove(&self, id: &str) -> Result<(), RemoteError>;
}

#[async_trait]
impl<T: RemoteCollection + ?Sized> RemoteCollection for Arc<T> {
    async fn list(&self) -> Result<Vec<Document>, RemoteError> {
        (**self).list().await
    }

    async fn insert(&self, fields: Fields) -> Result<String, RemoteError> {
        (**self).insert(fields).await
    }

    async fn read_one(&self, id: &str) -> Result<Option<Document>, RemoteError> {
        (**self).read_one(id).await
    }

    async fn overwrite(&self, id: &str, fields: Fields) -> Result<(), RemoteError> {
        (**self).overwrite(id, fields).await
    }

    async fn remove(&self, id: &str) -> Result<(), RemoteError> {
        (**self).remove(id).await
    }
}
