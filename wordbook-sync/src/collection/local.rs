//! Collection backed by a local RocksDB [`DocumentStore`].

use std::sync::Arc;

use async_trait::async_trait;

use super::{Document, RemoteCollection};
use crate::error::RemoteError;
use crate::record::Fields;
use crate::storage::rocks::validate_collection;
use crate::storage::{DocumentStore, StoreError};

/// One named collection of a shared [`DocumentStore`].
#[derive(Clone)]
pub struct LocalCollection {
    store: Arc<DocumentStore>,
    name: String,
}

impl LocalCollection {
    pub fn new(store: Arc<DocumentStore>, name: impl Into<String>) -> Result<Self, StoreError> {
        let name = name.into();
        validate_collection(&name)?;
        Ok(Self { store, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }
}

#[async_trait]
impl RemoteCollection for LocalCollection {
    async fn list(&self) -> Result<Vec<Document>, RemoteError> {
        let documents = self.store.list_documents(&self.name)?;
        Ok(documents
            .into_iter()
            .map(|(id, fields)| Document::new(id, fields))
            .collect())
    }

    async fn insert(&self, fields: Fields) -> Result<String, RemoteError> {
        Ok(self.store.insert_document(&self.name, &fields)?)
    }

    async fn read_one(&self, id: &str) -> Result<Option<Document>, RemoteError> {
        match self.store.load_document(&self.name, id) {
            Ok(fields) => Ok(Some(Document::new(id, fields))),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn overwrite(&self, id: &str, fields: Fields) -> Result<(), RemoteError> {
        self.store.overwrite_document(&self.name, id, &fields)?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), RemoteError> {
        if !self.store.delete_document(&self.name, id)? {
            log::debug!("remove: {}/{id} was already absent", self.name);
        }
        Ok(())
    }
}
