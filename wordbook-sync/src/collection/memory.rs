//! In-memory document collection.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Document, RemoteCollection};
use crate::error::RemoteError;
use crate::record::Fields;

/// Documents kept in a map ordered by id. Ids are simple uuid-v4 strings.
#[derive(Debug, Default)]
pub struct MemoryCollection {
    documents: RwLock<BTreeMap<String, Fields>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the collection with documents whose ids are already known.
    pub fn with_documents(documents: impl IntoIterator<Item = Document>) -> Self {
        let documents = documents
            .into_iter()
            .map(|doc| (doc.id, doc.fields))
            .collect();
        Self {
            documents: RwLock::new(documents),
        }
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl RemoteCollection for MemoryCollection {
    async fn list(&self) -> Result<Vec<Document>, RemoteError> {
        let documents = self.documents.read().await;
        Ok(documents
            .iter()
            .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
            .collect())
    }

    async fn insert(&self, fields: Fields) -> Result<String, RemoteError> {
        let id = Uuid::new_v4().simple().to_string();
        self.documents.write().await.insert(id.clone(), fields);
        Ok(id)
    }

    async fn read_one(&self, id: &str) -> Result<Option<Document>, RemoteError> {
        let documents = self.documents.read().await;
        Ok(documents
            .get(id)
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn overwrite(&self, id: &str, fields: Fields) -> Result<(), RemoteError> {
        let mut documents = self.documents.write().await;
        match documents.get_mut(id) {
            Some(existing) => {
                *existing = fields;
                Ok(())
            }
            None => Err(RemoteError::NotFound(id.to_string())),
        }
    }

    async fn remove(&self, id: &str) -> Result<(), RemoteError> {
        self.documents.write().await.remove(id);
        Ok(())
    }
}
