//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{watch, Notify};
use wordbook_sync::{Document, Fields, MemoryCollection, RemoteCollection, RemoteError, WordDraft};

/// A [`MemoryCollection`] whose calls can be held open or made to fail.
pub struct GatedCollection {
    pub inner: MemoryCollection,
    failing: AtomicBool,
    open: watch::Sender<bool>,
    reads_open: watch::Sender<bool>,
    entered: Notify,
}

impl GatedCollection {
    pub fn new() -> Self {
        Self::with_documents(Vec::new())
    }

    pub fn with_documents(documents: Vec<Document>) -> Self {
        let (open, _) = watch::channel(true);
        let (reads_open, _) = watch::channel(true);
        Self {
            inner: MemoryCollection::with_documents(documents),
            failing: AtomicBool::new(false),
            open,
            reads_open,
            entered: Notify::new(),
        }
    }

    /// Block every following call until [`release`](Self::release).
    pub fn hold(&self) {
        self.open.send_replace(false);
    }

    pub fn release(&self) {
        self.open.send_replace(true);
    }

    /// Block only single-document reads, so a create stalls between its
    /// insert and its read-back.
    pub fn hold_reads(&self) {
        self.reads_open.send_replace(false);
    }

    pub fn release_reads(&self) {
        self.reads_open.send_replace(true);
    }

    /// Make every following call fail with `Unavailable`.
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Wait until a call is blocked on the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    async fn gate(&self) -> Result<(), RemoteError> {
        self.wait_open(&self.open).await;
        self.check_failing()
    }

    async fn wait_open(&self, gate: &watch::Sender<bool>) {
        let mut rx = gate.subscribe();
        if !*rx.borrow() {
            self.entered.notify_one();
            let _ = rx.wait_for(|open| *open).await;
        }
    }

    fn check_failing(&self) -> Result<(), RemoteError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("injected failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteCollection for GatedCollection {
    async fn list(&self) -> Result<Vec<Document>, RemoteError> {
        self.gate().await?;
        self.inner.list().await
    }

    async fn insert(&self, fields: Fields) -> Result<String, RemoteError> {
        self.gate().await?;
        self.inner.insert(fields).await
    }

    async fn read_one(&self, id: &str) -> Result<Option<Document>, RemoteError> {
        self.gate().await?;
        self.wait_open(&self.reads_open).await;
        self.inner.read_one(id).await
    }

    async fn overwrite(&self, id: &str, fields: Fields) -> Result<(), RemoteError> {
        self.gate().await?;
        self.inner.overwrite(id, fields).await
    }

    async fn remove(&self, id: &str) -> Result<(), RemoteError> {
        self.gate().await?;
        self.inner.remove(id).await
    }
}

pub fn word_fields(word: &str, meaning: &str, time_stamp: i64) -> Fields {
    let mut fields = Fields::new();
    fields.insert("word".into(), json!(word));
    fields.insert("meaning".into(), json!(meaning));
    fields.insert("timeStamp".into(), json!(time_stamp));
    fields
}

pub fn draft(word: &str, meaning: &str, time_stamp: i64) -> WordDraft {
    WordDraft::from_fields(word_fields(word, meaning, time_stamp)).unwrap()
}

pub fn document(id: &str, word: &str, time_stamp: i64) -> Document {
    Document::new(id, word_fields(word, "", time_stamp))
}
