//! The word store: a local mirror of the `words` collection.
//!
//! ```text
//!   caller ──► WordStore::create(draft) ──► Dispatch<WordRecord>
//!                 │ Pending          (applied before the task is spawned)
//!                 ▼
//!            RemoteCollection::insert ──► read_one
//!                 │
//!                 ▼
//!            CreateFulfilled | Rejected ──► StoreState (reduce)
//! ```
//!
//! Every operation runs as a tokio task and settles its request exactly
//! once, even when its [`Dispatch`] handle is dropped or the task panics.
//! The state lock is only taken for the synchronous reduction and never held
//! across a remote call.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use std::task::{Context, Poll};

use futures_util::FutureExt;
use tokio::task::JoinHandle;

use crate::collection::RemoteCollection;
use crate::error::{RemoteError, WordStoreError};
use crate::record::{sort_records, LoadOrder, WordDraft, WordId, WordRecord, TIME_STAMP_FIELD};
use crate::reducer::WordEvent;
use crate::state::{OperationKind, RequestId, Status, StoreState};

/// Word store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordStoreConfig {
    /// Order of the records returned by a full load
    pub order: LoadOrder,
    /// Field the load order is computed from
    pub time_stamp_field: String,
}

impl Default for WordStoreConfig {
    fn default() -> Self {
        Self {
            order: LoadOrder::Ascending,
            time_stamp_field: TIME_STAMP_FIELD.to_string(),
        }
    }
}

struct Inner<C> {
    collection: C,
    config: WordStoreConfig,
    state: RwLock<StoreState>,
    next_request: AtomicU64,
}

/// Mirrors one remote collection of words. Cloning shares the same state.
pub struct WordStore<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for WordStore<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: RemoteCollection> WordStore<C> {
    pub fn new(collection: C) -> Self {
        Self::with_config(collection, WordStoreConfig::default())
    }

    pub fn with_config(collection: C, config: WordStoreConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                collection,
                config,
                state: RwLock::new(StoreState::new()),
                next_request: AtomicU64::new(1),
            }),
        }
    }

    pub fn collection(&self) -> &C {
        &self.inner.collection
    }

    pub fn config(&self) -> &WordStoreConfig {
        &self.inner.config
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> StoreState {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn status(&self) -> Status {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .status()
    }

    pub fn words(&self) -> Vec<WordRecord> {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .words()
            .to_vec()
    }

    async fn run_load_all(&self, request: RequestId) -> Result<Vec<WordRecord>, WordStoreError> {
        let op = OperationKind::LoadAll;
        let documents = self.remote(request, op, self.inner.collection.list().await)?;

        let mut words: Vec<WordRecord> = documents.into_iter().map(WordRecord::from).collect();
        let config = &self.inner.config;
        sort_records(&mut words, config.order, &config.time_stamp_field);

        self.fulfil(WordEvent::LoadAllFulfilled {
            request,
            words: words.clone(),
        })?;
        Ok(words)
    }

    async fn run_create(
        &self,
        request: RequestId,
        draft: WordDraft,
    ) -> Result<WordRecord, WordStoreError> {
        let op = OperationKind::Create;
        let collection = &self.inner.collection;

        let id = self.remote(request, op, collection.insert(draft.into_fields()).await)?;
        // Read back so the mirror holds what the collection actually stored.
        let read = collection
            .read_one(&id)
            .await
            .and_then(|doc| doc.ok_or_else(|| RemoteError::NotFound(id.clone())));
        let word = WordRecord::from(self.remote(request, op, read)?);

        self.fulfil(WordEvent::CreateFulfilled {
            request,
            word: word.clone(),
        })?;
        Ok(word)
    }

    async fn run_update(
        &self,
        request: RequestId,
        word: WordRecord,
    ) -> Result<WordRecord, WordStoreError> {
        let op = OperationKind::Update;
        self.require_mirrored(request, op, word.id())?;
        let result = self
            .inner
            .collection
            .overwrite(word.id().as_str(), word.fields().clone())
            .await;
        self.remote(request, op, result)?;

        self.fulfil(WordEvent::UpdateFulfilled {
            request,
            word: word.clone(),
        })?;
        Ok(word)
    }

    async fn run_delete(&self, request: RequestId, id: WordId) -> Result<WordId, WordStoreError> {
        let op = OperationKind::Delete;
        self.require_mirrored(request, op, &id)?;
        let result = self.inner.collection.remove(id.as_str()).await;
        self.remote(request, op, result)?;

        self.fulfil(WordEvent::DeleteFulfilled {
            request,
            id: id.clone(),
        })?;
        Ok(id)
    }

    // ─── Settlement ─────────────────────────────────────────────────

    fn lock(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, op: OperationKind) -> RequestId {
        let request = RequestId::new(self.inner.next_request.fetch_add(1, Ordering::Relaxed));
        // Pending never breaks an invariant.
        let _ = self.lock().apply(&WordEvent::Pending { request, op });
        log::debug!("{op} {request} pending");
        request
    }

    /// Reject the request before any remote call if `id` is not mirrored.
    fn require_mirrored(
        &self,
        request: RequestId,
        op: OperationKind,
        id: &WordId,
    ) -> Result<(), WordStoreError> {
        let mut state = self.lock();
        if state.position(id).is_none() {
            let error = WordStoreError::NotFound { op, id: id.clone() };
            return Err(reject(&mut state, request, error));
        }
        Ok(())
    }

    /// Reject the request when the remote call failed.
    fn remote<T>(
        &self,
        request: RequestId,
        op: OperationKind,
        result: Result<T, RemoteError>,
    ) -> Result<T, WordStoreError> {
        result.map_err(|source| {
            let mut state = self.lock();
            reject(&mut state, request, WordStoreError::Remote { op, source })
        })
    }

    /// Apply a fulfilment, or reject the request if the reducer refuses it.
    fn fulfil(&self, event: WordEvent) -> Result<(), WordStoreError> {
        let request = event.request();
        let op = event.op();
        let mut state = self.lock();
        match state.apply(&event) {
            Ok(()) => {
                log::info!("{op} {request} fulfilled ({} words)", state.len());
                Ok(())
            }
            Err(e) => Err(reject(&mut state, request, WordStoreError::from_reduce(op, e))),
        }
    }
}

fn reject(state: &mut StoreState, request: RequestId, error: WordStoreError) -> WordStoreError {
    let event = WordEvent::Rejected {
        request,
        op: error.op(),
        message: error.message(),
    };
    let _ = state.apply(&event);
    log::warn!("{} {request} rejected: {error}", error.op());
    error
}

// ─── Operations ─────────────────────────────────────────────────────
//
// Pending is applied when these are called. The rest runs on the tokio
// runtime, so awaiting the returned `Dispatch` is optional.

impl<C: RemoteCollection + 'static> WordStore<C> {
    /// Fetch every document and replace the mirror with them.
    pub fn load_all(&self) -> Dispatch<Vec<WordRecord>> {
        let op = OperationKind::LoadAll;
        let request = self.begin(op);
        let store = self.clone();
        self.spawn(request, op, async move { store.run_load_all(request).await })
    }

    /// Insert a new word and append the stored record to the mirror.
    pub fn create(&self, draft: WordDraft) -> Dispatch<WordRecord> {
        let op = OperationKind::Create;
        let request = self.begin(op);
        let store = self.clone();
        self.spawn(request, op, async move { store.run_create(request, draft).await })
    }

    /// Overwrite a word's fields and replace it in the mirror.
    pub fn update(&self, word: WordRecord) -> Dispatch<WordRecord> {
        let op = OperationKind::Update;
        let request = self.begin(op);
        let store = self.clone();
        self.spawn(request, op, async move { store.run_update(request, word).await })
    }

    /// Remove a word remotely and from the mirror.
    pub fn delete(&self, id: WordId) -> Dispatch<WordId> {
        let op = OperationKind::Delete;
        let request = self.begin(op);
        let store = self.clone();
        self.spawn(request, op, async move { store.run_delete(request, id).await })
    }

    /// Spawn an operation body; a panic in it rejects the request.
    fn spawn<T, F>(&self, request: RequestId, op: OperationKind, body: F) -> Dispatch<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, WordStoreError>> + Send + 'static,
    {
        let store = self.clone();
        let handle = tokio::spawn(async move {
            match AssertUnwindSafe(body).catch_unwind().await {
                Ok(result) => result,
                Err(_) => {
                    let mut state = store.lock();
                    Err(reject(&mut state, request, WordStoreError::Aborted { op }))
                }
            }
        });
        Dispatch {
            request,
            op,
            handle,
        }
    }
}

/// Handle to an operation running on the tokio runtime.
///
/// Awaiting yields the operation's result. Dropping the handle does not
/// cancel the operation; it still runs to completion and settles its
/// request.
pub struct Dispatch<T> {
    request: RequestId,
    op: OperationKind,
    handle: JoinHandle<Result<T, WordStoreError>>,
}

impl<T> Dispatch<T> {
    pub fn request(&self) -> RequestId {
        self.request
    }

    pub fn op(&self) -> OperationKind {
        self.op
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl<T> Future for Dispatch<T> {
    type Output = Result<T, WordStoreError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let op = self.op;
        let request = self.request;
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Only reachable when the runtime shuts down under the task.
            Poll::Ready(Err(e)) => {
                log::error!("{op} {request} task failed: {e}");
                Poll::Ready(Err(WordStoreError::Aborted { op }))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
