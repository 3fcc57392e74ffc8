//! # wordbook-sync — word list mirrored from a document database
//!
//! Keeps an in-memory list of word records in step with a remote document
//! collection. Four asynchronous operations (load-all, create, update,
//! delete) drive a pure reducer that tracks a `loading` / `success` /
//! `failed` status for the UI layer.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  load_all..   ┌─────────────┐   reduce    ┌─────────────┐
//! │  UI / CLI   │ ────────────► │  WordStore  │ ──────────► │ StoreState  │
//! │ (consumer)  │ ◄──────────── │  (adapter)  │  (pending,  │ status +    │
//! └─────────────┘  Result<T, E> └──────┬──────┘  settled)   │ words       │
//!                                      │                    └─────────────┘
//!                                      ▼
//!                            ┌──────────────────┐
//!                            │ RemoteCollection │
//!                            └────────┬─────────┘
//!               ┌─────────────────────┼─────────────────────┐
//!               ▼                     ▼                     ▼
//!      ┌────────────────┐   ┌──────────────────┐   ┌────────────────┐
//!      │MemoryCollection│   │ LocalCollection  │   │  WsCollection  │
//!      │  (in-memory)   │   │ (DocumentStore)  │   │  (WebSocket)   │
//!      └────────────────┘   └──────────────────┘   └───────┬────────┘
//!                                                          │ bincode frames
//!                                                  ┌───────┴────────┐
//!                                                  │ DocumentServer │
//!                                                  └────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`record`] — `WordRecord`, `WordDraft` and time-stamp ordering
//! - [`state`] — `StoreState`, `Status` and request bookkeeping
//! - [`reducer`] — `WordEvent` and the pure `reduce` function
//! - [`words`] — the `WordStore` adapter and the `Dispatch` handle it returns
//! - [`collection`] — the `RemoteCollection` contract and its backends
//! - [`storage`] — RocksDB-backed document store
//! - [`protocol`] — binary request/response frames
//! - [`server`] — WebSocket document server

pub mod collection;
pub mod error;
pub mod protocol;
pub mod record;
pub mod reducer;
pub mod server;
pub mod state;
pub mod storage;
pub mod words;

// Re-exports for convenience
pub use collection::local::LocalCollection;
pub use collection::memory::MemoryCollection;
pub use collection::remote::{ClientConfig, ConnectionState, RemoteClient, WsCollection};
pub use collection::{Document, RemoteCollection};
pub use error::{RecordError, ReduceError, RemoteError, WordStoreError};
pub use protocol::{ProtocolError, Request, RequestFrame, Response, ResponseFrame};
pub use record::{Fields, LoadOrder, WordDraft, WordId, WordRecord};
pub use reducer::{reduce, WordEvent};
pub use server::{DocumentServer, ServerConfig, ServerStats};
pub use state::{OperationKind, RequestId, Status, StoreState};
pub use storage::{DocumentMetadata, DocumentStore, StoreConfig, StoreError};
pub use words::{Dispatch, WordStore, WordStoreConfig};
