//! In-memory state mirrored from the remote word collection.
//!
//! `StoreState` is only ever changed through [`StoreState::apply`] (see
//! [`crate::reducer`]); everything here is read access.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::record::{WordId, WordRecord};

/// Identifies one invocation of a store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The four store operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    LoadAll,
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [Self::LoadAll, Self::Create, Self::Update, Self::Delete];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoadAll => "load-all",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle phase of the most recent operation.
///
/// One flag shared by all operations: with overlapping requests the last
/// event applied wins. Use [`StoreState::in_flight`] for per-request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Nothing has been dispatched yet.
    #[default]
    Idle,
    Loading,
    Success,
    Failed,
}

/// Snapshot of the word store.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct StoreState {
    pub(crate) status: Status,
    pub(crate) words: Vec<WordRecord>,
    pub(crate) in_flight: BTreeMap<RequestId, OperationKind>,
    pub(crate) last_error: Option<String>,
}

impl StoreState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Mirrored words in display order.
    pub fn words(&self) -> &[WordRecord] {
        &self.words
    }

    /// Requests that fired pending and have not settled yet.
    pub fn in_flight(&self) -> &BTreeMap<RequestId, OperationKind> {
        &self.in_flight
    }

    pub fn is_in_flight(&self, request: RequestId) -> bool {
        self.in_flight.contains_key(&request)
    }

    /// Message of the latest rejection, cleared by the next fulfilment.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn word(&self, id: &WordId) -> Option<&WordRecord> {
        self.words.iter().find(|word| word.id() == id)
    }

    /// Index of the word with this id (linear search).
    pub fn position(&self, id: &WordId) -> Option<usize> {
        self.words.iter().position(|word| word.id() == id)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
