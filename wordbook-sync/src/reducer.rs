//! Pure state reduction for word store events.
//!
//! Every operation emits `Pending` when invoked and then exactly one
//! settling event: its `*Fulfilled` variant or `Rejected`.
//!
//! | Event              | status    | words                   |
//! |--------------------|-----------|-------------------------|
//! | `Pending`          | `Loading` | unchanged               |
//! | `LoadAllFulfilled` | `Success` | replaced wholesale      |
//! | `CreateFulfilled`  | `Success` | record appended (or     |
//! |                    |           | replaced if already in) |
//! | `UpdateFulfilled`  | `Success` | record replaced in place|
//! | `DeleteFulfilled`  | `Success` | record removed          |
//! | `Rejected`         | `Failed`  | unchanged               |
//!
//! Events that would break an invariant (an absent id on update/delete, a
//! duplicate id within one load-all) are refused with a [`ReduceError`] and
//! leave the state untouched.

use std::collections::HashSet;

use crate::error::ReduceError;
use crate::record::{WordId, WordRecord};
use crate::state::{OperationKind, RequestId, Status, StoreState};

/// Outcome of one phase of a store operation.
#[derive(Debug, Clone, PartialEq)]
pub enum WordEvent {
    Pending {
        request: RequestId,
        op: OperationKind,
    },
    LoadAllFulfilled {
        request: RequestId,
        words: Vec<WordRecord>,
    },
    CreateFulfilled {
        request: RequestId,
        word: WordRecord,
    },
    UpdateFulfilled {
        request: RequestId,
        word: WordRecord,
    },
    DeleteFulfilled {
        request: RequestId,
        id: WordId,
    },
    Rejected {
        request: RequestId,
        op: OperationKind,
        message: String,
    },
}

impl WordEvent {
    pub fn request(&self) -> RequestId {
        match self {
            WordEvent::Pending { request, .. }
            | WordEvent::LoadAllFulfilled { request, .. }
            | WordEvent::CreateFulfilled { request, .. }
            | WordEvent::UpdateFulfilled { request, .. }
            | WordEvent::DeleteFulfilled { request, .. }
            | WordEvent::Rejected { request, .. } => *request,
        }
    }

    pub fn op(&self) -> OperationKind {
        match self {
            WordEvent::Pending { op, .. } | WordEvent::Rejected { op, .. } => *op,
            WordEvent::LoadAllFulfilled { .. } => OperationKind::LoadAll,
            WordEvent::CreateFulfilled { .. } => OperationKind::Create,
            WordEvent::UpdateFulfilled { .. } => OperationKind::Update,
            WordEvent::DeleteFulfilled { .. } => OperationKind::Delete,
        }
    }

    /// Whether this event ends its request.
    pub fn is_settled(&self) -> bool {
        !matches!(self, WordEvent::Pending { .. })
    }
}

/// Apply `event` to a copy of `state`.
pub fn reduce(state: &StoreState, event: &WordEvent) -> Result<StoreState, ReduceError> {
    let mut next = state.clone();
    next.apply(event)?;
    Ok(next)
}

impl StoreState {
    /// Apply `event` in place. On error the state is left unchanged.
    pub fn apply(&mut self, event: &WordEvent) -> Result<(), ReduceError> {
        match event {
            WordEvent::Pending { request, op } => {
                self.in_flight.insert(*request, *op);
                self.status = Status::Loading;
            }
            WordEvent::LoadAllFulfilled { request, words } => {
                if let Some(id) = first_duplicate(words) {
                    return Err(ReduceError::DuplicateId(id.clone()));
                }
                self.words = words.clone();
                self.fulfil(*request);
            }
            WordEvent::CreateFulfilled { request, word } => {
                // A load that settled after the insert may already hold it.
                match self.position(word.id()) {
                    Some(index) => self.words[index] = word.clone(),
                    None => self.words.push(word.clone()),
                }
                self.fulfil(*request);
            }
            WordEvent::UpdateFulfilled { request, word } => {
                let index = self
                    .position(word.id())
                    .ok_or_else(|| ReduceError::NotFound(word.id().clone()))?;
                self.words[index] = word.clone();
                self.fulfil(*request);
            }
            WordEvent::DeleteFulfilled { request, id } => {
                let index = self
                    .position(id)
                    .ok_or_else(|| ReduceError::NotFound(id.clone()))?;
                self.words.remove(index);
                self.fulfil(*request);
            }
            WordEvent::Rejected {
                request, message, ..
            } => {
                self.in_flight.remove(request);
                self.status = Status::Failed;
                self.last_error = Some(message.clone());
            }
        }
        Ok(())
    }

    fn fulfil(&mut self, request: RequestId) {
        self.in_flight.remove(&request);
        self.status = Status::Success;
        self.last_error = None;
    }
}

fn first_duplicate(words: &[WordRecord]) -> Option<&WordId> {
    let mut seen = HashSet::with_capacity(words.len());
    words.iter().map(WordRecord::id).find(|id| !seen.insert(*id))
}
