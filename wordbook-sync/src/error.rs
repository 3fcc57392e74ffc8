//! Error types for word records, collections and the word store.

use thiserror::Error;

use crate::protocol::ProtocolError;
use crate::record::WordId;
use crate::state::OperationKind;
use crate::storage::StoreError;

/// Invalid word payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("word payload must not carry an `id` field; ids are assigned by the collection")]
    IdNotAllowed,

    #[error("word payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Failure reported by a [`crate::RemoteCollection`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The collection could not be reached (connection refused or lost).
    #[error("collection unavailable: {0}")]
    Unavailable(String),

    /// The document server refused the request.
    #[error("request rejected by the document server: {message}")]
    Rejected { message: String },

    #[error("document not found: {0}")]
    NotFound(String),

    /// A document or frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl RemoteError {
    /// Best-effort human readable message.
    pub fn message(&self) -> String {
        match self {
            RemoteError::Rejected { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for RemoteError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { id, .. } => RemoteError::NotFound(id),
            StoreError::SerializationError(e) | StoreError::DeserializationError(e) => {
                RemoteError::Codec(e)
            }
            other => RemoteError::Storage(other.to_string()),
        }
    }
}

impl From<ProtocolError> for RemoteError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::ConnectionClosed => RemoteError::Unavailable(e.to_string()),
            other => RemoteError::Codec(other.to_string()),
        }
    }
}

/// An event the reducer refused because it would break a state invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReduceError {
    #[error("no word with id {0} in the store")]
    NotFound(WordId),

    #[error("word id {0} is already present in the store")]
    DuplicateId(WordId),
}

/// Why a word store operation was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WordStoreError {
    #[error("{op} failed: {source}")]
    Remote {
        op: OperationKind,
        #[source]
        source: RemoteError,
    },

    /// The target id is not in the mirrored list.
    #[error("{op} failed: no word with id {id} in the store")]
    NotFound { op: OperationKind, id: WordId },

    #[error("{op} failed: word id {id} is already present in the store")]
    DuplicateId { op: OperationKind, id: WordId },

    /// The task running the operation panicked or was cancelled.
    #[error("{op} was aborted before it settled")]
    Aborted { op: OperationKind },
}

impl WordStoreError {
    pub(crate) fn from_reduce(op: OperationKind, e: ReduceError) -> Self {
        match e {
            ReduceError::NotFound(id) => WordStoreError::NotFound { op, id },
            ReduceError::DuplicateId(id) => WordStoreError::DuplicateId { op, id },
        }
    }

    pub fn op(&self) -> OperationKind {
        match self {
            WordStoreError::Remote { op, .. }
            | WordStoreError::NotFound { op, .. }
            | WordStoreError::DuplicateId { op, .. }
            | WordStoreError::Aborted { op } => *op,
        }
    }

    /// Whether the target word was missing, locally or remotely.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            WordStoreError::NotFound { .. }
                | WordStoreError::Remote {
                    source: RemoteError::NotFound(_),
                    ..
                }
        )
    }

    /// Message recorded in [`crate::StoreState::last_error`].
    pub fn message(&self) -> String {
        match self {
            WordStoreError::Remote { source, .. } => source.message(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_message_prefers_server_text() {
        let err = RemoteError::Rejected {
            message: "quota exceeded".into(),
        };
        assert_eq!(err.message(), "quota exceeded");
        assert_eq!(
            RemoteError::Unavailable("refused".into()).message(),
            "collection unavailable: refused"
        );
    }

    #[test]
    fn test_store_error_display() {
        let err = WordStoreError::NotFound {
            op: OperationKind::Update,
            id: WordId::new("w9"),
        };
        assert_eq!(err.to_string(), "update failed: no word with id w9 in the store");
        assert_eq!(err.op(), OperationKind::Update);

        let err = WordStoreError::Remote {
            op: OperationKind::LoadAll,
            source: RemoteError::Rejected {
                message: "permission denied".into(),
            },
        };
        assert_eq!(err.message(), "permission denied");
    }

    #[test]
    fn test_storage_not_found_maps_to_remote_not_found() {
        let err = RemoteError::from(StoreError::NotFound {
            collection: "words".into(),
            id: "abc".into(),
        });
        assert_eq!(err, RemoteError::NotFound("abc".into()));
    }
}
