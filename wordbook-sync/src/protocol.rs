//! Binary request/response protocol between `WsCollection` and `DocumentServer`.
//!
//! Every WebSocket binary message carries one bincode-encoded frame:
//! ```text
//! client ──► RequestFrame  { request_id, collection, request }
//! server ──► ResponseFrame { request_id, response }
//! ```
//!
//! Requests on one connection may be pipelined; responses are matched back
//! by `request_id`. Field maps travel as JSON bytes inside the frames since
//! bincode cannot carry self-describing values.

use serde::{Deserialize, Serialize};

use crate::collection::Document;
use crate::record::Fields;

/// Operations on a remote collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    List,
    Insert { fields: Vec<u8> },
    ReadOne { id: String },
    Overwrite { id: String, fields: Vec<u8> },
    Remove { id: String },
}

impl Request {
    pub fn kind(&self) -> &'static str {
        match self {
            Request::List => "list",
            Request::Insert { .. } => "insert",
            Request::ReadOne { .. } => "read-one",
            Request::Overwrite { .. } => "overwrite",
            Request::Remove { .. } => "remove",
        }
    }
}

/// A document as carried on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireDocument {
    pub id: String,
    pub fields: Vec<u8>,
}

impl WireDocument {
    pub fn from_document(doc: &Document) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: doc.id.clone(),
            fields: encode_fields(&doc.fields)?,
        })
    }

    pub fn into_document(self) -> Result<Document, ProtocolError> {
        let fields = decode_fields(&self.fields)?;
        Ok(Document::new(self.id, fields))
    }
}

/// Server replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    /// Reply to `List`
    Documents(Vec<WireDocument>),
    /// Reply to `Insert`
    Inserted { id: String },
    /// Reply to `ReadOne`
    Document(Option<WireDocument>),
    /// Reply to `Overwrite` and `Remove`
    Done,
    /// The request failed on the server.
    Failed { message: String, not_found: bool },
}

/// Client → server frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub request_id: u64,
    pub collection: String,
    pub request: Request,
}

impl RequestFrame {
    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (frame, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        Ok(frame)
    }

    /// Read only the leading `request_id` of an encoded frame, so a frame
    /// that is refused or fails to decode can still be answered.
    pub fn peek_request_id(bytes: &[u8]) -> Option<u64> {
        bincode::serde::decode_from_slice::<u64, _>(bytes, bincode::config::standard())
            .ok()
            .map(|(id, _)| id)
    }
}

/// Server → client frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub request_id: u64,
    pub response: Response,
}

impl ResponseFrame {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (frame, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        Ok(frame)
    }
}

/// Encode a field map as JSON bytes.
pub fn encode_fields(fields: &Fields) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(fields).map_err(|e| ProtocolError::SerializationError(e.to_string()))
}

/// Decode JSON bytes into a field map.
pub fn decode_fields(bytes: &[u8]) -> Result<Fields, ProtocolError> {
    serde_json::from_slice(bytes).map_err(|e| ProtocolError::DeserializationError(e.to_string()))
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    SerializationError(String),
    DeserializationError(String),
    FrameTooLarge { size: usize, limit: usize },
    ConnectionClosed,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SerializationError(e) => write!(f, "Serialization error: {e}"),
            Self::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            Self::FrameTooLarge { size, limit } => {
                write!(f, "Frame of {size} bytes exceeds the {limit} byte limit")
            }
            Self::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for ProtocolError {}
