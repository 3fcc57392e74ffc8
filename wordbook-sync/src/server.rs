//! WebSocket document server.
//!
//! Architecture:
//! ```text
//! WsCollection A ──┐                      ┌── MemoryCollection (per name)
//!                   ├── DocumentServer ───┤
//! WsCollection B ──┘   RequestFrame →     └── LocalCollection ── DocumentStore
//!                      ← ResponseFrame                            (RocksDB)
//! ```
//!
//! Each connection is served by its own task; frames on one connection are
//! executed in the order they arrive.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;

use crate::collection::local::LocalCollection;
use crate::collection::memory::MemoryCollection;
use crate::collection::RemoteCollection;
use crate::error::RemoteError;
use crate::protocol::{
    decode_fields, encode_fields, ProtocolError, Request, RequestFrame, Response, ResponseFrame,
    WireDocument,
};
use crate::storage::{DocumentStore, StoreConfig, StoreError};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Persistence storage path (None = in-memory only)
    pub storage_path: Option<PathBuf>,
    /// Largest request frame accepted, in bytes
    pub max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9191".to_string(),
            storage_path: None,
            max_frame_bytes: 16 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// In-memory server on an OS-assigned local port.
    pub fn for_testing() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            ..Self::default()
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub total_bytes: u64,
}

/// Where the served collections live.
enum Backend {
    Memory(RwLock<HashMap<String, Arc<MemoryCollection>>>),
    Persistent(Arc<DocumentStore>),
}

impl Backend {
    async fn collection(&self, name: &str) -> Result<Arc<dyn RemoteCollection>, RemoteError> {
        match self {
            Backend::Memory(collections) => {
                crate::storage::rocks::validate_collection(name)?;
                if let Some(existing) = collections.read().await.get(name) {
                    return Ok(existing.clone());
                }
                let mut collections = collections.write().await;
                let collection = collections
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(MemoryCollection::new()))
                    .clone();
                Ok(collection)
            }
            Backend::Persistent(store) => {
                Ok(Arc::new(LocalCollection::new(store.clone(), name)?))
            }
        }
    }
}

/// Serves document collections to [`crate::WsCollection`] clients.
pub struct DocumentServer {
    config: ServerConfig,
    backend: Arc<Backend>,
    stats: Arc<RwLock<ServerStats>>,
}

impl DocumentServer {
    /// Create a server, opening persistent storage if configured.
    pub fn new(config: ServerConfig) -> Result<Self, StoreError> {
        let backend = match &config.storage_path {
            Some(path) => {
                let store = DocumentStore::open(StoreConfig {
                    path: path.clone(),
                    ..StoreConfig::default()
                })?;
                Backend::Persistent(Arc::new(store))
            }
            None => Backend::Memory(RwLock::new(HashMap::new())),
        };

        Ok(Self {
            config,
            backend: Arc::new(backend),
            stats: Arc::new(RwLock::new(ServerStats::default())),
        })
    }

    /// In-memory server with default configuration.
    pub fn in_memory() -> Self {
        Self {
            config: ServerConfig::default(),
            backend: Arc::new(Backend::Memory(RwLock::new(HashMap::new()))),
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    /// Create with persistence enabled at the given path.
    pub fn with_storage(
        bind_addr: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Result<Self, StoreError> {
        Self::new(ServerConfig {
            bind_addr: bind_addr.into(),
            storage_path: Some(path.into()),
            ..ServerConfig::default()
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    /// Bind the configured address. Use port 0 to let the OS pick one.
    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        TcpListener::bind(&self.config.bind_addr).await
    }

    /// Bind and serve until the listener fails.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener.
    pub async fn serve(
        &self,
        listener: TcpListener,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        log::info!("Document server listening on {}", listener.local_addr()?);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let backend = self.backend.clone();
            let stats = self.stats.clone();
            let max_frame_bytes = self.config.max_frame_bytes;

            tokio::spawn(async move {
                if let Err(e) =
                    Self::handle_connection(stream, addr, backend, stats.clone(), max_frame_bytes)
                        .await
                {
                    log::error!("Connection error from {addr}: {e}");
                }
                let mut s = stats.write().await;
                s.active_connections = s.active_connections.saturating_sub(1);
            });
        }
    }

    /// Handle a single WebSocket connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        backend: Arc<Backend>,
        stats: Arc<RwLock<ServerStats>>,
        max_frame_bytes: usize,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        log::info!("WebSocket connection established from {addr}");

        while let Some(msg) = ws_receiver.next().await {
            match msg? {
                Message::Binary(data) => {
                    let bytes: Vec<u8> = data.into();
                    let decoded = if bytes.len() > max_frame_bytes {
                        Err(ProtocolError::FrameTooLarge {
                            size: bytes.len(),
                            limit: max_frame_bytes,
                        })
                    } else {
                        RequestFrame::decode(&bytes)
                    };

                    let frame = match decoded {
                        Ok(frame) => frame,
                        Err(e) => {
                            // Answer the caller if its id survived; otherwise
                            // hang up so its waiters fail instead of hanging.
                            let Some(request_id) = RequestFrame::peek_request_id(&bytes) else {
                                log::warn!("Closing connection from {addr}: {e}");
                                let _ = ws_sender.close().await;
                                return Err(e.into());
                            };
                            log::warn!("Refusing request #{request_id} from {addr}: {e}");
                            stats.write().await.failed_requests += 1;
                            let reply = ResponseFrame {
                                request_id,
                                response: Response::Failed {
                                    message: e.to_string(),
                                    not_found: false,
                                },
                            };
                            ws_sender.send(Message::Binary(reply.encode()?.into())).await?;
                            continue;
                        }
                    };

                    log::trace!(
                        "{addr}: {} #{} on {}",
                        frame.request.kind(),
                        frame.request_id,
                        frame.collection
                    );
                    let response = Self::execute(&backend, &frame.collection, frame.request).await;
                    {
                        let mut s = stats.write().await;
                        s.total_requests += 1;
                        s.total_bytes += bytes.len() as u64;
                        if matches!(response, Response::Failed { .. }) {
                            s.failed_requests += 1;
                        }
                    }

                    let reply = ResponseFrame {
                        request_id: frame.request_id,
                        response,
                    };
                    ws_sender.send(Message::Binary(reply.encode()?.into())).await?;
                }
                Message::Close(_) => {
                    log::info!("Connection closed from {addr}");
                    break;
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Run one request against the backend, folding errors into `Failed`.
    async fn execute(backend: &Backend, collection: &str, request: Request) -> Response {
        let result = match backend.collection(collection).await {
            Ok(target) => Self::try_execute(target.as_ref(), request).await,
            Err(e) => Err(e),
        };

        result.unwrap_or_else(|e| {
            log::warn!("Request on {collection} failed: {e}");
            Response::Failed {
                message: e.message(),
                not_found: matches!(e, RemoteError::NotFound(_)),
            }
        })
    }

    async fn try_execute(
        collection: &dyn RemoteCollection,
        request: Request,
    ) -> Result<Response, RemoteError> {
        match request {
            Request::List => {
                let documents = collection.list().await?;
                let wire = documents
                    .iter()
                    .map(WireDocument::from_document)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Response::Documents(wire))
            }
            Request::Insert { fields } => {
                let id = collection.insert(decode_fields(&fields)?).await?;
                Ok(Response::Inserted { id })
            }
            Request::ReadOne { id } => {
                let document = collection.read_one(&id).await?;
                let wire = match document {
                    Some(doc) => Some(WireDocument {
                        id: doc.id,
                        fields: encode_fields(&doc.fields)?,
                    }),
                    None => None,
                };
                Ok(Response::Document(wire))
            }
            Request::Overwrite { id, fields } => {
                collection.overwrite(&id, decode_fields(&fields)?).await?;
                Ok(Response::Done)
            }
            Request::Remove { id } => {
                collection.remove(&id).await?;
                Ok(Response::Done)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Fields;
    use serde_json::json;

    fn fields(word: &str) -> Vec<u8> {
        let mut map = Fields::new();
        map.insert("word".into(), json!(word));
        encode_fields(&map).unwrap()
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:9191");
        assert!(config.storage_path.is_none());
        assert_eq!(ServerConfig::for_testing().bind_addr, "127.0.0.1:0");
    }

    #[tokio::test]
    async fn test_execute_against_memory_backend() {
        let server = DocumentServer::in_memory();

        let Response::Inserted { id } =
            DocumentServer::execute(&server.backend, "words", Request::Insert { fields: fields("sea") }).await
        else {
            panic!("expected Inserted");
        };

        let response = DocumentServer::execute(&server.backend, "words", Request::List).await;
        let Response::Documents(docs) = response else {
            panic!("expected Documents");
        };
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, id);

        // Collections are isolated by name
        let other = DocumentServer::execute(&server.backend, "notes", Request::List).await;
        assert_eq!(other, Response::Documents(vec![]));
    }

    #[tokio::test]
    async fn test_execute_reports_not_found() {
        let server = DocumentServer::in_memory();
        let response = DocumentServer::execute(
            &server.backend,
            "words",
            Request::Overwrite {
                id: "ghost".into(),
                fields: fields("x"),
            },
        )
        .await;
        assert!(matches!(response, Response::Failed { not_found: true, .. }));
    }

    #[tokio::test]
    async fn test_execute_rejects_bad_payload_and_name() {
        let server = DocumentServer::in_memory();
        let response = DocumentServer::execute(
            &server.backend,
            "words",
            Request::Insert {
                fields: b"not json".to_vec(),
            },
        )
        .await;
        assert!(matches!(response, Response::Failed { not_found: false, .. }));

        let response = DocumentServer::execute(&server.backend, "", Request::List).await;
        assert!(matches!(response, Response::Failed { .. }));
    }

    #[tokio::test]
    async fn test_persistent_backend() {
        let dir = tempfile::tempdir().unwrap();
        let server = DocumentServer::with_storage("127.0.0.1:0", dir.path().join("db")).unwrap();

        let response =
            DocumentServer::execute(&server.backend, "words", Request::Insert { fields: fields("sky") }).await;
        let Response::Inserted { id } = response else {
            panic!("expected Inserted");
        };
        let response =
            DocumentServer::execute(&server.backend, "words", Request::ReadOne { id: id.clone() }).await;
        let Response::Document(Some(doc)) = response else {
            panic!("expected a document");
        };
        assert_eq!(doc.id, id);
    }
}
