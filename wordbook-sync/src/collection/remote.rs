//! WebSocket client for collections served by a [`crate::DocumentServer`].
//!
//! One connection carries every collection. A writer task drains the
//! outgoing channel into the socket; a reader task routes each
//! `ResponseFrame` to the caller waiting on its `request_id`. When the
//! connection drops, every outstanding request fails with
//! [`RemoteError::Unavailable`], and so does a request left unanswered past
//! [`ClientConfig::request_timeout`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message;

use super::{Document, RemoteCollection};
use crate::error::RemoteError;
use crate::protocol::{
    encode_fields, ProtocolError, Request, RequestFrame, Response, ResponseFrame,
};
use crate::record::Fields;

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long a request may wait for its response
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Callers waiting for a response, by request id. Once `closed` is set no
/// waiter is admitted.
#[derive(Default)]
struct Waiters {
    closed: bool,
    by_id: HashMap<u64, oneshot::Sender<Response>>,
}

type PendingMap = Arc<Mutex<Waiters>>;

struct ClientInner {
    url: String,
    config: ClientConfig,
    state: Arc<RwLock<ConnectionState>>,
    /// Channel to the WebSocket writer task
    outgoing_tx: mpsc::Sender<Vec<u8>>,
    /// Callers waiting for a response, by request id
    pending: PendingMap,
    next_request: AtomicU64,
}

/// Shared connection to a document server. Cloning is cheap.
#[derive(Clone)]
pub struct RemoteClient {
    inner: Arc<ClientInner>,
}

impl RemoteClient {
    /// Connect to `ws://host:port`.
    ///
    /// Spawns background tasks for reading/writing WebSocket messages.
    pub async fn connect(url: impl Into<String>) -> Result<Self, RemoteError> {
        Self::connect_with_config(url, ClientConfig::default()).await
    }

    pub async fn connect_with_config(
        url: impl Into<String>,
        config: ClientConfig,
    ) -> Result<Self, RemoteError> {
        let url = url.into();
        let state = Arc::new(RwLock::new(ConnectionState::Connecting));

        let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| RemoteError::Unavailable(format!("{url}: {e}")))?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: forward outgoing channel to WebSocket
        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<Vec<u8>>(256);
        tokio::spawn(async move {
            while let Some(data) = outgoing_rx.recv().await {
                if ws_writer.send(Message::Binary(data.into())).await.is_err() {
                    break;
                }
            }
            let _ = ws_writer.close().await;
        });

        *state.write().await = ConnectionState::Connected;
        log::info!("Connected to document server at {url}");

        // Reader task: route responses to waiting callers
        let pending: PendingMap = Arc::new(Mutex::new(Waiters::default()));
        let reader_pending = pending.clone();
        let reader_state = state.clone();
        let reader_url = url.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Binary(data)) => {
                        let bytes: Vec<u8> = data.into();
                        match ResponseFrame::decode(&bytes) {
                            Ok(frame) => {
                                let waiter =
                                    reader_pending.lock().await.by_id.remove(&frame.request_id);
                                match waiter {
                                    Some(tx) => {
                                        let _ = tx.send(frame.response);
                                    }
                                    None => log::debug!(
                                        "Response #{} has no waiting caller",
                                        frame.request_id
                                    ),
                                }
                            }
                            Err(e) => log::warn!("Undecodable frame from {reader_url}: {e}"),
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }

            // Connection lost; dropping the senders fails every waiter.
            *reader_state.write().await = ConnectionState::Disconnected;
            {
                let mut waiters = reader_pending.lock().await;
                waiters.closed = true;
                waiters.by_id.clear();
            }
            log::info!("Disconnected from document server at {reader_url}");
        });

        Ok(Self {
            inner: Arc::new(ClientInner {
                url,
                config,
                state,
                outgoing_tx,
                pending,
                next_request: AtomicU64::new(1),
            }),
        })
    }

    /// Handle to one collection on this connection.
    pub fn collection(&self, name: impl Into<String>) -> WsCollection {
        WsCollection {
            client: self.clone(),
            name: name.into(),
        }
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.inner.state.read().await
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Send one request and wait for its response.
    async fn call(&self, collection: &str, request: Request) -> Result<Response, RemoteError> {
        let request_id = self.inner.next_request.fetch_add(1, Ordering::Relaxed);
        let frame = RequestFrame {
            request_id,
            collection: collection.to_string(),
            request,
        };
        let encoded = frame.encode()?;

        let (tx, rx) = oneshot::channel();
        {
            let mut waiters = self.inner.pending.lock().await;
            if waiters.closed {
                return Err(ProtocolError::ConnectionClosed.into());
            }
            waiters.by_id.insert(request_id, tx);
        }

        if self.inner.outgoing_tx.send(encoded).await.is_err() {
            self.forget(request_id).await;
            return Err(ProtocolError::ConnectionClosed.into());
        }

        let limit = self.inner.config.request_timeout;
        match tokio::time::timeout(limit, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ProtocolError::ConnectionClosed.into()),
            Err(_) => {
                self.forget(request_id).await;
                log::warn!("Request #{request_id} to {} timed out", self.inner.url);
                Err(RemoteError::Unavailable(format!(
                    "no response from {} within {limit:?}",
                    self.inner.url
                )))
            }
        }
    }

    async fn forget(&self, request_id: u64) {
        self.inner.pending.lock().await.by_id.remove(&request_id);
    }
}

/// A collection on a remote document server.
#[derive(Clone)]
pub struct WsCollection {
    client: RemoteClient,
    name: String,
}

impl WsCollection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client(&self) -> &RemoteClient {
        &self.client
    }

    async fn call(&self, request: Request, id: Option<&str>) -> Result<Response, RemoteError> {
        let kind = request.kind();
        match self.client.call(&self.name, request).await? {
            Response::Failed {
                not_found: true,
                message,
            } => Err(RemoteError::NotFound(id.map_or(message, str::to_string))),
            Response::Failed { message, .. } => Err(RemoteError::Rejected { message }),
            response => {
                log::trace!("{kind} on {} answered", self.name);
                Ok(response)
            }
        }
    }
}

fn unexpected(request: &str, response: &Response) -> RemoteError {
    RemoteError::Codec(format!("unexpected response to {request}: {response:?}"))
}

#[async_trait]
impl RemoteCollection for WsCollection {
    async fn list(&self) -> Result<Vec<Document>, RemoteError> {
        match self.call(Request::List, None).await? {
            Response::Documents(docs) => docs
                .into_iter()
                .map(|doc| doc.into_document().map_err(RemoteError::from))
                .collect(),
            other => Err(unexpected("list", &other)),
        }
    }

    async fn insert(&self, fields: Fields) -> Result<String, RemoteError> {
        let request = Request::Insert {
            fields: encode_fields(&fields)?,
        };
        match self.call(request, None).await? {
            Response::Inserted { id } => Ok(id),
            other => Err(unexpected("insert", &other)),
        }
    }

    async fn read_one(&self, id: &str) -> Result<Option<Document>, RemoteError> {
        let request = Request::ReadOne { id: id.to_string() };
        match self.call(request, Some(id)).await? {
            Response::Document(Some(doc)) => Ok(Some(doc.into_document()?)),
            Response::Document(None) => Ok(None),
            other => Err(unexpected("read-one", &other)),
        }
    }

    async fn overwrite(&self, id: &str, fields: Fields) -> Result<(), RemoteError> {
        let request = Request::Overwrite {
            id: id.to_string(),
            fields: encode_fields(&fields)?,
        };
        match self.call(request, Some(id)).await? {
            Response::Done => Ok(()),
            other => Err(unexpected("overwrite", &other)),
        }
    }

    async fn remove(&self, id: &str) -> Result<(), RemoteError> {
        let request = Request::Remove { id: id.to_string() };
        match self.call(request, Some(id)).await? {
            Response::Done => Ok(()),
            other => Err(unexpected("remove", &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = RemoteClient::connect(format!("ws://127.0.0.1:{port}")).await;
        assert!(matches!(result, Err(RemoteError::Unavailable(_))));
    }

    /// Accept one WebSocket client, read `reads` messages without answering,
    /// then hold or drop the socket.
    async fn silent_server(reads: usize, hang_up: bool) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            for _ in 0..reads {
                if ws.next().await.is_none() {
                    return;
                }
            }
            if !hang_up {
                std::future::pending::<()>().await;
            }
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn test_unanswered_request_times_out() {
        let url = silent_server(1, false).await;
        let config = ClientConfig {
            request_timeout: Duration::from_millis(100),
        };
        let client = RemoteClient::connect_with_config(&url, config).await.unwrap();

        let err = client.collection("words").list().await.unwrap_err();
        assert!(matches!(err, RemoteError::Unavailable(_)));
        assert!(client.inner.pending.lock().await.by_id.is_empty());
    }

    #[tokio::test]
    async fn test_requests_after_a_hang_up_fail_fast() {
        let url = silent_server(1, true).await;
        let client = RemoteClient::connect(&url).await.unwrap();
        let words = client.collection("words");

        let first = tokio::time::timeout(Duration::from_secs(5), words.list())
            .await
            .expect("in-flight request hung after the server went away");
        assert!(matches!(first, Err(RemoteError::Unavailable(_))));

        // The reader has seen the close by now; no waiter may be parked.
        let second = tokio::time::timeout(Duration::from_secs(5), words.read_one("w1"))
            .await
            .expect("request after the hang up was parked");
        assert_eq!(
            second,
            Err(RemoteError::from(ProtocolError::ConnectionClosed))
        );
        assert_eq!(client.connection_state().await, ConnectionState::Disconnected);
    }

    #[test]
    fn test_unexpected_response_is_codec_error() {
        let err = unexpected("list", &Response::Done);
        assert!(matches!(err, RemoteError::Codec(_)));
    }
}
