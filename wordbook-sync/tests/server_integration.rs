//! End-to-end tests: word store over a real WebSocket document server.

mod common;

use std::time::Duration;

use common::draft;
use futures_util::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use wordbook_sync::{
    ConnectionState, DocumentServer, RemoteClient, RemoteCollection, RemoteError, ServerConfig,
    Status, WordId, WordStore, WordStoreError,
};

/// Start an in-memory server on a free port, return its URL.
async fn start_test_server() -> String {
    start_server_with(ServerConfig::for_testing()).await
}

async fn start_server_with(config: ServerConfig) -> String {
    let server = DocumentServer::new(config).unwrap();
    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        server.serve(listener).await.unwrap();
    });
    format!("ws://{addr}")
}

#[tokio::test]
async fn test_client_connects() {
    let url = start_test_server().await;
    let client = RemoteClient::connect(&url).await.unwrap();
    assert_eq!(client.connection_state().await, ConnectionState::Connected);
    assert_eq!(client.url(), url);
}

#[tokio::test]
async fn test_word_store_over_websocket() {
    let url = start_test_server().await;
    let client = RemoteClient::connect(&url).await.unwrap();
    let store = WordStore::new(client.collection("words"));

    let older = store.create(draft("anchor", "holds a ship", 200)).await.unwrap();
    let newer = store.create(draft("bay", "a small inlet", 300)).await.unwrap();
    let oldest = store.create(draft("cove", "a sheltered bay", 100)).await.unwrap();
    assert_eq!(store.words().len(), 3);

    // A fresh mirror on the same collection sees everything, ordered.
    let reader = WordStore::new(client.collection("words"));
    let words = reader.load_all().await.unwrap();
    let ids: Vec<&WordId> = words.iter().map(|w| w.id()).collect();
    assert_eq!(ids, [oldest.id(), older.id(), newer.id()]);

    let mut edited = words[0].clone();
    edited.set("meaning", "a small sheltered bay").unwrap();
    reader.update(edited.clone()).await.unwrap();
    assert_eq!(reader.words()[0], edited);

    reader.delete(newer.id().clone()).await.unwrap();
    assert_eq!(reader.words().len(), 2);
    assert_eq!(reader.status(), Status::Success);

    let remaining = store.load_all().await.unwrap();
    assert_eq!(remaining, reader.words());
}

#[tokio::test]
async fn test_collections_are_isolated() {
    let url = start_test_server().await;
    let client = RemoteClient::connect(&url).await.unwrap();

    client
        .collection("words")
        .insert(draft("kelp", "", 1).into_fields())
        .await
        .unwrap();
    assert!(client.collection("notes").list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_remote_not_found_reaches_the_store() {
    let url = start_test_server().await;
    let client = RemoteClient::connect(&url).await.unwrap();
    let collection = client.collection("words");

    let missing = collection.overwrite("ghost", Default::default()).await;
    assert_eq!(missing, Err(RemoteError::NotFound("ghost".into())));
    assert!(collection.read_one("ghost").await.unwrap().is_none());

    let store = WordStore::new(collection);
    let word = store.create(draft("reef", "", 1)).await.unwrap();
    store.collection().remove(word.id().as_str()).await.unwrap();

    let err = store.update(word).await.unwrap_err();
    assert!(matches!(
        err,
        WordStoreError::Remote {
            source: RemoteError::NotFound(_),
            ..
        }
    ));
    assert_eq!(store.status(), Status::Failed);
    assert_eq!(store.words().len(), 1);
}

#[tokio::test]
async fn test_server_rejects_bad_collection_name() {
    let url = start_test_server().await;
    let client = RemoteClient::connect(&url).await.unwrap();

    let err = client.collection("").list().await.unwrap_err();
    assert!(matches!(err, RemoteError::Rejected { .. }));
}

#[tokio::test]
async fn test_pipelined_requests_on_one_connection() {
    let url = start_test_server().await;
    let client = RemoteClient::connect(&url).await.unwrap();
    let store = WordStore::new(client.collection("words"));

    let dispatches: Vec<_> = (0..16)
        .map(|i| store.create(draft(&format!("w{i}"), "", i)))
        .collect();
    for dispatch in dispatches {
        timeout(Duration::from_secs(5), dispatch).await.unwrap().unwrap();
    }

    assert_eq!(store.words().len(), 16);
    assert_eq!(store.load_all().await.unwrap().len(), 16);
}

#[tokio::test]
async fn test_oversized_request_is_answered() {
    let url = start_server_with(ServerConfig {
        max_frame_bytes: 256,
        ..ServerConfig::for_testing()
    })
    .await;
    let client = RemoteClient::connect(&url).await.unwrap();
    let store = WordStore::new(client.collection("words"));

    let big = draft("x", &"x".repeat(1024), 1);
    let err = timeout(Duration::from_secs(5), store.create(big))
        .await
        .expect("oversized request was never answered")
        .unwrap_err();
    assert!(matches!(
        err,
        WordStoreError::Remote {
            source: RemoteError::Rejected { .. },
            ..
        }
    ));
    assert_eq!(store.status(), Status::Failed);
    assert!(store.state().in_flight().is_empty());

    // The connection stays usable for frames within the limit.
    store.create(draft("y", "", 2)).await.unwrap();
    assert_eq!(store.status(), Status::Success);
}

#[tokio::test]
async fn test_unreadable_frame_closes_the_connection() {
    let url = start_test_server().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    ws.send(Message::Binary(vec![0xff, 0x00].into())).await.unwrap();

    let closed = timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "server kept a connection it cannot answer on");
}
