use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dir_client::{
    Action, DirClient, Error, GrpcStore, MemStore, SetOptions, Store, WatchOptions,
};
use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

async fn start_test_server(store: MemStore) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = dirstore_server::grpc::create_server(store);

    let handle = tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(server)
            .serve_with_incoming(tokio_stream::wrappers::TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    sleep(Duration::from_millis(100)).await;
    (addr, handle)
}

async fn connect(store: MemStore) -> DirClient<GrpcStore> {
    let (addr, _handle) = start_test_server(store).await;
    DirClient::dial(addr.to_string()).await.unwrap()
}

#[tokio::test]
async fn test_get_and_set() {
    let client = connect(MemStore::new()).await;

    assert_eq!(client.get("/absent").await.unwrap(), "");
    assert_eq!(client.get_opt("/absent").await.unwrap(), None);

    client.set("/config/name", "dirstore").await.unwrap();
    assert_eq!(client.get("/config/name").await.unwrap(), "dirstore");
}

#[tokio::test]
async fn test_deletes_are_idempotent() {
    let client = connect(MemStore::new()).await;

    client.del("/absent").await.unwrap();
    client.del_dir("/absent").await.unwrap();

    client.set("/tree/a/b", "1").await.unwrap();
    client.del("/tree/a/b").await.unwrap();
    client.del_dir("/tree").await.unwrap();
    assert!(client.ls_recursive("/tree").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_listing() {
    let client = connect(MemStore::new()).await;

    client.set("/a/y", "2").await.unwrap();
    client.set("/a/x", "1").await.unwrap();
    assert_eq!(client.ls("/a").await.unwrap(), vec!["/a/x", "/a/y"]);

    client.set("/b/c/d", "v").await.unwrap();
    assert_eq!(client.ls_recursive("/b").await.unwrap(), vec!["/b/c", "/b/c/d"]);
}

#[tokio::test]
async fn test_mkdir_conflicts_cross_the_wire() {
    let client = connect(MemStore::new()).await;

    client.mkdir("/dir").await.unwrap();
    client.mkdir("/dir").await.unwrap();

    client.set("/leaf", "v").await.unwrap();
    let err = client.mkdir("/leaf").await.unwrap_err();
    assert!(matches!(err, Error::TypeConflict { .. }));
    assert_eq!(client.get("/leaf").await.unwrap(), "v");

    let err = client.set("/dir", "v").await.unwrap_err();
    match err {
        Error::TypeConflict { key, .. } => assert_eq!(key, "/dir"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_update_dir_with_ttl() {
    let client = connect(MemStore::new()).await;

    let err = client
        .update_dir_with_ttl("/lease", Duration::from_secs(5))
        .await
        .unwrap_err();
    match err {
        Error::NotFound { key } => assert_eq!(key, "/lease"),
        other => panic!("unexpected error: {other:?}"),
    }

    client.mkdir("/lease").await.unwrap();
    client
        .update_dir_with_ttl("/lease", Duration::from_secs(5))
        .await
        .unwrap();

    let node = client
        .store()
        .get("/lease", Default::default())
        .await
        .unwrap()
        .node;
    assert!(node.dir);
    assert_eq!(node.ttl, Some(5));
    assert!(node.expiration.is_some());
}

#[tokio::test]
async fn test_watch_recursive() {
    let client = Arc::new(connect(MemStore::new()).await);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let watcher = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            client
                .watch_recursive("/a", |key, value| {
                    let _ = tx.send((key.to_string(), value.to_string()));
                })
                .await
        })
    };
    sleep(Duration::from_millis(100)).await;

    client.set("/a/x", "v").await.unwrap();

    let change = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    assert_eq!(change, Some(("/a/x".to_string(), "v".to_string())));

    watcher.abort();
}

#[tokio::test]
async fn test_watch_resumes_from_cursor() {
    let store = MemStore::new();
    let client = connect(store.clone()).await;

    client.set("/jobs/1", "queued").await.unwrap();
    let mut events = client.watch_from("/jobs", store.revision());
    client.set("/jobs/1", "running").await.unwrap();
    client.set("/jobs/2", "queued").await.unwrap();

    let first = timeout(Duration::from_secs(5), events.next()).await.unwrap().unwrap().unwrap();
    let cursor = events.cursor();
    assert_eq!(first.new_value, "running");
    assert_eq!(cursor, first.revision);
    drop(events);

    let mut resumed = client.watch_from("/jobs", cursor);
    let second = timeout(Duration::from_secs(5), resumed.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(second.key, "/jobs/2");
    assert_eq!(second.revision, first.revision + 1);
}

#[tokio::test]
async fn test_history_expired_crosses_the_wire() {
    let store = MemStore::with_history_window(2);
    let (addr, _handle) = start_test_server(store).await;
    let grpc = GrpcStore::connect(addr.to_string()).await.unwrap();

    for i in 0..5 {
        grpc.set("/k", &i.to_string(), SetOptions::default()).await.unwrap();
    }

    let options = WatchOptions {
        recursive: true,
        after_revision: 1,
    };
    match grpc.watch("/", options).await {
        Err(Error::HistoryExpired {
            requested,
            compacted,
            current,
        }) => {
            assert_eq!(requested, 1);
            assert_eq!(compacted, 3);
            assert_eq!(current, 5);
        }
        Err(other) => panic!("unexpected error: {other:?}"),
        Ok(_) => panic!("watch should have failed"),
    }

    // The client watch resumes from the oldest change the store still holds.
    let client = DirClient::new(grpc);
    let mut events = client.watch_from("/", 1);
    let first = timeout(Duration::from_secs(5), events.next()).await.unwrap().unwrap().unwrap();
    let second = timeout(Duration::from_secs(5), events.next()).await.unwrap().unwrap().unwrap();
    assert_eq!((first.revision, first.new_value.as_str()), (4, "3"));
    assert_eq!((second.revision, second.new_value.as_str()), (5, "4"));

    client.set("/k", "later").await.unwrap();
    let third = timeout(Duration::from_secs(5), events.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(third.key, "/k");
    assert_eq!(third.new_value, "later");
}

#[tokio::test]
async fn test_watch_sees_lease_expiry_over_the_wire() {
    let client = connect(MemStore::new()).await;

    client.mkdir("/lease").await.unwrap();
    client
        .update_dir_with_ttl("/lease", Duration::from_millis(300))
        .await
        .unwrap();

    let mut events = client.watch("/lease");
    let event = timeout(Duration::from_secs(2), events.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(event.key, "/lease");
    assert_eq!(event.action, Action::Expire);
    assert_eq!(event.new_value, "");
}
