//! Client engine against the reference server over real HTTP.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chunkstream_upload::api::{router_for, ChunkStore, ServerConfig};
use chunkstream_upload::chunk::SourceFile;
use chunkstream_upload::config::UploadConfig;
use chunkstream_upload::coordinator::{
    ChannelObserver, UploadNotification, UploadSessionManager,
};
use chunkstream_upload::integrity::{Digest, HashAlgorithm, StreamingHasher};
use chunkstream_upload::network::{
    ChunkUploadRequest, HttpTransport, MergeRequest, MergeResponse, NetworkResult,
    UploadTransport,
};
use chunkstream_upload::session::{TaskId, UploadStatus};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::net::TcpListener;

const MIB: u64 = 1024 * 1024;

/// Starts the server on an ephemeral port and returns its upload base URL.
async fn spawn_server(root: &Path, algorithm: HashAlgorithm) -> (String, ChunkStore) {
    let store = ChunkStore::open(root, algorithm).await.unwrap();
    let config = ServerConfig::new(root).with_hash_algorithm(algorithm);
    let app = router_for(store.clone(), config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/upload"), store)
}

fn payload(len: u64) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 253) as u8).collect()
}

async fn write_source(dir: &TempDir, name: &str, data: &[u8]) -> SourceFile {
    let path = dir.path().join(name);
    tokio::fs::write(&path, data).await.unwrap();
    SourceFile::from_path(&path).await.unwrap()
}

async fn settle(manager: &UploadSessionManager, id: TaskId) -> UploadStatus {
    tokio::time::timeout(Duration::from_secs(30), manager.wait_settled(id))
        .await
        .expect("upload did not settle")
        .unwrap()
}

/// Forwards to HTTP, recording chunk indices and swallowing the first upload
/// of selected chunks.
struct LossyTransport {
    inner: HttpTransport,
    lose_once: Mutex<HashSet<u32>>,
    uploads: Mutex<Vec<u32>>,
}

impl LossyTransport {
    fn new(config: &UploadConfig, lose_once: impl IntoIterator<Item = u32>) -> Arc<Self> {
        Arc::new(Self {
            inner: HttpTransport::from_config(config).unwrap(),
            lose_once: Mutex::new(lose_once.into_iter().collect()),
            uploads: Mutex::new(Vec::new()),
        })
    }

    fn uploads(&self) -> Vec<u32> {
        self.uploads.lock().clone()
    }
}

impl UploadTransport for LossyTransport {
    fn probe<'a>(&'a self, digest: &'a Digest) -> BoxFuture<'a, NetworkResult<Vec<u32>>> {
        self.inner.probe(digest)
    }

    fn upload_chunk(&self, request: ChunkUploadRequest) -> BoxFuture<'_, NetworkResult<()>> {
        self.uploads.lock().push(request.chunk_index);
        if self.lose_once.lock().remove(&request.chunk_index) {
            return async { Ok(()) }.boxed();
        }
        self.inner.upload_chunk(request)
    }

    fn merge<'a>(
        &'a self,
        request: &'a MergeRequest,
    ) -> BoxFuture<'a, NetworkResult<MergeResponse>> {
        self.inner.merge(request)
    }
}

#[tokio::test]
async fn test_upload_is_reassembled_on_the_server() {
    let server_dir = TempDir::new().unwrap();
    let client_dir = TempDir::new().unwrap();
    let (action, _store) = spawn_server(server_dir.path(), HashAlgorithm::Md5).await;

    let data = payload(5 * MIB);
    let digest = StreamingHasher::digest_bytes(HashAlgorithm::Md5, &data);
    let source = write_source(&client_dir, "video.bin", &data).await;

    let config = UploadConfig::new(action)
        .with_chunk_size(2 * MIB)
        .with_max_concurrent(3);
    let (observer, mut notifications) = ChannelObserver::new();
    let manager = UploadSessionManager::with_http(config, Arc::new(observer)).unwrap();

    let id = manager.submit(source).await.unwrap();
    assert_eq!(settle(&manager, id).await, UploadStatus::Success);

    let merged = server_dir
        .path()
        .join("files")
        .join(digest.as_str())
        .join("video.bin");
    assert_eq!(tokio::fs::read(&merged).await.unwrap(), data);
    assert!(!server_dir.path().join("chunks").join(digest.as_str()).exists());

    let mut response = None;
    while let Ok(notification) = notifications.try_recv() {
        if let UploadNotification::Success { response: payload, .. } = notification {
            response = Some(payload);
        }
    }
    let response = response.expect("no success notification");
    assert_eq!(response["size"], 5 * MIB);
    assert_eq!(response["path"], format!("files/{digest}/video.bin"));
}

#[tokio::test]
async fn test_chunks_already_on_the_server_are_not_resent() {
    let server_dir = TempDir::new().unwrap();
    let client_dir = TempDir::new().unwrap();
    let (action, store) = spawn_server(server_dir.path(), HashAlgorithm::Md5).await;

    let data = payload(5 * MIB);
    let digest = StreamingHasher::digest_bytes(HashAlgorithm::Md5, &data);
    store
        .store_chunk(&digest, 0, &data[..2 * MIB as usize])
        .await
        .unwrap();
    store
        .store_chunk(&digest, 1, &data[2 * MIB as usize..4 * MIB as usize])
        .await
        .unwrap();

    let config = UploadConfig::new(action).with_chunk_size(2 * MIB);
    let transport = LossyTransport::new(&config, [0u32; 0]);
    let manager = UploadSessionManager::without_observer(config, transport.clone()).unwrap();

    let id = manager
        .submit(write_source(&client_dir, "video.bin", &data).await)
        .await
        .unwrap();
    assert_eq!(settle(&manager, id).await, UploadStatus::Success);

    assert_eq!(transport.uploads(), vec![2]);
    let merged = server_dir
        .path()
        .join("files")
        .join(digest.as_str())
        .join("video.bin");
    assert_eq!(tokio::fs::read(&merged).await.unwrap(), data);
}

#[tokio::test]
async fn test_lost_chunk_is_recovered_after_merge_conflict() {
    let server_dir = TempDir::new().unwrap();
    let client_dir = TempDir::new().unwrap();
    let (action, _store) = spawn_server(server_dir.path(), HashAlgorithm::Md5).await;

    let data = payload(5 * MIB);
    let digest = StreamingHasher::digest_bytes(HashAlgorithm::Md5, &data);

    let config = UploadConfig::new(action).with_chunk_size(2 * MIB);
    let transport = LossyTransport::new(&config, [1]);
    let manager = UploadSessionManager::without_observer(config, transport.clone()).unwrap();

    let id = manager
        .submit(write_source(&client_dir, "video.bin", &data).await)
        .await
        .unwrap();
    assert_eq!(settle(&manager, id).await, UploadStatus::Success);

    let uploads = transport.uploads();
    assert_eq!(uploads.len(), 4);
    assert_eq!(uploads.last().copied(), Some(1));

    let merged = server_dir
        .path()
        .join("files")
        .join(digest.as_str())
        .join("video.bin");
    assert_eq!(tokio::fs::read(&merged).await.unwrap(), data);
}

#[tokio::test]
async fn test_empty_file_with_blake3_digests() {
    let server_dir = TempDir::new().unwrap();
    let client_dir = TempDir::new().unwrap();
    let (action, _store) = spawn_server(server_dir.path(), HashAlgorithm::Blake3).await;

    let config = UploadConfig::new(action).with_hash_algorithm(HashAlgorithm::Blake3);
    let manager = UploadSessionManager::without_observer(
        config.clone(),
        Arc::new(HttpTransport::from_config(&config).unwrap()),
    )
    .unwrap();

    let id = manager
        .submit(write_source(&client_dir, "empty.txt", b"").await)
        .await
        .unwrap();
    assert_eq!(settle(&manager, id).await, UploadStatus::Success);

    let digest = StreamingHasher::digest_bytes(HashAlgorithm::Blake3, b"");
    let merged = server_dir
        .path()
        .join("files")
        .join(digest.as_str())
        .join("empty.txt");
    assert_eq!(tokio::fs::metadata(&merged).await.unwrap().len(), 0);
}

#[tokio::test]
async fn test_unreachable_server_fails_the_upload() {
    let client_dir = TempDir::new().unwrap();
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = UploadConfig::new(format!("http://{addr}/upload"))
        .with_request_timeout(Duration::from_secs(2));
    let (observer, mut notifications) = ChannelObserver::new();
    let manager = UploadSessionManager::with_http(config, Arc::new(observer)).unwrap();

    let id = manager
        .submit(write_source(&client_dir, "small.bin", &payload(1000)).await)
        .await
        .unwrap();
    assert_eq!(settle(&manager, id).await, UploadStatus::Error);

    let mut errors = 0;
    while let Ok(notification) = notifications.try_recv() {
        if matches!(notification, UploadNotification::Error { .. }) {
            errors += 1;
        }
    }
    assert_eq!(errors, 1);
}
