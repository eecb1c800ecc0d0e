//! End-to-end tests over real sockets: a store server, a proxy server
//! talking to it over HTTP, and a client driving the proxy.

use std::net::SocketAddr;

use common::{ErrorKind, OpenIntent, RemoteStore, Version, MAX_TRANSFER_SIZE};
use tempfile::TempDir;
use url::Url;

use ferry_daemon::http_server::api::client::ApiClient;
use ferry_daemon::http_server::api::v0::cache::CacheStatsRequest;
use ferry_daemon::http_server::api::v0::fs::{
    FsCloseRequest, FsOpenRequest, FsReadRequest, FsUnlinkRequest, FsWriteRequest, LseekRequest,
};
use ferry_daemon::http_server::health::liveness::{Liveness, LivezRequest};
use ferry_daemon::http_server::health::version::VersionRequest;
use ferry_daemon::proxy::{Whence, FIRST_FD};
use ferry_daemon::{
    spawn_proxy, spawn_store, BuildInfo, HttpStore, ProxyConfig, RunningService, ShutdownHandle,
    StoreConfig,
};

struct Cluster {
    store: RunningService,
    proxy: RunningService,
    shutdown: ShutdownHandle,
    root: std::path::PathBuf,
    _dir: TempDir,
}

impl Cluster {
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let any_port: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let shutdown = ShutdownHandle::new();

        let store_config = StoreConfig {
            listen_addr: any_port,
            root: dir.path().join("root"),
            staging: dir.path().join("staging"),
        };
        let store = spawn_store(&store_config, shutdown.clone()).await.unwrap();

        let proxy_config = ProxyConfig {
            listen_addr: any_port,
            store_url: url(store.addr),
            cache_dir: dir.path().join("cache"),
            cache_capacity: 16 * 1024 * 1024,
            max_open_files: 16,
        };
        let proxy = spawn_proxy(&proxy_config, shutdown.clone()).await.unwrap();

        Self {
            store,
            proxy,
            shutdown,
            root: store_config.root,
            _dir: dir,
        }
    }

    fn client(&self) -> ApiClient {
        ApiClient::new(&url(self.proxy.addr)).unwrap()
    }

    async fn stop(self) {
        self.shutdown.shutdown();
        self.store.wait().await.unwrap();
        self.proxy.wait().await.unwrap();
    }
}

fn url(addr: SocketAddr) -> Url {
    Url::parse(&format!("http://{addr}")).unwrap()
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 241) as u8).collect()
}

#[tokio::test]
async fn test_fs_calls_through_both_servers() {
    let cluster = Cluster::start().await;
    let client = cluster.client();

    let fd = client
        .call(FsOpenRequest {
            path: "/hello.txt".into(),
            intent: OpenIntent::Create,
        })
        .await
        .unwrap()
        .into_result()
        .unwrap()
        .fd;
    assert_eq!(fd, FIRST_FD);

    let written = client
        .call(FsWriteRequest {
            fd,
            data: b"hello over http".to_vec(),
        })
        .await
        .unwrap()
        .into_result()
        .unwrap()
        .written;
    assert_eq!(written, 15);

    let closed = client
        .call(FsCloseRequest { fd })
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(closed.closed, fd);
    assert_eq!(
        std::fs::read(cluster.root.join("hello.txt")).unwrap(),
        b"hello over http"
    );

    let fd = client
        .call(FsOpenRequest {
            path: "/hello.txt".into(),
            intent: OpenIntent::Read,
        })
        .await
        .unwrap()
        .into_result()
        .unwrap()
        .fd;
    let position = client
        .call(LseekRequest {
            fd,
            offset: 6,
            whence: Whence::Set,
        })
        .await
        .unwrap()
        .into_result()
        .unwrap()
        .position;
    assert_eq!(position, 6);

    let chunk = client
        .call(FsReadRequest { fd, len: 64 })
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(chunk.size, 9);
    assert_eq!(chunk.data, b"over http");

    let stats = client
        .call(CacheStatsRequest { entries: true })
        .await
        .unwrap();
    assert_eq!(stats.stats.open_descriptors, 1);
    assert_eq!(stats.stats.cache.entries, 1);
    let entries = stats.entries.unwrap();
    assert_eq!(entries[0].path, "/hello.txt");
    assert_eq!(entries[0].refs, 1);
    assert_eq!(entries[0].size, 15);

    client
        .call(FsCloseRequest { fd })
        .await
        .unwrap()
        .into_result()
        .unwrap();

    cluster.stop().await;
}

#[tokio::test]
async fn test_failures_carry_errno() {
    let cluster = Cluster::start().await;
    let client = cluster.client();
    std::fs::create_dir(cluster.root.join("dir")).unwrap();

    let failure = client
        .call(FsOpenRequest {
            path: "/missing.txt".into(),
            intent: OpenIntent::Read,
        })
        .await
        .unwrap()
        .into_result()
        .unwrap_err();
    assert_eq!(failure.kind, ErrorKind::NotFound);
    assert_eq!(failure.errno, -ErrorKind::NotFound.errno());

    let failure = client
        .call(FsUnlinkRequest {
            path: "/dir".into(),
        })
        .await
        .unwrap()
        .into_result()
        .unwrap_err();
    assert_eq!(failure.kind, ErrorKind::IsDirectory);
    assert!(cluster.root.join("dir").is_dir());

    let failure = client
        .call(FsCloseRequest { fd: 42 })
        .await
        .unwrap()
        .into_result()
        .unwrap_err();
    assert_eq!(failure.kind, ErrorKind::BadDescriptor);

    cluster.stop().await;
}

#[tokio::test]
async fn test_large_write_back_over_http() {
    let cluster = Cluster::start().await;
    let client = cluster.client();
    let content = pattern(1_000_000);

    let fd = client
        .call(FsOpenRequest {
            path: "/big.bin".into(),
            intent: OpenIntent::Create,
        })
        .await
        .unwrap()
        .into_result()
        .unwrap()
        .fd;
    for chunk in content.chunks(MAX_TRANSFER_SIZE) {
        client
            .call(FsWriteRequest {
                fd,
                data: chunk.to_vec(),
            })
            .await
            .unwrap()
            .into_result()
            .unwrap();
    }
    client
        .call(FsCloseRequest { fd })
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(std::fs::read(cluster.root.join("big.bin")).unwrap(), content);

    // A fresh view of the store sees the same bytes in bounded chunks.
    let remote = HttpStore::new(&url(cluster.store.addr)).unwrap();
    let reply = remote
        .open("/big.bin", OpenIntent::Read, Version::NONE)
        .await
        .unwrap();
    let snapshot = reply.snapshot.unwrap();
    assert_eq!(snapshot.total_len, 1_000_000);
    assert_eq!(snapshot.data.len(), MAX_TRANSFER_SIZE);

    let mut fetched = snapshot.data;
    while (fetched.len() as u64) < snapshot.total_len {
        let chunk = remote.read("/big.bin", fetched.len() as u64).await.unwrap();
        assert!(chunk.size() <= MAX_TRANSFER_SIZE);
        fetched.extend_from_slice(&chunk.data);
    }
    assert_eq!(fetched, content);

    cluster.stop().await;
}

#[tokio::test]
async fn test_store_errors_cross_the_wire() {
    let cluster = Cluster::start().await;
    std::fs::create_dir(cluster.root.join("dir")).unwrap();
    let remote = HttpStore::new(&url(cluster.store.addr)).unwrap();

    let err = remote.unlink("/dir").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::IsDirectory);

    let err = remote.read("/nope.txt", 0).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let reply = remote
        .open("/nope.txt", OpenIntent::Read, Version::NONE)
        .await
        .unwrap();
    assert!(!reply.exists);

    cluster.stop().await;
}

#[tokio::test]
async fn test_status_endpoints() {
    let cluster = Cluster::start().await;

    for addr in [cluster.store.addr, cluster.proxy.addr] {
        let client = ApiClient::new(&url(addr)).unwrap();
        let livez = client.call(LivezRequest {}).await.unwrap();
        assert_eq!(livez.status, Liveness::Ok);

        let build = client.call(VersionRequest {}).await.unwrap();
        assert_eq!(build, BuildInfo::current());
    }

    cluster.stop().await;
}
