//! Session semantics of the proxy over an in-process store
//!
//! These tests drive the filesystem calls directly against a `Store`
//! rooted in a temp directory, so no sockets are involved.

use std::path::PathBuf;
use std::sync::Arc;

use common::{ErrorKind, OpenIntent, MAX_TRANSFER_SIZE};
use store::{Store, StoreConfig};
use tempfile::TempDir;

use ferry_daemon::cache::{CacheKey, NamespacedPath};
use ferry_daemon::proxy::{Whence, FIRST_FD};
use ferry_daemon::{Proxy, ProxyOptions};

struct Harness {
    proxy: Proxy,
    store: Arc<Store>,
    _dir: TempDir,
}

impl Harness {
    fn root(&self) -> PathBuf {
        self.store.root().to_path_buf()
    }

    async fn read_all(&self, path: &str) -> Vec<u8> {
        let fd = self.proxy.open(path, OpenIntent::Read).await.unwrap();
        let mut out = Vec::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = self.proxy.read(fd, &mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        self.proxy.close(fd).await.unwrap();
        out
    }

    async fn write_all(&self, path: &str, intent: OpenIntent, data: &[u8]) {
        let fd = self.proxy.open(path, intent).await.unwrap();
        assert_eq!(self.proxy.write(fd, data).await.unwrap(), data.len());
        self.proxy.close(fd).await.unwrap();
    }
}

async fn setup(cache_capacity: u64, max_open_files: usize) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(
        Store::new(StoreConfig::under(&dir.path().join("store")))
            .await
            .unwrap(),
    );
    let proxy = Proxy::new(
        store.clone(),
        ProxyOptions {
            cache_dir: dir.path().join("cache"),
            cache_capacity,
            max_open_files,
        },
    )
    .await
    .unwrap();

    Harness {
        proxy,
        store,
        _dir: dir,
    }
}

async fn default_setup() -> Harness {
    setup(16 * 1024 * 1024, 64).await
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 253) as u8).collect()
}

fn read_only_key(proxy: &Proxy, path: &str) -> CacheKey {
    let ns = NamespacedPath::new(path);
    let version = proxy.cache().current_version(&ns).unwrap();
    CacheKey::read_only(ns, version)
}

#[tokio::test]
async fn test_create_write_close_then_read_back() {
    let h = default_setup().await;
    std::fs::create_dir(h.root().join("a")).unwrap();

    let fd = h.proxy.open("/a/b.txt", OpenIntent::Create).await.unwrap();
    assert_eq!(fd, FIRST_FD);
    assert_eq!(h.proxy.write(fd, b"hello").await.unwrap(), 5);
    h.proxy.close(fd).await.unwrap();
    assert_eq!(std::fs::read(h.root().join("a/b.txt")).unwrap(), b"hello");

    let fd = h.proxy.open("/a/b.txt", OpenIntent::Read).await.unwrap();
    assert_eq!(fd, FIRST_FD + 1);
    let mut buf = [0u8; 5];
    assert_eq!(h.proxy.read(fd, &mut buf).await.unwrap(), 5);
    assert_eq!(&buf, b"hello");
    h.proxy.close(fd).await.unwrap();
}

#[tokio::test]
async fn test_open_missing_leaves_table_unchanged() {
    let h = default_setup().await;

    let err = h
        .proxy
        .open("/missing.txt", OpenIntent::Read)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(h.proxy.descriptors().is_empty());
    assert_eq!(h.proxy.cache().stats().entries, 0);

    std::fs::write(h.root().join("present.txt"), b"x").unwrap();
    let fd = h.proxy.open("/present.txt", OpenIntent::Read).await.unwrap();
    assert_eq!(fd, FIRST_FD);
}

#[tokio::test]
async fn test_concurrent_readers_share_one_copy() {
    let h = default_setup().await;
    std::fs::write(h.root().join("shared.txt"), b"shared bytes").unwrap();

    let (a, b) = tokio::join!(
        h.proxy.open("/shared.txt", OpenIntent::Read),
        h.proxy.open("/shared.txt", OpenIntent::Read)
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a, b);

    let key = read_only_key(&h.proxy, "/shared.txt");
    assert_eq!(h.proxy.cache().refs(&key), Some(2));
    assert_eq!(h.proxy.cache().stats().entries, 1);

    let mut buf_a = [0u8; 32];
    let mut buf_b = [0u8; 32];
    let n_a = h.proxy.read(a, &mut buf_a).await.unwrap();
    let n_b = h.proxy.read(b, &mut buf_b).await.unwrap();
    assert_eq!(&buf_a[..n_a], b"shared bytes");
    assert_eq!(&buf_a[..n_a], &buf_b[..n_b]);

    h.proxy.close(a).await.unwrap();
    assert_eq!(h.proxy.cache().refs(&key), Some(1));
    h.proxy.close(b).await.unwrap();
    assert_eq!(h.proxy.cache().refs(&key), Some(0));
}

#[tokio::test]
async fn test_unlink_directory_is_refused() {
    let h = default_setup().await;
    std::fs::create_dir(h.root().join("dir")).unwrap();
    std::fs::write(h.root().join("dir/inner.txt"), b"keep").unwrap();

    let err = h.proxy.unlink("/dir").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IsDirectory);
    assert!(h.root().join("dir/inner.txt").exists());
}

#[tokio::test]
async fn test_unlink_file() {
    let h = default_setup().await;
    std::fs::write(h.root().join("gone.txt"), b"bye").unwrap();
    assert_eq!(h.read_all("/gone.txt").await, b"bye");

    h.proxy.unlink("/gone.txt").await.unwrap();
    assert!(!h.root().join("gone.txt").exists());

    let err = h.proxy.open("/gone.txt", OpenIntent::Read).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = h.proxy.unlink("/gone.txt").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_open_reader_keeps_its_version() {
    let h = default_setup().await;
    std::fs::write(h.root().join("s.txt"), b"old").unwrap();

    let reader = h.proxy.open("/s.txt", OpenIntent::Read).await.unwrap();
    h.write_all("/s.txt", OpenIntent::Write, b"new").await;
    assert_eq!(std::fs::read(h.root().join("s.txt")).unwrap(), b"new");

    let mut buf = [0u8; 8];
    let n = h.proxy.read(reader, &mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"old");
    h.proxy.close(reader).await.unwrap();

    assert_eq!(h.read_all("/s.txt").await, b"new");
    // The superseded copy goes once its last reader closes.
    assert_eq!(h.proxy.cache().stats().entries, 1);
}

#[tokio::test]
async fn test_write_sessions_are_isolated_and_last_close_wins() {
    let h = default_setup().await;
    std::fs::write(h.root().join("w.txt"), b"base").unwrap();

    let first = h.proxy.open("/w.txt", OpenIntent::Write).await.unwrap();
    let second = h.proxy.open("/w.txt", OpenIntent::Write).await.unwrap();

    h.proxy.write(first, b"1111").await.unwrap();

    let mut buf = [0u8; 4];
    assert_eq!(h.proxy.read(second, &mut buf).await.unwrap(), 4);
    assert_eq!(&buf, b"base");
    h.proxy.lseek(second, 0, Whence::Set).await.unwrap();
    h.proxy.write(second, b"2222").await.unwrap();

    h.proxy.close(first).await.unwrap();
    assert_eq!(std::fs::read(h.root().join("w.txt")).unwrap(), b"1111");
    h.proxy.close(second).await.unwrap();
    assert_eq!(std::fs::read(h.root().join("w.txt")).unwrap(), b"2222");

    assert_eq!(h.read_all("/w.txt").await, b"2222");
}

#[tokio::test]
async fn test_readers_see_committed_bytes_while_a_write_is_open() {
    let h = default_setup().await;
    h.write_all("/iso.txt", OpenIntent::Create, b"base").await;
    // Warm the cache so the writer starts from the cached copy.
    assert_eq!(h.read_all("/iso.txt").await, b"base");

    let writer = h.proxy.open("/iso.txt", OpenIntent::Write).await.unwrap();
    assert_eq!(h.proxy.write(writer, b"next").await.unwrap(), 4);

    let reader = h.proxy.open("/iso.txt", OpenIntent::Read).await.unwrap();
    let mut buf = [0u8; 8];
    let n = h.proxy.read(reader, &mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"base");
    assert_eq!(h.read_all("/iso.txt").await, b"base");

    h.proxy.close(writer).await.unwrap();
    assert_eq!(h.read_all("/iso.txt").await, b"next");

    // The reader opened before the commit stays on its version.
    h.proxy.lseek(reader, 0, Whence::Set).await.unwrap();
    let n = h.proxy.read(reader, &mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"base");
    h.proxy.close(reader).await.unwrap();
    assert_eq!(h.read_all("/iso.txt").await, b"next");
}

#[tokio::test]
async fn test_long_paths_fit_in_the_cache_directory() {
    let h = default_setup().await;
    let dir = "a".repeat(100);
    std::fs::create_dir(h.root().join(&dir)).unwrap();
    let nested = format!("/{dir}/{}", "b".repeat(150));
    std::fs::write(h.root().join(&nested[1..]), b"deep").unwrap();
    let wide = format!("/{}", "文".repeat(80));
    std::fs::write(h.root().join(&wide[1..]), b"wide").unwrap();

    assert_eq!(h.read_all(&nested).await, b"deep");
    assert_eq!(h.read_all(&wide).await, b"wide");

    h.write_all(&nested, OpenIntent::Write, b"deeper").await;
    assert_eq!(std::fs::read(h.root().join(&nested[1..])).unwrap(), b"deeper");
    assert_eq!(h.read_all(&nested).await, b"deeper");

    let key = read_only_key(&h.proxy, &nested);
    assert!(h.proxy.cache().local_path(&key).exists());
    assert_eq!(h.proxy.cache().stats().entries, 2);
}

#[tokio::test]
async fn test_versions_increase_with_each_write_back() {
    let h = default_setup().await;
    let ns = NamespacedPath::new("/v.txt");

    let mut last = None;
    for round in 0..3u8 {
        h.write_all("/v.txt", OpenIntent::Create, &[b'a' + round]).await;
        let version = h.proxy.cache().current_version(&ns).unwrap();
        if let Some(previous) = last {
            assert!(version > previous);
        }
        last = Some(version);
    }
    assert_eq!(h.proxy.cache().stats().entries, 1);
}

#[tokio::test]
async fn test_large_file_transfers_in_chunks() {
    let h = default_setup().await;
    let content = pattern(1_000_000);
    assert!(content.len() > 2 * MAX_TRANSFER_SIZE);
    std::fs::write(h.root().join("big.bin"), &content).unwrap();

    assert_eq!(h.read_all("/big.bin").await, content);

    let fd = h.proxy.open("/copy.bin", OpenIntent::Create).await.unwrap();
    for chunk in content.chunks(300_000) {
        h.proxy.write(fd, chunk).await.unwrap();
    }
    h.proxy.close(fd).await.unwrap();

    assert_eq!(std::fs::read(h.root().join("copy.bin")).unwrap(), content);
    assert_eq!(h.read_all("/copy.bin").await, content);
    let staged = std::fs::read_dir(h._dir.path().join("store/staging"))
        .unwrap()
        .count();
    assert_eq!(staged, 0);
}

#[tokio::test]
async fn test_unpinned_entries_are_evicted() {
    let h = setup(10, 8).await;
    std::fs::write(h.root().join("a.txt"), b"aaaaaa").unwrap();
    std::fs::write(h.root().join("b.txt"), b"bbbbbb").unwrap();

    assert_eq!(h.read_all("/a.txt").await, b"aaaaaa");
    let a_key = read_only_key(&h.proxy, "/a.txt");
    let a_local = h.proxy.cache().local_path(&a_key);
    assert!(a_local.exists());

    assert_eq!(h.read_all("/b.txt").await, b"bbbbbb");
    assert!(!h.proxy.cache().contains(&a_key));
    assert!(!a_local.exists());
    assert!(h.proxy.cache().used() <= 10);
}

#[tokio::test]
async fn test_pinned_entries_make_cache_full() {
    let h = setup(10, 8).await;
    std::fs::write(h.root().join("a.txt"), b"aaaaaa").unwrap();
    std::fs::write(h.root().join("b.txt"), b"bbbbbb").unwrap();

    let held = h.proxy.open("/a.txt", OpenIntent::Read).await.unwrap();
    let err = h.proxy.open("/b.txt", OpenIntent::Read).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CacheFull);
    assert_eq!(h.proxy.descriptors().len(), 1);
    assert_eq!(h.proxy.cache().used(), 6);

    h.proxy.close(held).await.unwrap();
    assert_eq!(h.read_all("/b.txt").await, b"bbbbbb");
}

#[tokio::test]
async fn test_write_past_capacity_leaves_copy_untouched() {
    let h = setup(10, 8).await;

    let fd = h.proxy.open("/grow.txt", OpenIntent::Create).await.unwrap();
    h.proxy.write(fd, b"12345").await.unwrap();
    let err = h.proxy.write(fd, &[b'x'; 20]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CacheFull);

    h.proxy.close(fd).await.unwrap();
    assert_eq!(std::fs::read(h.root().join("grow.txt")).unwrap(), b"12345");
}

#[tokio::test]
async fn test_descriptor_limit() {
    let h = setup(1024, 2).await;
    std::fs::write(h.root().join("f.txt"), b"f").unwrap();

    let a = h.proxy.open("/f.txt", OpenIntent::Read).await.unwrap();
    let _b = h.proxy.open("/f.txt", OpenIntent::Read).await.unwrap();
    let err = h.proxy.open("/f.txt", OpenIntent::Read).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TooManyOpenFiles);

    h.proxy.close(a).await.unwrap();
    h.proxy.open("/f.txt", OpenIntent::Read).await.unwrap();
}

#[tokio::test]
async fn test_bad_descriptors() {
    let h = default_setup().await;
    std::fs::write(h.root().join("r.txt"), b"read only").unwrap();
    let mut buf = [0u8; 4];

    let err = h.proxy.read(99, &mut buf).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadDescriptor);
    let err = h.proxy.close(99).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadDescriptor);

    let fd = h.proxy.open("/r.txt", OpenIntent::Read).await.unwrap();
    let err = h.proxy.write(fd, b"nope").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadDescriptor);

    h.proxy.close(fd).await.unwrap();
    let err = h.proxy.close(fd).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadDescriptor);
    assert_eq!(std::fs::read(h.root().join("r.txt")).unwrap(), b"read only");
}

#[tokio::test]
async fn test_lseek() {
    let h = default_setup().await;
    std::fs::write(h.root().join("seek.txt"), b"0123456789").unwrap();
    let fd = h.proxy.open("/seek.txt", OpenIntent::Read).await.unwrap();

    let err = h.proxy.lseek(fd, -1, Whence::Set).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert_eq!(h.proxy.lseek(fd, 0, Whence::End).await.unwrap(), 10);
    assert_eq!(h.proxy.lseek(fd, 4, Whence::Set).await.unwrap(), 4);
    assert_eq!(h.proxy.lseek(fd, 2, Whence::Current).await.unwrap(), 6);

    let mut buf = [0u8; 8];
    let n = h.proxy.read(fd, &mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"6789");
    h.proxy.close(fd).await.unwrap();
}

#[tokio::test]
async fn test_directory_descriptors() {
    let h = default_setup().await;
    std::fs::create_dir(h.root().join("d")).unwrap();

    let fd = h.proxy.open("/d", OpenIntent::Read).await.unwrap();
    let mut buf = [0u8; 4];
    let err = h.proxy.read(fd, &mut buf).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IsDirectory);
    h.proxy.close(fd).await.unwrap();

    let err = h.proxy.open("/d", OpenIntent::Write).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IsDirectory);
    assert_eq!(h.proxy.cache().stats().entries, 0);
}

#[tokio::test]
async fn test_exclusive_create() {
    let h = default_setup().await;
    std::fs::write(h.root().join("taken.txt"), b"x").unwrap();

    let err = h
        .proxy
        .open("/taken.txt", OpenIntent::CreateExclusive)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    h.write_all("/fresh.txt", OpenIntent::CreateExclusive, b"mine")
        .await;
    assert_eq!(std::fs::read(h.root().join("fresh.txt")).unwrap(), b"mine");
}
