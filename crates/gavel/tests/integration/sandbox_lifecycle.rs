use gavel::SlotPool;
use gavel::sandbox::{META_FILE, STDERR_FILE, STDIN_FILE, STDOUT_FILE};

use super::test_config;

#[tokio::test]
#[ignore = "requires isolate and root"]
async fn acquire_stage_release() {
    let config = test_config();
    let pool = SlotPool::new(90, 1, config.isolate_binary(), config.cgroup);

    let mut sandbox = pool.acquire().await.unwrap();
    assert!(sandbox.path().exists());

    sandbox.stage("main.txt", b"hello").await.unwrap();
    for name in ["main.txt", STDIN_FILE, STDOUT_FILE, STDERR_FILE, META_FILE] {
        assert!(sandbox.file_exists(name).await.unwrap(), "missing {name}");
    }
    assert_eq!(sandbox.read_file("main.txt").await.unwrap(), b"hello");

    sandbox.release().await.unwrap();
    // Idempotent: a second release is a no-op
    sandbox.release().await.unwrap();
}

#[tokio::test]
#[ignore = "requires isolate and root"]
async fn slot_is_reusable_after_release() {
    let config = test_config();
    let pool = SlotPool::new(91, 1, config.isolate_binary(), config.cgroup);

    let mut first = pool.acquire().await.unwrap();
    let slot = first.id();
    first.release().await.unwrap();
    drop(first);

    let mut second = pool.acquire().await.unwrap();
    assert_eq!(second.id(), slot);
    second.release().await.unwrap();
}

#[tokio::test]
#[ignore = "requires isolate and root"]
async fn concurrent_jobs_use_distinct_boxes() {
    let config = test_config();
    let pool = SlotPool::new(92, 2, config.isolate_binary(), config.cgroup);

    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();

    assert_ne!(a.id(), b.id());
    assert_ne!(a.path(), b.path());

    let mut a = a;
    let mut b = b;
    a.release().await.unwrap();
    b.release().await.unwrap();
}
