//! End-to-end: OS notifications through the debouncer to destinations

use cloudsync_dispatch::{Destination, DispatchEngine, LocalDirDestination, MemoryDestination, Target};
use cloudsync_watcher::{WatchOptions, Watcher};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;

const QUIET: Duration = Duration::from_millis(150);

/// A watch root whose own name is not hidden
fn watch_root() -> (TempDir, PathBuf) {
    let temp = tempfile::Builder::new().prefix("pipeline").tempdir().unwrap();
    let root = temp.path().canonicalize().unwrap();
    (temp, root)
}

fn start(
    root: &Path,
    targets: Vec<Target>,
) -> (Watcher, JoinHandle<cloudsync_dispatch::DispatchSummary>) {
    let options = WatchOptions {
        quiet_period: QUIET,
        ignore: vec!["*.tmp".to_string()],
    };
    let (mut watcher, events) = Watcher::new(root, options).unwrap();
    watcher.start();

    let engine = DispatchEngine::new(watcher.root(), targets);
    let run = tokio::spawn(async move { engine.run(events).await });
    (watcher, run)
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    condition()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_files_reach_every_destination() {
    let (_temp, root) = watch_root();
    let mirror = TempDir::new().unwrap();

    let memory = Arc::new(MemoryDestination::new("memory"));
    let local = Arc::new(LocalDirDestination::new("nas", mirror.path()).unwrap());
    let (mut watcher, run) = start(
        &root,
        vec![
            Target::new("remote/", Arc::clone(&memory) as Arc<dyn Destination>),
            Target::new("backup", Arc::clone(&local) as Arc<dyn Destination>),
        ],
    );

    fs::write(root.join("report.txt"), b"quarterly numbers").unwrap();
    fs::write(root.join(".report.txt.swp"), b"editor noise").unwrap();
    fs::write(root.join("draft.tmp"), b"scratch").unwrap();

    assert!(wait_until(|| memory.contains("remote/report.txt")).await);
    assert!(wait_until(|| mirror.path().join("backup/report.txt").is_file()).await);
    assert_eq!(
        fs::read(mirror.path().join("backup/report.txt")).unwrap(),
        b"quarterly numbers"
    );

    // Give filtered paths time to (not) show up
    tokio::time::sleep(QUIET * 4).await;
    watcher.stop().await;
    let summary = run.await.unwrap();

    for path in memory.paths() {
        assert!(!path.contains(".report.txt.swp"), "hidden file dispatched: {}", path);
        assert!(!path.ends_with(".tmp"), "ignored file dispatched: {}", path);
    }
    assert_eq!(summary.failed, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_new_directory_contents_are_synced() {
    let (_temp, root) = watch_root();
    let memory = Arc::new(MemoryDestination::new("memory"));
    let (mut watcher, run) = start(&root, vec![Target::new("r", Arc::clone(&memory) as Arc<dyn Destination>)]);

    fs::create_dir_all(root.join("albums/2024")).unwrap();
    fs::write(root.join("albums/2024/cover.jpg"), b"jpeg bytes").unwrap();

    assert!(wait_until(|| memory.contains("r/albums/2024/cover.jpg")).await);
    assert!(wait_until(|| memory.contains("r/albums/2024")).await);

    // Hidden directories are never watched, so nothing below them arrives
    fs::create_dir(root.join(".cache")).unwrap();
    fs::write(root.join(".cache/blob"), b"x").unwrap();
    tokio::time::sleep(QUIET * 4).await;
    assert!(!memory.paths().iter().any(|p| p.contains(".cache")));

    watcher.stop().await;
    run.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_removal_deletes_remote_copy() {
    let (_temp, root) = watch_root();
    let memory = Arc::new(MemoryDestination::new("memory"));
    let (mut watcher, run) = start(&root, vec![Target::new("r/", Arc::clone(&memory) as Arc<dyn Destination>)]);

    let file = root.join("notes.md");
    fs::write(&file, b"# notes").unwrap();
    assert!(wait_until(|| memory.contains("r/notes.md")).await);

    fs::remove_file(&file).unwrap();
    assert!(wait_until(|| !memory.contains("r/notes.md")).await);

    watcher.stop().await;
    let summary = run.await.unwrap();
    assert!(summary.deleted >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_lets_in_flight_dispatch_finish() {
    let (_temp, root) = watch_root();
    let slow = Arc::new(MemoryDestination::new("slow").with_latency(Duration::from_secs(1)));
    let (mut watcher, run) = start(&root, vec![Target::new("r", Arc::clone(&slow) as Arc<dyn Destination>)]);

    fs::write(root.join("big.iso"), b"pretend this is large").unwrap();

    // Past the quiet period, inside the destination's latency
    tokio::time::sleep(QUIET * 3).await;
    watcher.stop().await;

    // Arrives after stop
    fs::write(root.join("late.txt"), b"too late").unwrap();

    let summary = run.await.unwrap();
    assert_eq!(summary.events, 1);
    assert_eq!(summary.uploaded, 1);
    assert!(slow.contains("r/big.iso"));
    assert!(!slow.contains("r/late.txt"));
}
