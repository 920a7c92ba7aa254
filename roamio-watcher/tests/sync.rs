//! End-to-end tests: watch set, enumeration and reconciliation together.

use notify::event::{CreateKind, Flag, RemoveKind};
use notify::{Event, EventKind};
use roamio_core::{RecordKind, RegistrationPolicy, WorkspaceSettings};
use roamio_index::{IndexStore, JsonIndexStore, LoadState};
use roamio_watcher::{
    enumerate, EnumerateError, EnumerateOptions, Notifier, ReconcileError, Reconciler,
    WatchContext, WatchError,
};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::mpsc;

/// Accepts every watch except paths containing "locked".
struct FakeNotifier;

impl Notifier for FakeNotifier {
    fn watch(&mut self, dir: &Path) -> notify::Result<()> {
        if dir.to_string_lossy().contains("locked") {
            return Err(notify::Error::generic("permission denied"));
        }
        Ok(())
    }

    fn unwatch(&mut self, _dir: &Path) -> notify::Result<()> {
        Ok(())
    }
}

fn settings(root: &Path) -> WorkspaceSettings {
    let root = root.canonicalize().unwrap();
    WorkspaceSettings {
        index_path: root.join(".index.cache"),
        root,
        name: "test".into(),
        extension: "norg".into(),
        workers: 4,
        scan_timeout: Duration::from_secs(5),
        policy: RegistrationPolicy::Abort,
    }
}

struct Harness {
    context: WatchContext,
    listener: Option<roamio_watcher::ChangeListener>,
    events: mpsc::UnboundedSender<Event>,
    errors: mpsc::UnboundedSender<notify::Error>,
}

fn harness(settings: &WorkspaceSettings) -> Harness {
    let (events, event_rx) = mpsc::unbounded_channel();
    let (errors, error_rx) = mpsc::unbounded_channel();
    let (context, listener) =
        WatchContext::with_notifier(settings, FakeNotifier, event_rx, error_rx).unwrap();
    Harness {
        context,
        listener: Some(listener),
        events,
        errors,
    }
}

fn ids(store: &JsonIndexStore) -> Vec<String> {
    store.list().into_iter().map(|r| r.id.clone()).collect()
}

#[tokio::test]
async fn test_scenario_first_run_then_delete() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("sub")).unwrap();
    fs::write(root.join("a.norg"), "@document.meta\ntitle: Alpha\n@end\n").unwrap();
    fs::write(root.join("sub/b.norg"), "@document.meta\ntitle: Beta\n@end\n").unwrap();

    let settings = settings(root);
    let h = harness(&settings);
    let reconciler = Reconciler::new(&settings.root);

    let mut store = JsonIndexStore::new(&settings.index_path);
    let report = reconciler.reconcile(&h.context, &mut store).await.unwrap();
    assert_eq!(report.load_state, LoadState::Created);
    assert_eq!(ids(&store), vec!["a.norg", "sub/b.norg"]);

    let alpha = store.get("a.norg").unwrap();
    assert_eq!(alpha.title, "Alpha");
    assert_eq!(alpha.kind, RecordKind::File);
    assert_eq!(alpha.line, 1);

    fs::remove_file(root.join("a.norg")).unwrap();

    let mut store = JsonIndexStore::new(&settings.index_path);
    let report = reconciler.reconcile(&h.context, &mut store).await.unwrap();
    assert_eq!(report.evicted, 1);
    assert_eq!(ids(&store), vec!["sub/b.norg"]);
}

#[tokio::test]
async fn test_half_written_note_is_indexed() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.norg"), "@document.meta\ntitle: Alpha\n").unwrap();

    let settings = settings(dir.path());
    let h = harness(&settings);
    let mut store = JsonIndexStore::new(&settings.index_path);
    let report = Reconciler::new(&settings.root)
        .reconcile(&h.context, &mut store)
        .await
        .unwrap();

    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert_eq!(report.inserted, 1);
    assert_eq!(store.get("a.norg").unwrap().title, "Alpha");
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    for sub in ["x", "y/z"] {
        fs::create_dir_all(root.join(sub)).unwrap();
        fs::write(root.join(sub).join("n.norg"), "title: N\n").unwrap();
    }

    let settings = settings(root);
    let h = harness(&settings);
    let reconciler = Reconciler::new(&settings.root);

    reconciler
        .reconcile(&h.context, &mut JsonIndexStore::new(&settings.index_path))
        .await
        .unwrap();
    let first = fs::read(&settings.index_path).unwrap();

    let report = reconciler
        .reconcile(&h.context, &mut JsonIndexStore::new(&settings.index_path))
        .await
        .unwrap();
    let second = fs::read(&settings.index_path).unwrap();

    assert_eq!(report.inserted, 0);
    assert_eq!(report.evicted, 0);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_hidden_subtree_never_indexed() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join(".archive/deep")).unwrap();
    fs::write(root.join(".archive/note.norg"), "").unwrap();
    fs::write(root.join(".archive/deep/old.norg"), "").unwrap();
    fs::write(root.join("kept.norg"), "").unwrap();

    let settings = settings(root);
    let h = harness(&settings);
    assert!(!h.context.is_watched(&settings.root.join(".archive")));

    let mut store = JsonIndexStore::new(&settings.index_path);
    Reconciler::new(&settings.root)
        .reconcile(&h.context, &mut store)
        .await
        .unwrap();
    assert_eq!(ids(&store), vec!["kept.norg"]);
}

#[tokio::test]
async fn test_enumerate_returns_exact_union() {
    let dir = tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let mut expected = BTreeSet::new();
    let mut dirs = Vec::new();

    for name in ["A", "B", "C"] {
        let sub = root.join(name);
        fs::create_dir_all(&sub).unwrap();
        for i in 0..20 {
            fs::write(sub.join(format!("{}{}.norg", name, i)), "").unwrap();
            expected.insert(format!("{}/{}{}.norg", name, name, i));
        }
        fs::write(sub.join("skip.txt"), "").unwrap();
        dirs.push(sub);
    }

    for workers in [1, 3, 16] {
        let options = EnumerateOptions {
            workers,
            ..EnumerateOptions::default()
        };
        let files = enumerate(dirs.clone(), &root, &options).await.unwrap();
        assert_eq!(files, expected, "workers = {}", workers);
    }
}

#[tokio::test]
async fn test_enumerate_fails_on_unreadable_directory() {
    let dir = tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    fs::write(root.join("a.norg"), "").unwrap();

    let dirs = vec![root.clone(), root.join("vanished")];
    let err = enumerate(dirs, &root, &EnumerateOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EnumerateError::ReadDir { .. }));
}

#[tokio::test]
async fn test_failed_enumeration_leaves_index_untouched() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("sub")).unwrap();
    fs::write(root.join("sub/b.norg"), "").unwrap();

    let settings = settings(root);
    let h = harness(&settings);
    let reconciler = Reconciler::new(&settings.root);
    reconciler
        .reconcile(&h.context, &mut JsonIndexStore::new(&settings.index_path))
        .await
        .unwrap();
    let before = fs::read(&settings.index_path).unwrap();

    // Still in the watch set, gone from disk: the listener hasn't caught up.
    fs::remove_dir_all(root.join("sub")).unwrap();
    let err = reconciler
        .reconcile(&h.context, &mut JsonIndexStore::new(&settings.index_path))
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Enumerate(_)));
    assert_eq!(before, fs::read(&settings.index_path).unwrap());
}

#[tokio::test]
async fn test_listener_tracks_created_and_removed_directories() {
    let dir = tempdir().unwrap();
    let settings = settings(dir.path());
    let mut h = harness(&settings);
    let listener = h.listener.take().unwrap();
    let mut changes = listener.subscribe();
    let handle = tokio::spawn(listener.run());

    let fresh = settings.root.join("fresh");
    fs::create_dir_all(fresh.join("inner")).unwrap();
    fs::write(fresh.join("new.norg"), "").unwrap();
    h.events
        .send(Event::new(EventKind::Create(CreateKind::Folder)).add_path(fresh.clone()))
        .unwrap();
    changes.changed().await.unwrap();

    assert!(h.context.is_watched(&fresh));
    assert!(h.context.is_watched(&fresh.join("inner")));
    let files = h.context.enumerate().await.unwrap();
    assert!(files.contains("fresh/new.norg"));

    // Errors are logged, not fatal.
    h.errors.send(notify::Error::generic("overflow")).unwrap();

    fs::remove_dir_all(&fresh).unwrap();
    h.events
        .send(Event::new(EventKind::Remove(RemoveKind::Folder)).add_path(fresh.clone()))
        .unwrap();
    changes.changed().await.unwrap();

    assert!(!h.context.is_watched(&fresh));
    assert!(!h.context.is_watched(&fresh.join("inner")));
    assert_eq!(h.context.watch_count(), 1);

    drop(h.events);
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_registration_failure_aborts_listener_by_default() {
    let dir = tempdir().unwrap();
    let settings = settings(dir.path());
    let mut h = harness(&settings);
    let listener = h.listener.take().unwrap();
    let handle = tokio::spawn(listener.run());

    let locked = settings.root.join("locked");
    fs::create_dir_all(&locked).unwrap();
    h.events
        .send(Event::new(EventKind::Create(CreateKind::Folder)).add_path(locked))
        .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(WatchError::Notify { .. })));
}

#[tokio::test]
async fn test_registration_failure_skipped_when_configured() {
    let dir = tempdir().unwrap();
    let mut settings = settings(dir.path());
    settings.policy = RegistrationPolicy::Skip;
    let mut h = harness(&settings);
    let listener = h.listener.take().unwrap();
    let mut changes = listener.subscribe();
    let handle = tokio::spawn(listener.run());

    let locked = settings.root.join("locked");
    fs::create_dir_all(&locked).unwrap();
    h.events
        .send(Event::new(EventKind::Create(CreateKind::Folder)).add_path(locked.clone()))
        .unwrap();
    changes.changed().await.unwrap();

    assert!(!h.context.is_watched(&locked));
    assert!(!handle.is_finished());

    h.context.shutdown();
    drop(h.events);
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_rescan_catches_up_after_dropped_events() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("stale")).unwrap();
    let settings = settings(dir.path());
    let mut h = harness(&settings);
    let listener = h.listener.take().unwrap();
    let mut changes = listener.subscribe();
    let handle = tokio::spawn(listener.run());

    let stale = settings.root.join("stale");
    let missed = settings.root.join("missed");
    assert!(h.context.is_watched(&stale));

    // Neither change is reported; only the overflow marker arrives.
    fs::remove_dir_all(&stale).unwrap();
    fs::create_dir_all(missed.join("inner")).unwrap();
    fs::write(missed.join("inner/late.norg"), "").unwrap();
    h.events
        .send(Event::new(EventKind::Other).set_flag(Flag::Rescan))
        .unwrap();
    changes.changed().await.unwrap();

    assert!(h.context.is_watched(&missed));
    assert!(h.context.is_watched(&missed.join("inner")));
    assert!(!h.context.is_watched(&stale));
    let files = h.context.enumerate().await.unwrap();
    assert!(files.contains("missed/inner/late.norg"));

    drop(h.events);
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlinked_directory_matches_startup_view() {
    let dir = tempdir().unwrap();
    let base = dir.path().canonicalize().unwrap();
    let outside = base.join("outside");
    fs::create_dir_all(base.join("ws")).unwrap();
    fs::create_dir_all(outside.join("deep")).unwrap();
    fs::write(outside.join("deep/x.norg"), "").unwrap();

    let settings = settings(&base.join("ws"));
    let mut h = harness(&settings);
    let listener = h.listener.take().unwrap();
    let mut changes = listener.subscribe();
    let handle = tokio::spawn(listener.run());

    let link = settings.root.join("link");
    std::os::unix::fs::symlink(&outside, &link).unwrap();
    h.events
        .send(Event::new(EventKind::Create(CreateKind::Any)).add_path(link.clone()))
        .unwrap();
    changes.changed().await.unwrap();

    assert!(!h.context.is_watched(&link.join("deep")));
    let live = h.context.enumerate().await.unwrap();
    assert!(live.is_empty());

    // A restart on the same root must see the same watch set and files.
    let restarted = harness(&settings);
    assert_eq!(h.context.snapshot(), restarted.context.snapshot());
    assert_eq!(live, restarted.context.enumerate().await.unwrap());

    drop(h.events);
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[test]
fn test_startup_fails_on_unwatchable_root() {
    let dir = tempdir().unwrap();
    let locked = dir.path().join("locked");
    fs::create_dir_all(&locked).unwrap();

    let (_events, event_rx) = mpsc::unbounded_channel::<Event>();
    let (_errors, error_rx) = mpsc::unbounded_channel();
    let result = WatchContext::with_notifier(&settings(&locked), FakeNotifier, event_rx, error_rx);
    assert!(matches!(result, Err(WatchError::Notify { .. })));
}

/// Uses the real OS notifier; directories created after startup must be
/// picked up without a restart.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_new_subdirectory_is_watched_live() {
    let dir = tempdir().unwrap();
    let settings = settings(dir.path());
    let (context, listener) = WatchContext::start(&settings).unwrap();
    let handle = tokio::spawn(listener.run());

    let fresh: PathBuf = settings.root.join("later");
    fs::create_dir_all(&fresh).unwrap();

    let mut watched = false;
    for _ in 0..50 {
        if context.is_watched(&fresh) {
            watched = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(watched, "new directory was not registered");

    fs::write(fresh.join("late.norg"), "title: Late\n").unwrap();
    let mut store = JsonIndexStore::new(&settings.index_path);
    Reconciler::new(&settings.root)
        .reconcile(&context, &mut store)
        .await
        .unwrap();
    assert!(store.get("later/late.norg").is_some());

    context.shutdown();
    let stopped = tokio::time::timeout(Duration::from_secs(5), handle).await;
    assert!(stopped.is_ok(), "listener did not stop after shutdown");
}
