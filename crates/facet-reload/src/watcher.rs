//! Polling file watcher for shader sources.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use thiserror::Error;

/// Default interval between poll cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Errors from watcher construction.
#[derive(Error, Debug)]
pub enum WatchError {
    /// A watched path could not be stat-ed when the watcher was built.
    #[error("failed to stat {path}: {source}")]
    InitialStat {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A watched path and its last observed modification time.
struct WatchedFile {
    path: PathBuf,
    modified: SystemTime,
}

/// State owned by the watch thread once started.
struct WatchState {
    files: Vec<WatchedFile>,
    on_change: Box<dyn FnMut(&Path) + Send>,
}

/// Polls a fixed set of files and invokes a callback when one changes.
///
/// The callback runs on the watcher's background thread, synchronously within
/// the poll cycle that observed the change. It must not touch resources owned
/// by other threads; hand results across with a [`crate::SwapSlot`] instead.
///
/// `stop()` joins the background thread, so once it returns no further
/// callback invocation can occur. Dropping the watcher stops it.
pub struct FileWatcher {
    /// Present until `start()` moves it into the watch thread.
    state: Option<WatchState>,
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
    interval: Duration,
}

impl FileWatcher {
    /// Create a watcher over `paths` with the default 1 second poll interval.
    ///
    /// Every path must be stat-able now; the initial modification times are
    /// the baseline for change detection.
    pub fn new<F>(paths: Vec<PathBuf>, on_change: F) -> Result<Self, WatchError>
    where
        F: FnMut(&Path) + Send + 'static,
    {
        Self::with_interval(paths, DEFAULT_POLL_INTERVAL, on_change)
    }

    /// Create a watcher with a custom poll interval.
    pub fn with_interval<F>(
        paths: Vec<PathBuf>,
        interval: Duration,
        on_change: F,
    ) -> Result<Self, WatchError>
    where
        F: FnMut(&Path) + Send + 'static,
    {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let modified = modification_time(&path)
                .map_err(|source| WatchError::InitialStat {
                    path: path.clone(),
                    source,
                })?;
            files.push(WatchedFile { path, modified });
        }

        Ok(Self {
            state: Some(WatchState {
                files,
                on_change: Box::new(on_change),
            }),
            stop_tx: None,
            thread: None,
            interval,
        })
    }

    /// Begin polling on a background thread.
    pub fn start(&mut self) {
        let Some(state) = self.state.take() else {
            tracing::warn!("file watcher already started");
            return;
        };

        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let interval = self.interval;

        let thread = thread::Builder::new()
            .name("shader-watch".to_string())
            .spawn(move || {
                watch_loop(state, &stop_rx, interval);
            })
            .expect("Failed to spawn shader watch thread");

        self.stop_tx = Some(stop_tx);
        self.thread = Some(thread);
    }

    /// Signal the watch thread to exit and wait for it to finish.
    ///
    /// The thread observes the signal within one poll interval. Idempotent,
    /// and a no-op if `start()` was never called.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn modification_time(path: &Path) -> std::io::Result<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified())
}

/// Poll cycle: sleep on the stop channel, then stat each watched file.
///
/// A stat failure (deleted or unreadable file) is reported and skipped; the
/// stored timestamp stays as-is so the file firing again after it reappears
/// is detected normally.
fn watch_loop(mut state: WatchState, stop_rx: &Receiver<()>, interval: Duration) {
    loop {
        match stop_rx.recv_timeout(interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => {}
        }

        for file in &mut state.files {
            match modification_time(&file.path) {
                Ok(modified) => {
                    if modified != file.modified {
                        file.modified = modified;
                        (state.on_change)(&file.path);
                    }
                }
                Err(e) => {
                    tracing::warn!("failed to stat {}: {e}", file.path.display());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const TEST_INTERVAL: Duration = Duration::from_millis(25);

    static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

    /// Fresh directory with two watched files in it.
    fn setup_dir() -> (PathBuf, PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!(
            "facet-watch-{}-{}",
            std::process::id(),
            DIR_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::create_dir_all(&dir).unwrap();

        let vert = dir.join("demo.vert");
        let frag = dir.join("demo.frag");
        fs::write(&vert, "v1").unwrap();
        fs::write(&frag, "f1").unwrap();

        (dir, vert, frag)
    }

    fn sleep_cycles(n: u32) {
        thread::sleep(TEST_INTERVAL * n);
    }

    #[derive(Clone, Default)]
    struct Recorder {
        changed: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl Recorder {
        fn callback(&self) -> impl FnMut(&Path) + Send + 'static {
            let changed = Arc::clone(&self.changed);
            move |path: &Path| changed.lock().push(path.to_path_buf())
        }

        fn count(&self) -> usize {
            self.changed.lock().len()
        }

        fn paths(&self) -> Vec<PathBuf> {
            self.changed.lock().clone()
        }
    }

    #[test]
    fn missing_file_fails_construction() {
        let (dir, vert, _frag) = setup_dir();
        let missing = dir.join("nope.vert");

        let result = FileWatcher::with_interval(vec![vert, missing], TEST_INTERVAL, |_| {});

        assert!(matches!(result, Err(WatchError::InitialStat { .. })));
    }

    #[test]
    fn unchanged_files_fire_nothing() {
        let (_dir, vert, frag) = setup_dir();
        let recorder = Recorder::default();

        let mut watcher =
            FileWatcher::with_interval(vec![vert, frag], TEST_INTERVAL, recorder.callback())
                .unwrap();
        watcher.start();

        sleep_cycles(5);
        watcher.stop();

        assert_eq!(recorder.count(), 0);
    }

    #[test]
    fn single_change_fires_once_with_path() {
        let (_dir, vert, frag) = setup_dir();
        let recorder = Recorder::default();

        let mut watcher = FileWatcher::with_interval(
            vec![vert.clone(), frag],
            TEST_INTERVAL,
            recorder.callback(),
        )
        .unwrap();
        watcher.start();

        // Let a couple of cycles pass before the change.
        sleep_cycles(2);
        fs::write(&vert, "v2").unwrap();
        sleep_cycles(6);
        watcher.stop();

        assert_eq!(recorder.paths(), vec![vert]);
    }

    #[test]
    fn each_distinct_change_fires() {
        let (_dir, vert, frag) = setup_dir();
        let recorder = Recorder::default();

        let mut watcher = FileWatcher::with_interval(
            vec![vert.clone(), frag.clone()],
            TEST_INTERVAL,
            recorder.callback(),
        )
        .unwrap();
        watcher.start();

        fs::write(&vert, "v2").unwrap();
        sleep_cycles(4);
        fs::write(&frag, "f2").unwrap();
        sleep_cycles(4);
        watcher.stop();

        let mut paths = recorder.paths();
        paths.sort();
        let mut expected = vec![vert, frag];
        expected.sort();
        assert_eq!(paths, expected);
    }

    #[test]
    fn nothing_fires_after_stop_returns() {
        let (_dir, vert, frag) = setup_dir();
        let recorder = Recorder::default();

        let mut watcher = FileWatcher::with_interval(
            vec![vert.clone(), frag],
            TEST_INTERVAL,
            recorder.callback(),
        )
        .unwrap();
        watcher.start();
        watcher.stop();

        let count_at_stop = recorder.count();
        fs::write(&vert, "v2").unwrap();
        sleep_cycles(4);

        assert_eq!(recorder.count(), count_at_stop);
    }

    #[test]
    fn deleted_file_is_skipped_and_watching_continues() {
        let (_dir, vert, frag) = setup_dir();
        let recorder = Recorder::default();

        let mut watcher = FileWatcher::with_interval(
            vec![vert.clone(), frag.clone()],
            TEST_INTERVAL,
            recorder.callback(),
        )
        .unwrap();
        watcher.start();

        fs::remove_file(&vert).unwrap();
        sleep_cycles(3);
        assert_eq!(recorder.count(), 0);

        // The other file is still watched.
        fs::write(&frag, "f2").unwrap();
        sleep_cycles(4);
        watcher.stop();

        assert_eq!(recorder.paths(), vec![frag]);
    }

    #[test]
    fn stop_without_start_is_a_noop() {
        let (_dir, vert, frag) = setup_dir();

        let mut watcher =
            FileWatcher::with_interval(vec![vert, frag], TEST_INTERVAL, |_| {}).unwrap();
        watcher.stop();
        watcher.stop();
    }
}
