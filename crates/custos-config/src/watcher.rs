//! File watching for configuration reload.
//!
//! The [`FileWatcher`] reports changes to configuration files so the refresh
//! scope can discard beans whose properties changed. Events from `notify`
//! are forwarded over a tokio channel, filtered by extension and debounced
//! per path: a change is reported once the path has been quiet for the
//! debounce window, so a truncate followed by a write yields one event for
//! the final content.
//!
//! # Example
//!
//! ```no_run
//! use custos_config::FileWatcher;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), custos_config::ConfigError> {
//! let mut watcher = FileWatcher::builder()
//!     .with_debounce(Duration::from_millis(500))
//!     .watch_path("custos.toml")?
//!     .build()?;
//!
//! while let Some(event) = watcher.next().await {
//!     println!("{} changed", event.path.display());
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::ConfigError;

/// A debounced change to a watched file.
#[derive(Debug, Clone)]
pub struct FileChangeEvent {
    /// Path to the changed file.
    pub path: PathBuf,
    /// Kind of change.
    pub kind: FileChangeKind,
    /// When the change was observed.
    pub timestamp: Instant,
}

/// Kind of file change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
    /// File was created.
    Created,
    /// File was modified.
    Modified,
    /// File was deleted.
    Deleted,
}

impl FileChangeKind {
    fn from_event(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(Self::Created),
            EventKind::Modify(_) => Some(Self::Modified),
            EventKind::Remove(_) => Some(Self::Deleted),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
        }
    }
}

/// Configuration for the file watcher.
#[derive(Debug, Clone)]
pub struct FileWatcherConfig {
    /// Paths to watch (files or directories).
    pub paths: Vec<PathBuf>,
    /// Quiet period after the last change to a path before it is reported.
    pub debounce: Duration,
    /// File extensions to report (empty = all files).
    pub extensions: HashSet<String>,
}

impl Default for FileWatcherConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            debounce: Duration::from_millis(500),
            extensions: HashSet::new(),
        }
    }
}

/// Builder for [`FileWatcher`].
#[derive(Debug, Default)]
pub struct FileWatcherBuilder {
    config: FileWatcherConfig,
}

impl FileWatcherBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the debounce window. Default is 500ms.
    #[must_use]
    pub fn with_debounce(mut self, duration: Duration) -> Self {
        self.config.debounce = duration;
        self
    }

    /// Add a path to watch.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::FileNotFound` if the path does not exist.
    pub fn watch_path<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }
        self.config.paths.push(path.to_path_buf());
        Ok(self)
    }

    /// Only report files with these extensions.
    #[must_use]
    pub fn watch_extensions(mut self, extensions: &[&str]) -> Self {
        self.config.extensions = extensions.iter().map(ToString::to_string).collect();
        self
    }

    /// Build the watcher and start receiving events.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Watcher` if no paths are configured or the
    /// platform watcher cannot be created.
    pub fn build(self) -> Result<FileWatcher, ConfigError> {
        if self.config.paths.is_empty() {
            return Err(ConfigError::watcher("no paths configured"));
        }

        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => warn!(error = %e, "File watcher error"),
            }
        })
        .map_err(|e| ConfigError::watcher(format!("failed to create watcher: {e}")))?;

        for path in &self.config.paths {
            watcher
                .watch(path, RecursiveMode::NonRecursive)
                .map_err(|e| {
                    ConfigError::watcher(format!("failed to watch {}: {e}", path.display()))
                })?;
            debug!(path = %path.display(), "Watching configuration path");
        }

        Ok(FileWatcher {
            _watcher: watcher,
            rx,
            config: self.config,
            pending: HashMap::new(),
        })
    }
}

/// A change waiting for its path to go quiet.
#[derive(Debug, Clone, Copy)]
struct Pending {
    kind: FileChangeKind,
    seen: Instant,
}

/// Watches configuration files for changes.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<Event>,
    config: FileWatcherConfig,
    pending: HashMap<PathBuf, Pending>,
}

impl FileWatcher {
    /// Create a new file watcher builder.
    #[must_use]
    pub fn builder() -> FileWatcherBuilder {
        FileWatcherBuilder::new()
    }

    /// Returns the paths being watched.
    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        &self.config.paths
    }

    /// Returns a change whose debounce window has elapsed, without waiting.
    pub fn try_next(&mut self) -> Option<FileChangeEvent> {
        let now = Instant::now();
        while let Ok(event) = self.rx.try_recv() {
            self.record(&event, now);
        }
        self.take_due(now)
    }

    /// Waits for the next change.
    ///
    /// Returns `None` once the underlying watcher has shut down and no
    /// change is pending.
    pub async fn next(&mut self) -> Option<FileChangeEvent> {
        loop {
            if let Some(change) = self.take_due(Instant::now()) {
                return Some(change);
            }

            let Some(deadline) = self.next_deadline() else {
                let event = self.rx.recv().await?;
                self.record(&event, Instant::now());
                continue;
            };

            match tokio::time::timeout_at(deadline.into(), self.rx.recv()).await {
                Ok(Some(event)) => self.record(&event, Instant::now()),
                Ok(None) => return self.take_earliest(),
                Err(_) => {}
            }
        }
    }

    fn record(&mut self, event: &Event, now: Instant) {
        let Some(kind) = FileChangeKind::from_event(&event.kind) else {
            return;
        };
        let Some(path) = event.paths.first() else {
            return;
        };

        if !self.config.extensions.is_empty() {
            let matches = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| self.config.extensions.contains(ext));
            if !matches {
                return;
            }
        }

        self.pending.insert(path.clone(), Pending { kind, seen: now });
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .values()
            .map(|pending| pending.seen + self.config.debounce)
            .min()
    }

    fn take_due(&mut self, now: Instant) -> Option<FileChangeEvent> {
        let debounce = self.config.debounce;
        let path = self
            .pending
            .iter()
            .filter(|(_, pending)| now.duration_since(pending.seen) >= debounce)
            .min_by_key(|(_, pending)| pending.seen)
            .map(|(path, _)| path.clone())?;
        self.take(path)
    }

    fn take_earliest(&mut self) -> Option<FileChangeEvent> {
        let path = self
            .pending
            .iter()
            .min_by_key(|(_, pending)| pending.seen)
            .map(|(path, _)| path.clone())?;
        self.take(path)
    }

    fn take(&mut self, path: PathBuf) -> Option<FileChangeEvent> {
        let pending = self.pending.remove(&path)?;
        Some(FileChangeEvent {
            path,
            kind: pending.kind,
            timestamp: pending.seen,
        })
    }
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
