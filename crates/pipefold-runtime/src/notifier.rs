//! Change notifier
//!
//! Watches the literal base directory of every input pattern and forwards
//! the filesystem events whose path matches one of the patterns.
//!
//! ```text
//! "content/posts/**/*.md"  →  watch  content/posts/  (recursive)
//!                             match  **/*.md  against paths below it
//! ```

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::{self, error::TrySendError};

/// What happened to a watched path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// File created
    Created,
    /// Content or metadata changed
    Modified,
    /// File removed
    Removed,
}

impl ChangeKind {
    /// Map a notify event kind; access and other events are ignored.
    pub fn from_event(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(Self::Created),
            EventKind::Modify(_) => Some(Self::Modified),
            EventKind::Remove(_) => Some(Self::Removed),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Modified => write!(f, "modified"),
            Self::Removed => write!(f, "removed"),
        }
    }
}

/// One filesystem change that matched an input pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Kind of change
    pub kind: ChangeKind,
    /// Path that changed
    pub path: PathBuf,
}

impl ChangeEvent {
    /// Create an event
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// An input pattern split into the directory to watch and the glob that
/// paths below it must match
#[derive(Debug, Clone)]
struct WatchTarget {
    base: PathBuf,
    rest: glob::Pattern,
}

impl WatchTarget {
    fn new(pattern: &str) -> Result<Self> {
        let (base, rest) = split_pattern(pattern);
        let base = base
            .canonicalize()
            .with_context(|| format!("Failed to watch {}", base.display()))?;
        let rest = glob::Pattern::new(&rest)
            .with_context(|| format!("Invalid input pattern: {pattern}"))?;
        Ok(Self { base, rest })
    }

    fn matches(&self, path: &Path) -> bool {
        let options = glob::MatchOptions {
            require_literal_separator: true,
            ..Default::default()
        };
        path.strip_prefix(&self.base)
            .is_ok_and(|rel| self.rest.matches_path_with(rel, options))
    }
}

fn is_glob(component: &str) -> bool {
    component.contains(['*', '?', '['])
}

/// Split a pattern at its first glob component.
fn split_pattern(pattern: &str) -> (PathBuf, String) {
    let mut base = PathBuf::new();
    let mut rest: Vec<String> = Vec::new();

    for component in Path::new(pattern).components() {
        let text = component.as_os_str().to_string_lossy();
        if rest.is_empty() && !is_glob(&text) {
            base.push(component);
        } else {
            rest.push(text.into_owned());
        }
    }

    // A literal path: watch its parent for the file itself.
    if rest.is_empty()
        && let Some(name) = base.file_name().map(|name| name.to_string_lossy().into_owned())
    {
        base.pop();
        rest.push(name);
    }
    if base.as_os_str().is_empty() {
        base.push(".");
    }

    (base, rest.join("/"))
}

/// Forwards matching filesystem events into a channel while alive
pub struct FsNotifier {
    _watcher: RecommendedWatcher,
}

impl fmt::Debug for FsNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsNotifier").finish_non_exhaustive()
    }
}

impl FsNotifier {
    /// Start watching the given input patterns.
    ///
    /// Events are dropped rather than queued when `events` is full; a rebuild
    /// is already pending by then.
    pub fn start(patterns: &[String], events: mpsc::Sender<ChangeEvent>) -> Result<Self> {
        let targets = patterns
            .iter()
            .map(|pattern| WatchTarget::new(pattern))
            .collect::<Result<Vec<_>>>()?;
        let bases: BTreeSet<PathBuf> = targets.iter().map(|target| target.base.clone()).collect();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => forward(&targets, &events, event),
            Err(err) => tracing::warn!("Watch error: {err}"),
        })
        .context("Failed to create file watcher")?;

        for base in &bases {
            watcher
                .watch(base, RecursiveMode::Recursive)
                .with_context(|| format!("Failed to watch {}", base.display()))?;
            tracing::debug!("Watching {}", base.display());
        }

        Ok(Self { _watcher: watcher })
    }
}

fn forward(targets: &[WatchTarget], events: &mpsc::Sender<ChangeEvent>, event: Event) {
    let Some(kind) = ChangeKind::from_event(&event.kind) else {
        return;
    };
    for path in event.paths {
        if !targets.iter().any(|target| target.matches(&path)) {
            continue;
        }
        match events.try_send(ChangeEvent::new(kind, path)) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(event)) => {
                tracing::debug!("Dropping change to {}, rebuild pending", event.path.display());
            }
        }
    }
}
