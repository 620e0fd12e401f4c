use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

pub type Snapshot = HashMap<PathBuf, SystemTime>;

/// Change source that diffs `path → mtime` snapshots of its roots on a fixed
/// interval. Missing roots are simply empty.
#[derive(Debug, Clone)]
pub struct PollingWatcher {
    roots: Vec<PathBuf>,
    interval: Duration,
}

impl PollingWatcher {
    pub fn new(roots: Vec<PathBuf>, interval: Duration) -> Self {
        Self { roots, interval }
    }

    pub fn snapshot(&self) -> Snapshot {
        let mut files = Snapshot::new();
        for root in &self.roots {
            for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                if let Some(modified) = entry.metadata().ok().and_then(|m| m.modified().ok()) {
                    files.insert(entry.into_path(), modified);
                }
            }
        }
        files
    }

    /// Starts polling. The task ends when `shutdown` flips to true, its
    /// sender is dropped, or the event receiver goes away.
    pub fn spawn(
        self,
        events: mpsc::Sender<ChangeEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut previous = self.snapshot();
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let current = self.snapshot();
                        for event in diff(&previous, &current) {
                            debug!("{:?} {}", event.kind, event.path.display());
                            if events.send(event).await.is_err() {
                                warn!("Change receiver closed; stopping poller");
                                return;
                            }
                        }
                        previous = current;
                    }
                }
            }
            debug!("Poller stopped");
        })
    }
}

/// Events turning `before` into `after`, sorted by path for determinism.
pub fn diff(before: &Snapshot, after: &Snapshot) -> Vec<ChangeEvent> {
    let mut events: Vec<ChangeEvent> = after
        .iter()
        .filter_map(|(path, mtime)| {
            let kind = match before.get(path) {
                None => ChangeKind::Created,
                Some(old) if old != mtime => ChangeKind::Modified,
                Some(_) => return None,
            };
            Some(ChangeEvent {
                path: path.clone(),
                kind,
            })
        })
        .chain(
            before
                .keys()
                .filter(|path| !after.contains_key(*path))
                .map(|path| ChangeEvent {
                    path: path.clone(),
                    kind: ChangeKind::Removed,
                }),
        )
        .collect();
    events.sort_by(|a, b| a.path.cmp(&b.path));
    events
}
