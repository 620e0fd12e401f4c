//! Watch Controller — continuous mode.
//!
//! State machine: `Idle → Watching → Rebuilding → Watching …`, `Stopped` once
//! the shutdown signal fires. Change events arrive on an mpsc channel fed by
//! [`PollingWatcher`]; waiting on that channel is the only suspension point
//! and it races the shutdown signal in a `select!`. A rebuild that has
//! started always runs to completion before the loop observes shutdown.

pub mod poller;

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::build::{BuildOptions, BuildSummary, Orchestrator};
use crate::errors::BuildError;
use crate::store::ProfileId;

pub use poller::{ChangeEvent, ChangeKind, PollingWatcher};

const EVENT_QUEUE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Watching,
    Rebuilding,
    Stopped,
}

pub struct WatchController {
    orchestrator: Orchestrator,
    options: BuildOptions,
    /// Explicit profile selection; `None` follows every profile in the input dir.
    targets: Option<Vec<ProfileId>>,
    interval: Duration,
    state: watch::Sender<WatchState>,
}

impl WatchController {
    pub fn new(orchestrator: Orchestrator, options: BuildOptions, interval: Duration) -> Self {
        let (state, _) = watch::channel(WatchState::Idle);
        Self {
            orchestrator,
            options,
            targets: None,
            interval,
            state,
        }
    }

    pub fn with_targets(mut self, targets: Option<Vec<ProfileId>>) -> Self {
        self.targets = targets;
        self
    }

    pub fn state(&self) -> WatchState {
        *self.state.borrow()
    }

    /// Observe state transitions from another task.
    pub fn subscribe(&self) -> watch::Receiver<WatchState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: WatchState) {
        debug!("Watch state: {state:?}");
        self.state.send_replace(state);
    }

    fn is_target(&self, id: &ProfileId) -> bool {
        self.targets.as_ref().map_or(true, |t| t.contains(id))
    }

    /// Profiles affected by a batch of change events. Changed data sources are
    /// invalidated so the next build reloads them even on same-second writes;
    /// removed ones are evicted from the store.
    pub fn affected_profiles(&self, events: &[ChangeEvent]) -> BTreeSet<ProfileId> {
        let store = self.orchestrator.store();
        let resolver = self.orchestrator.resolver();
        let mut affected = BTreeSet::new();

        for event in events {
            if let Some(id) = store.profile_for_path(&event.path) {
                if !self.is_target(&id) {
                    continue;
                }
                if let Some(record) = store.record(&id) {
                    let loaded: DateTime<Local> = record.loaded_at.into();
                    debug!("[{id}] Dropping data loaded at {}", loaded.format("%H:%M:%S"));
                }
                if event.kind == ChangeKind::Removed {
                    info!("[{id}] Data source removed; nothing to rebuild");
                    store.evict(&id);
                    affected.remove(&id);
                } else {
                    store.invalidate(&id);
                    affected.insert(id);
                }
            } else if let Some(template) = resolver.template_for_path(&event.path) {
                let users = store.profiles_using_template(&template);
                debug!("Template '{template}' changed; used by {} profile(s)", users.len());
                affected.extend(users.into_iter().filter(|id| self.is_target(id)));
            }
        }
        // A source may vanish between the event and now.
        affected.retain(|id| store.contains(id));
        affected
    }

    /// Builds `ids` and prints the summary. Failures are reported, never raised.
    /// Ids whose data source has disappeared are skipped so that they cannot
    /// abort the rest of the batch.
    pub async fn rebuild(&self, ids: &[ProfileId]) -> Option<BuildSummary> {
        let store = self.orchestrator.store();
        let (present, vanished): (Vec<ProfileId>, Vec<ProfileId>) =
            ids.iter().cloned().partition(|id| store.contains(id));
        for id in &vanished {
            warn!("[{id}] Data source disappeared; skipping");
            store.evict(id);
        }
        if present.is_empty() {
            return None;
        }

        self.set_state(WatchState::Rebuilding);
        let outcome = self.orchestrator.build_all(Some(&present), self.options).await;
        self.set_state(WatchState::Watching);

        match outcome {
            Ok(summary) => {
                println!("{}", summary.render());
                Some(summary)
            }
            Err(e) => {
                error!("Rebuild failed: {e}");
                None
            }
        }
    }

    /// Builds every target once. An unknown explicit id or an unreadable
    /// input directory is a startup failure; per-profile failures are not.
    async fn initial_build(&self) -> Result<(), BuildError> {
        self.set_state(WatchState::Rebuilding);
        let outcome = self
            .orchestrator
            .build_all(self.targets.as_deref(), self.options)
            .await;
        match outcome {
            Ok(summary) => {
                println!("{}", summary.render());
                self.set_state(WatchState::Watching);
                Ok(())
            }
            Err(e) => {
                error!("Initial build failed: {e}");
                self.set_state(WatchState::Stopped);
                Err(e)
            }
        }
    }

    /// Watches the input and template directories until `shutdown` fires.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), BuildError> {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE);
        let roots = vec![
            self.orchestrator.store().input_dir().to_path_buf(),
            self.orchestrator.resolver().templates_dir().to_path_buf(),
        ];
        // The poller has its own stop signal so it also ends when the loop
        // returns early on a startup failure.
        let (stop_poller, poller_stop) = watch::channel(false);
        let poller = PollingWatcher::new(roots, self.interval).spawn(tx, poller_stop);

        let result = self.run_with_events(rx, shutdown).await;
        stop_poller.send_replace(true);
        if let Err(e) = poller.await {
            warn!("Poller task ended abnormally: {e}");
        }
        result
    }

    /// Event loop over an arbitrary change source.
    pub async fn run_with_events(
        &self,
        mut events: mpsc::Receiver<ChangeEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), BuildError> {
        self.initial_build().await?;
        info!("Watching for changes (Ctrl-C to stop)");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        warn!("Change source closed");
                        break;
                    };
                    let mut batch = vec![event];
                    while let Ok(queued) = events.try_recv() {
                        batch.push(queued);
                    }

                    let affected: Vec<ProfileId> = self.affected_profiles(&batch).into_iter().collect();
                    if affected.is_empty() {
                        debug!("{} change(s) affect no profile", batch.len());
                        continue;
                    }
                    info!("Change detected; rebuilding {} profile(s)", affected.len());
                    self.rebuild(&affected).await;
                }
            }
        }

        self.set_state(WatchState::Stopped);
        info!("Stopped watching");
        Ok(())
    }
}
