use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::container::WatchSource;
use crate::error::ResultOkLogExt;

use super::Manager;

/// What one housekeeping pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HousekeepingReport {
    /// Containers that got a fresh stats sample.
    pub collected: usize,
    /// Containers whose collection failed but which still exist.
    pub failed: usize,
    /// Containers destroyed because their handler reported them gone.
    pub removed: Vec<String>,
    /// Events dropped for exceeding the maximum age.
    pub pruned_events: usize,
}

enum Outcome {
    Collected,
    Failed,
    Gone(String),
}

impl Manager {
    /// Runs one housekeeping pass over every monitored container.
    ///
    /// Each container refreshes a stale spec and appends a stats sample. Containers created
    /// through the API whose collection fails and whose handler says they no longer exist
    /// are destroyed; containers owned by the cgroup watcher are left to it.
    pub async fn housekeep(&self) -> HousekeepingReport {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut set = JoinSet::new();
        for data in self.containers() {
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                match data.housekeep().await {
                    Ok(()) => Outcome::Collected,
                    Err(err) => {
                        log::warn!(target: "housekeeping", "{err}");
                        if data.watch_source() == WatchSource::Api && !data.exists().await {
                            Outcome::Gone(data.name().to_owned())
                        } else {
                            Outcome::Failed
                        }
                    }
                }
            });
        }

        let mut report = HousekeepingReport::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Outcome::Collected) => report.collected += 1,
                Ok(Outcome::Failed) => report.failed += 1,
                Ok(Outcome::Gone(name)) => report.removed.push(name),
                Err(err) => {
                    log::error!(target: "housekeeping", "housekeeping task failed: {err}");
                    report.failed += 1;
                }
            }
        }

        for name in &report.removed {
            log::info!(target: "housekeeping", "Container `{name}` is gone");
            self.destroy_container(name).await.ok_log();
        }
        report.pruned_events = self.events.prune(SystemTime::now());

        log::trace!(target: "housekeeping", "{report:?}");
        report
    }
}

pub(super) fn spawn(
    manager: Weak<Manager>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            let Some(manager) = manager.upgrade() else {
                break;
            };
            let before = std::time::Instant::now();
            manager.housekeep().await;
            log::trace!(
                target: "housekeeping",
                "housekeeping took {} microseconds",
                before.elapsed().as_micros()
            );
        }
        log::debug!(target: "housekeeping", "Housekeeping stopped");
    })
}
