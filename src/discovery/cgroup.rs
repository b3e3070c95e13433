use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::container::{NamespacedName, WatchSource};
use crate::manager::Manager;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to scan cgroup directory `{path}`: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What one reconciliation pass changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// Keeps the registry in line with the cgroup hierarchy: every cgroup directory is
/// monitored, and containers it registered are destroyed once their directory is gone.
#[derive(Debug, Clone)]
pub struct CgroupWatcher {
    cgroup_root: PathBuf,
    interval: Duration,
}

impl CgroupWatcher {
    pub fn new(cgroup_root: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            cgroup_root: cgroup_root.into(),
            interval,
        }
    }

    /// Canonical names of every cgroup below the root, the root itself included.
    pub async fn scan(&self) -> Result<BTreeSet<String>, Error> {
        let mut names = BTreeSet::from(["/".to_owned()]);
        let mut stack = vec![(self.cgroup_root.clone(), "/".to_owned())];
        while let Some((path, name)) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&path).await {
                Ok(entries) => entries,
                // Removed while scanning.
                Err(err) if err.kind() == std::io::ErrorKind::NotFound && path != self.cgroup_root => {
                    continue;
                }
                Err(source) => return Err(Error::Scan { path, source }),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|source| Error::Scan {
                    path: path.clone(),
                    source,
                })?
            {
                let Ok(ft) = entry.file_type().await else {
                    continue;
                };
                if !ft.is_dir() {
                    continue;
                }
                let child = crate::cgroup::child_name(&name, &entry.file_name().to_string_lossy());
                names.insert(child.clone());
                stack.push((entry.path(), child));
            }
        }
        Ok(names)
    }

    /// Creates containers for new cgroups and destroys the ones whose cgroup vanished.
    pub async fn sync(&self, manager: &Manager) -> Result<SyncReport, Error> {
        let present = self.scan().await?;
        let mut report = SyncReport::default();

        for name in &present {
            if manager.get_container(&NamespacedName::canonical(name)).is_some() {
                continue;
            }
            match manager
                .create_container_with_source(name, WatchSource::Cgroup)
                .await
            {
                Ok(()) => report.added.push(name.clone()),
                Err(crate::Error::NotFound(_)) => {
                    log::trace!("No factory accepts cgroup `{name}`");
                }
                Err(err) => log::warn!("Failed to monitor cgroup `{name}`: {err}"),
            }
        }

        for name in manager.container_names(WatchSource::Cgroup) {
            if present.contains(&name) {
                continue;
            }
            match manager.destroy_container(&name).await {
                Ok(()) => report.removed.push(name),
                Err(err) => log::debug!("Cgroup `{name}` already removed: {err}"),
            }
        }

        if !report.added.is_empty() || !report.removed.is_empty() {
            log::debug!(
                "Cgroup sync: {} added, {} removed",
                report.added.len(),
                report.removed.len()
            );
        }
        Ok(report)
    }

    /// Syncs every interval, forever.
    pub async fn run(self, manager: Arc<Manager>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(err) = self.sync(&manager).await {
                log::error!("{err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgroup::{DockerFactory, RawFactory};
    use crate::container::mock::MockHost;
    use crate::container::DOCKER_NAMESPACE;
    use crate::storage::InMemoryStatsStore;

    fn manager_for(root: &std::path::Path) -> Manager {
        let mut builder = Manager::builder();
        builder
            .set_stats_store(Arc::new(InMemoryStatsStore::new(4)))
            .set_host(Arc::new(MockHost))
            .add_factory(Arc::new(DockerFactory::new(root)))
            .add_factory(Arc::new(RawFactory::new(root)));
        builder.build().unwrap()
    }

    #[tokio::test]
    async fn test_scan() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("system.slice/sshd.service")).unwrap();
        std::fs::write(root.path().join("cgroup.procs"), "1\n").unwrap();

        let watcher = CgroupWatcher::new(root.path(), Duration::from_secs(1));
        let names: Vec<String> = watcher.scan().await.unwrap().into_iter().collect();
        assert_eq!(names, vec!["/", "/system.slice", "/system.slice/sshd.service"]);
    }

    #[tokio::test]
    async fn test_scan_missing_root() {
        let watcher = CgroupWatcher::new("/definitely/not/a/cgroup/root", Duration::from_secs(1));
        assert!(matches!(watcher.scan().await, Err(Error::Scan { .. })));
    }

    #[tokio::test]
    async fn test_sync_adds_and_removes() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("docker/c1")).unwrap();
        let manager = manager_for(root.path());
        let watcher = CgroupWatcher::new(root.path(), Duration::from_secs(1));

        let report = watcher.sync(&manager).await.unwrap();
        assert_eq!(report.added, vec!["/", "/docker", "/docker/c1"]);
        assert_eq!(
            manager.resolve_alias_name(DOCKER_NAMESPACE, "c1").unwrap(),
            NamespacedName::canonical("/docker/c1")
        );

        let report = watcher.sync(&manager).await.unwrap();
        assert_eq!(report, SyncReport::default());

        std::fs::remove_dir(root.path().join("docker/c1")).unwrap();
        let report = watcher.sync(&manager).await.unwrap();
        assert_eq!(report.removed, vec!["/docker/c1"]);
        assert!(manager.resolve_alias_name(DOCKER_NAMESPACE, "c1").is_err());
    }

    #[tokio::test]
    async fn test_sync_leaves_api_containers_alone() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("app")).unwrap();
        let manager = manager_for(root.path());
        manager.create_container("/app").await.unwrap();

        std::fs::remove_dir(root.path().join("app")).unwrap();
        let watcher = CgroupWatcher::new(root.path(), Duration::from_secs(1));
        let report = watcher.sync(&manager).await.unwrap();

        assert!(report.removed.is_empty());
        assert!(manager.get_container(&NamespacedName::canonical("/app")).is_some());
    }
}
