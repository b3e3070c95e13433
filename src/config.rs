//! Runtime configuration.
//!
//! [`ManagerConfig`] tunes the registry itself; [`Config`] is the process level
//! configuration read from environment variables by [`crate::run`].
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::container::data::CollectionPolicy;
use crate::events::RetentionPolicy;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid value for `{key}`: `{value}`")]
    InvalidValue { key: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Upper bound for a single call into a container handler.
    pub handler_timeout: Duration,
    /// Period of the housekeeping driver started by [`crate::manager::Manager::start`].
    pub housekeeping_interval: Duration,
    /// How many containers are queried or housekept at the same time.
    pub max_concurrency: usize,
    /// See [`CollectionPolicy::spec_max_age`].
    pub spec_max_age: Option<Duration>,
    pub event_retention: RetentionPolicy,
    /// Events buffered per event watch before a slow watcher starts skipping.
    pub watch_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            handler_timeout: Duration::from_secs(10),
            housekeeping_interval: Duration::from_secs(1),
            max_concurrency: 16,
            spec_max_age: None,
            event_retention: RetentionPolicy::default(),
            watch_capacity: 1024,
        }
    }
}

impl ManagerConfig {
    pub fn collection_policy(&self) -> CollectionPolicy {
        CollectionPolicy {
            handler_timeout: self.handler_timeout,
            spec_max_age: self.spec_max_age,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Where the host's root filesystem is visible, `/` when running on the host.
    pub rootfs: PathBuf,
    pub cgroup_root: PathBuf,
    pub listen_addr: String,
    pub discovery_interval: Duration,
    pub max_stats_per_container: usize,
    pub manager: ManagerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from `lookup`, falling back to defaults for unset keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let rootfs = lookup("ROOTFS_MOUNT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/"));
        let cgroup_root = lookup("CGROUP_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| rootfs.join("sys/fs/cgroup"));
        let listen_addr = lookup("LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_owned());

        let mut manager = ManagerConfig::default();
        if let Some(secs) = parse::<u64>(&lookup, "HOUSEKEEPING_INTERVAL_SECS")? {
            manager.housekeeping_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(millis) = parse::<u64>(&lookup, "HANDLER_TIMEOUT_MS")? {
            manager.handler_timeout = Duration::from_millis(millis);
        }
        if let Some(count) = parse::<usize>(&lookup, "EVENT_MAX_COUNT")? {
            manager.event_retention.max_events = count;
        }
        if let Some(secs) = parse::<u64>(&lookup, "EVENT_MAX_AGE_SECS")? {
            manager.event_retention.max_age = (secs > 0).then(|| Duration::from_secs(secs));
        }

        let discovery_interval = parse::<u64>(&lookup, "DISCOVERY_INTERVAL_SECS")?
            .map(|secs| Duration::from_secs(secs.max(1)))
            .unwrap_or(Duration::from_secs(5));
        let max_stats_per_container =
            parse::<usize>(&lookup, "MAX_STATS_PER_CONTAINER")?.unwrap_or(120);

        Ok(Self {
            rootfs,
            cgroup_root,
            listen_addr,
            discovery_interval,
            max_stats_per_container,
            manager,
        })
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::InvalidValue { key, value }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.rootfs, PathBuf::from("/"));
        assert_eq!(config.cgroup_root, PathBuf::from("/sys/fs/cgroup"));
        assert_eq!(config.listen_addr, "0.0.0.0:3000");
        assert_eq!(config.manager, ManagerConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("ROOTFS_MOUNT_PATH", "/rootfs"),
            ("HANDLER_TIMEOUT_MS", "250"),
            ("EVENT_MAX_COUNT", "10"),
            ("EVENT_MAX_AGE_SECS", "0"),
            ("MAX_STATS_PER_CONTAINER", "16"),
        ]))
        .unwrap();
        assert_eq!(config.cgroup_root, PathBuf::from("/rootfs/sys/fs/cgroup"));
        assert_eq!(config.manager.handler_timeout, Duration::from_millis(250));
        assert_eq!(config.manager.event_retention.max_events, 10);
        assert_eq!(config.manager.event_retention.max_age, None);
        assert_eq!(config.max_stats_per_container, 16);
    }

    #[test]
    fn test_invalid_value() {
        let err = Config::from_lookup(lookup_from(&[("HOUSEKEEPING_INTERVAL_SECS", "soon")]))
            .unwrap_err();
        match err {
            Error::InvalidValue { key, value } => {
                assert_eq!(key, "HOUSEKEEPING_INTERVAL_SECS");
                assert_eq!(value, "soon");
            }
        }
    }
}
