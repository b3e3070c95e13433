//! Finds containers to monitor without being told about them.
mod cgroup;

pub use cgroup::{CgroupWatcher, Error, SyncReport};
