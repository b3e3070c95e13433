//! Stats storage backends.
//!
//! The manager only relies on the [`StatsStore`] trait: samples are appended per container
//! and read back as a bounded, chronologically ordered range. Retention is up to the
//! backend.
mod memory;

use std::fmt;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::container::ContainerReference;
use crate::info::ContainerStats;

pub use memory::InMemoryStatsStore;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no stats recorded for container `{0}`")]
    UnknownContainer(String),
    #[error("stats store is closed")]
    Closed,
    #[error("stats backend failure: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[async_trait]
pub trait StatsStore: fmt::Debug + Send + Sync {
    /// Appends a sample for the referenced container.
    async fn add_stats(&self, reference: &ContainerReference, stats: ContainerStats) -> Result<()>;

    /// Returns up to `max` of the most recent samples inside the inclusive `[start, end]`
    /// window, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownContainer`] if nothing was ever recorded for `name`.
    async fn recent_stats(
        &self,
        name: &str,
        start: Option<SystemTime>,
        end: Option<SystemTime>,
        max: Option<usize>,
    ) -> Result<Vec<ContainerStats>>;

    /// Forgets everything recorded for `name`.
    async fn remove_container(&self, _name: &str) -> Result<()> {
        Ok(())
    }
}
