use std::collections::VecDeque;
use std::time::SystemTime;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::container::ContainerReference;
use crate::info::ContainerStats;

use super::{Error, Result, StatsStore};

/// Keeps the last `max_stats` samples of every container in memory.
#[derive(Debug)]
pub struct InMemoryStatsStore {
    max_stats: usize,
    containers: DashMap<String, VecDeque<ContainerStats>>,
}

impl InMemoryStatsStore {
    /// Creates a store retaining at most `max_stats` samples per container.
    ///
    /// A `max_stats` of zero is treated as one.
    pub fn new(max_stats: usize) -> Self {
        Self {
            max_stats: max_stats.max(1),
            containers: DashMap::new(),
        }
    }

    pub fn max_stats(&self) -> usize {
        self.max_stats
    }

    /// Number of containers with at least one recorded sample.
    pub fn size(&self) -> usize {
        self.containers.len()
    }
}

#[async_trait]
impl StatsStore for InMemoryStatsStore {
    async fn add_stats(&self, reference: &ContainerReference, stats: ContainerStats) -> Result<()> {
        let mut buffer = self
            .containers
            .entry(reference.name.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.max_stats.min(64)));
        if buffer.len() == self.max_stats {
            buffer.pop_front();
        }
        buffer.push_back(stats);
        Ok(())
    }

    async fn recent_stats(
        &self,
        name: &str,
        start: Option<SystemTime>,
        end: Option<SystemTime>,
        max: Option<usize>,
    ) -> Result<Vec<ContainerStats>> {
        let buffer = self
            .containers
            .get(name)
            .ok_or_else(|| Error::UnknownContainer(name.to_owned()))?;

        let max = max.unwrap_or(usize::MAX);
        let mut out: Vec<ContainerStats> = buffer
            .iter()
            .rev()
            .filter(|stats| stats.is_within(start, end))
            .take(max)
            .cloned()
            .collect();
        out.reverse();
        Ok(out)
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        self.containers.remove(name);
        Ok(())
    }
}
