//! Container lifecycle events.
//!
//! The [`EventStore`] is an append-only log with FIFO retention. Consumers either pull a
//! filtered snapshot with [`EventStore::get_events`] or follow new events through an
//! [`EventWatch`], which is fed by the same append path.
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const DEFAULT_MAX_EVENTS: usize = 100_000;
const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_WATCH_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ContainerCreation,
    ContainerDeletion,
    Oom,
    OomKill,
}

impl EventType {
    pub const ALL: [EventType; 4] = [
        EventType::ContainerCreation,
        EventType::ContainerDeletion,
        EventType::Oom,
        EventType::OomKill,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ContainerCreation => "container_creation",
            EventType::ContainerDeletion => "container_deletion",
            EventType::Oom => "oom",
            EventType::OomKill => "oom_kill",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown event type `{0}`")]
pub struct UnknownEventType(String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "container_creation" | "creation" => Ok(EventType::ContainerCreation),
            "container_deletion" | "deletion" => Ok(EventType::ContainerDeletion),
            "oom" => Ok(EventType::Oom),
            "oom_kill" | "oomKill" => Ok(EventType::OomKill),
            _ => Err(UnknownEventType(s.to_owned())),
        }
    }
}

/// Something that happened to a container. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub container_name: String,
    pub timestamp: SystemTime,
    pub event_type: EventType,
}

impl Event {
    pub fn new(container_name: impl Into<String>, event_type: EventType) -> Self {
        Self::at(container_name, event_type, SystemTime::now())
    }

    pub fn at(container_name: impl Into<String>, event_type: EventType, timestamp: SystemTime) -> Self {
        Self {
            container_name: container_name.into(),
            timestamp,
            event_type,
        }
    }
}

/// Selects events. An empty type set selects nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventRequest {
    pub event_types: HashSet<EventType>,
    /// Inclusive lower bound.
    pub start: Option<SystemTime>,
    /// Inclusive upper bound.
    pub end: Option<SystemTime>,
    pub container_name: Option<String>,
    /// Also match containers below [`Self::container_name`].
    pub include_subcontainers: bool,
    /// Keep only the most recent `max_events` matches.
    pub max_events: Option<usize>,
}

impl EventRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_types(types: impl IntoIterator<Item = EventType>) -> Self {
        Self {
            event_types: types.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn matches(&self, event: &Event) -> bool {
        if !self.event_types.contains(&event.event_type) {
            return false;
        }
        if self.start.is_some_and(|start| event.timestamp < start)
            || self.end.is_some_and(|end| event.timestamp > end)
        {
            return false;
        }
        match &self.container_name {
            None => true,
            Some(name) if *name == event.container_name => true,
            Some(name) => self.include_subcontainers && is_below(&event.container_name, name),
        }
    }
}

fn is_below(candidate: &str, parent: &str) -> bool {
    if parent == "/" {
        return candidate.starts_with('/') && candidate.len() > 1;
    }
    candidate
        .strip_prefix(parent)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Bounds on how much history the store keeps. Whichever bound is hit first applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_events: usize,
    pub max_age: Option<Duration>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_events: DEFAULT_MAX_EVENTS,
            max_age: Some(DEFAULT_MAX_AGE),
        }
    }
}

#[derive(Debug)]
pub struct EventStore {
    events: Mutex<VecDeque<Event>>,
    policy: RetentionPolicy,
    watchers: broadcast::Sender<Event>,
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new(RetentionPolicy::default(), DEFAULT_WATCH_CAPACITY)
    }
}

impl EventStore {
    pub fn new(policy: RetentionPolicy, watch_capacity: usize) -> Self {
        let (watchers, _) = broadcast::channel(watch_capacity.max(1));
        Self {
            events: Mutex::new(VecDeque::new()),
            policy,
            watchers,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Event>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `event`, evicting the oldest entries beyond the count bound, and forwards it
    /// to every active watch.
    pub fn add_event(&self, event: Event) {
        log::trace!(
            "Recording event: type={}, container={}",
            event.event_type,
            event.container_name
        );
        {
            let mut events = self.lock();
            events.push_back(event.clone());
            while events.len() > self.policy.max_events {
                events.pop_front();
            }
        }
        // No receivers is not an error.
        let _ = self.watchers.send(event);
    }

    /// Returns the matching events ordered by timestamp, ties in insertion order.
    pub fn get_events(&self, request: &EventRequest) -> Vec<Event> {
        let mut out: Vec<Event> = self
            .lock()
            .iter()
            .filter(|event| request.matches(event))
            .cloned()
            .collect();
        out.sort_by_key(|event| event.timestamp);
        if let Some(max) = request.max_events {
            if out.len() > max {
                out.drain(..out.len() - max);
            }
        }
        out
    }

    /// Drops every event older than the configured maximum age, wherever it sits in the log.
    /// Returns how many were dropped.
    pub fn prune(&self, now: SystemTime) -> usize {
        let Some(max_age) = self.policy.max_age else {
            return 0;
        };
        let Some(cutoff) = now.checked_sub(max_age) else {
            return 0;
        };
        let mut events = self.lock();
        let before = events.len();
        events.retain(|event| event.timestamp >= cutoff);
        before - events.len()
    }

    /// Follows events appended from now on that match `request`.
    pub fn watch(&self, request: EventRequest) -> EventWatch {
        EventWatch {
            request,
            rx: self.watchers.subscribe(),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// A live, filtered feed of new events.
#[derive(Debug)]
pub struct EventWatch {
    request: EventRequest,
    rx: broadcast::Receiver<Event>,
}

impl EventWatch {
    /// Waits for the next matching event. Returns `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.request.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("event watch fell behind, skipped {skipped} events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
