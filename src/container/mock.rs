//! Scriptable handler and factory for tests. Every call is counted so tests can check how
//! often the registry reached out to a container.
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use crate::info::{ContainerSpec, ContainerStats, CpuSpec, CpuStats, MemorySpec, MemoryStats};

use super::factory::HandlerFactory;
use super::handler::{self, ContainerHandler, ContainerReference, ListType};

#[derive(Debug)]
pub(crate) struct MockHandler {
    reference: ContainerReference,
    spec: Mutex<ContainerSpec>,
    children: Mutex<Vec<ContainerReference>>,
    delay: Option<Duration>,
    fail_spec: AtomicBool,
    fail_stats: AtomicBool,
    exists: AtomicBool,
    cleaned_up: AtomicBool,
    spec_calls: AtomicUsize,
    stats_calls: AtomicUsize,
    list_calls: AtomicUsize,
    samples: AtomicU64,
}

impl MockHandler {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            reference: ContainerReference::new(name),
            spec: Mutex::new(spec_for(name)),
            children: Mutex::new(Vec::new()),
            delay: None,
            fail_spec: AtomicBool::new(false),
            fail_stats: AtomicBool::new(false),
            exists: AtomicBool::new(true),
            cleaned_up: AtomicBool::new(false),
            spec_calls: AtomicUsize::new(0),
            stats_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            samples: AtomicU64::new(0),
        }
    }

    pub(crate) fn with_alias(mut self, namespace: &str, alias: &str) -> Self {
        self.reference.namespace = namespace.to_owned();
        self.reference.aliases = vec![alias.to_owned()];
        self
    }

    pub(crate) fn with_children(self, children: &[&str]) -> Self {
        *self.children.lock().unwrap() = children
            .iter()
            .map(|child| ContainerReference::new(*child))
            .collect();
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn failing_stats(self) -> Self {
        self.fail_stats(true);
        self
    }

    pub(crate) fn name(&self) -> &str {
        &self.reference.name
    }

    pub(crate) fn fail_stats(&self, fail: bool) {
        self.fail_stats.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_spec(&self, fail: bool) {
        self.fail_spec.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_exists(&self, exists: bool) {
        self.exists.store(exists, Ordering::SeqCst);
    }

    pub(crate) fn spec_calls(&self) -> usize {
        self.spec_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn stats_calls(&self) -> usize {
        self.stats_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn cleaned_up(&self) -> bool {
        self.cleaned_up.load(Ordering::SeqCst)
    }

    fn pause(&self) {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
    }
}

impl ContainerHandler for MockHandler {
    fn reference(&self) -> handler::Result<ContainerReference> {
        Ok(self.reference.clone())
    }

    fn spec(&self) -> handler::Result<ContainerSpec> {
        self.spec_calls.fetch_add(1, Ordering::SeqCst);
        self.pause();
        if self.fail_spec.load(Ordering::SeqCst) {
            return Err(handler::Error::Other(format!("spec of {} unavailable", self.name())));
        }
        Ok(self.spec.lock().unwrap().clone())
    }

    fn stats(&self) -> handler::Result<ContainerStats> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        self.pause();
        if self.fail_stats.load(Ordering::SeqCst) {
            return Err(handler::Error::Other(format!("stats of {} unavailable", self.name())));
        }
        let n = self.samples.fetch_add(1, Ordering::SeqCst);
        let mut stats = ContainerStats::new(SystemTime::now());
        stats.cpu = Some(CpuStats {
            usage_usec: 1_000 * (n + 1),
            ..Default::default()
        });
        Ok(stats)
    }

    fn list_containers(&self, _list_type: ListType) -> handler::Result<Vec<ContainerReference>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.pause();
        Ok(self.children.lock().unwrap().clone())
    }

    fn exists(&self) -> bool {
        self.exists.load(Ordering::SeqCst)
    }

    fn cleanup(&self) {
        self.cleaned_up.store(true, Ordering::SeqCst);
    }
}

/// Claims every name starting with `prefix` and hands out [`MockHandler`]s.
#[derive(Debug)]
pub(crate) struct MockFactory {
    name: String,
    prefix: String,
    alias_namespace: Option<String>,
    fail: bool,
    tweak: fn(MockHandler) -> MockHandler,
    created: Mutex<Vec<Arc<MockHandler>>>,
}

impl MockFactory {
    pub(crate) fn for_prefix(name: &str, prefix: &str) -> Self {
        Self {
            name: name.to_owned(),
            prefix: prefix.to_owned(),
            alias_namespace: None,
            fail: false,
            tweak: |handler| handler,
            created: Mutex::new(Vec::new()),
        }
    }

    /// Claims `/docker/<id>` and aliases it as `docker:<id>`.
    pub(crate) fn docker() -> Self {
        Self {
            alias_namespace: Some("docker".to_owned()),
            ..Self::for_prefix("docker", "/docker/")
        }
    }

    pub(crate) fn failing(prefix: &str) -> Self {
        Self {
            fail: true,
            ..Self::for_prefix("failing", prefix)
        }
    }

    pub(crate) fn with_tweak(mut self, tweak: fn(MockHandler) -> MockHandler) -> Self {
        self.tweak = tweak;
        self
    }

    pub(crate) fn created(&self) -> Vec<Arc<MockHandler>> {
        self.created.lock().unwrap().clone()
    }

    pub(crate) fn handler(&self, name: &str) -> Option<Arc<MockHandler>> {
        self.created()
            .into_iter()
            .find(|handler| handler.name() == name)
    }
}

impl HandlerFactory for MockFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn new_handler(
        &self,
        container_name: &str,
    ) -> handler::Result<Option<Box<dyn ContainerHandler>>> {
        if !container_name.starts_with(&self.prefix) {
            return Ok(None);
        }
        if self.fail {
            return Err(handler::Error::Other(format!(
                "cannot construct handler for {container_name}"
            )));
        }
        let mut handler = MockHandler::new(container_name);
        if let Some(namespace) = &self.alias_namespace {
            let alias = container_name.trim_start_matches(&self.prefix);
            handler = handler.with_alias(namespace, alias);
        }
        let handler = Arc::new((self.tweak)(handler));
        self.created.lock().unwrap().push(Arc::clone(&handler));
        Ok(Some(Box::new(handler)))
    }
}

fn seed(name: &str) -> u64 {
    name.bytes()
        .fold(17u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)))
}

/// A spec whose values depend only on `name`.
pub(crate) fn spec_for(name: &str) -> ContainerSpec {
    let seed = seed(name);
    ContainerSpec {
        creation_time: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000 + seed % 1_000)),
        labels: [("name".to_owned(), name.to_owned())].into_iter().collect(),
        image: Some(format!("registry.local/{}", seed % 97)),
        has_cpu: true,
        cpu: CpuSpec {
            quota_usec: Some(10_000 + seed % 90_000),
            period_usec: 100_000,
        },
        has_memory: true,
        memory: MemorySpec {
            limit_bytes: Some((seed % 64 + 1) * 1024 * 1024),
        },
    }
}

/// `count` samples spaced `interval` apart, oldest first, ending at `end`.
pub(crate) fn stats_for(name: &str, count: usize, interval: Duration, end: SystemTime) -> Vec<ContainerStats> {
    let seed = seed(name);
    (0..count as u64)
        .map(|i| {
            let back = interval * (count as u64 - 1 - i) as u32;
            ContainerStats {
                timestamp: end - back,
                cpu: Some(CpuStats {
                    usage_usec: seed % 1_000 + i * 1_000,
                    user_usec: i * 600,
                    system_usec: i * 400,
                    ..Default::default()
                }),
                memory: Some(MemoryStats {
                    usage_bytes: 4096 * (i + 1),
                    anon: 1024 * (i + 1),
                    ..Default::default()
                }),
            }
        })
        .collect()
}

/// Host facts without touching the filesystem.
#[derive(Debug, Default)]
pub(crate) struct MockHost;

impl crate::host::HostInfo for MockHost {
    fn machine_info(&self) -> crate::host::Result<crate::info::MachineInfo> {
        Ok(crate::info::MachineInfo {
            machine_id: "0123456789abcdef0123456789abcdef".to_owned(),
            hostname: "test-host".to_owned(),
            num_cores: 4,
            memory_capacity_bytes: 8 * 1024 * 1024 * 1024,
        })
    }
}
