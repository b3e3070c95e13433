use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant, SystemTime};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::info::{ContainerInfo, ContainerInfoRequest, ContainerSpec, ContainerStats};
use crate::storage::{self, StatsStore};

use super::handler::{BlockingHandler, ContainerHandler, ContainerReference, ListType};

const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(10);

/// Who is responsible for noticing that a container went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchSource {
    /// Created through the API; housekeeping removes it once the handler reports it gone.
    Api,
    /// Created by the cgroup watcher, which also destroys it.
    Cgroup,
}

/// How a [`ContainerData`] talks to its handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionPolicy {
    /// Upper bound for a single handler call.
    pub handler_timeout: Duration,
    /// How long a fetched spec may be served before it is fetched again.
    /// `None` keeps the first successfully fetched spec for the container's lifetime.
    pub spec_max_age: Option<Duration>,
}

impl Default for CollectionPolicy {
    fn default() -> Self {
        Self {
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            spec_max_age: None,
        }
    }
}

#[derive(Debug)]
struct CachedSpec {
    spec: Arc<ContainerSpec>,
    fetched_at: Instant,
}

/// The monitoring state of one container.
///
/// The cached spec is replaced as a whole on refresh, so concurrent readers see either the
/// old or the new value. Stats live in the shared [`StatsStore`]; a query running next to a
/// housekeeping pass may miss the sample that pass is about to append, i.e. query results are
/// at most one collection interval behind.
#[derive(Debug)]
pub struct ContainerData {
    reference: ContainerReference,
    handler: BlockingHandler,
    stats_store: Arc<dyn StatsStore>,
    spec: RwLock<Option<Arc<CachedSpec>>>,
    watch_source: WatchSource,
    created_at: SystemTime,
    policy: CollectionPolicy,
    /// Set once the container left the registry; no samples are stored afterwards.
    stopped: AtomicBool,
}

impl ContainerData {
    pub fn new(
        reference: ContainerReference,
        handler: Box<dyn ContainerHandler>,
        stats_store: Arc<dyn StatsStore>,
        watch_source: WatchSource,
        policy: CollectionPolicy,
    ) -> Self {
        Self {
            reference,
            handler: BlockingHandler::new(handler),
            stats_store,
            spec: RwLock::new(None),
            watch_source,
            created_at: SystemTime::now(),
            policy,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.reference.name
    }

    pub fn reference(&self) -> &ContainerReference {
        &self.reference
    }

    pub fn watch_source(&self) -> WatchSource {
        self.watch_source
    }

    /// When this container was registered.
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// The last fetched spec, without touching the handler.
    pub fn cached_spec(&self) -> Option<Arc<ContainerSpec>> {
        self.cached().map(|cached| Arc::clone(&cached.spec))
    }

    fn cached(&self) -> Option<Arc<CachedSpec>> {
        self.spec
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_spec_stale(&self) -> bool {
        match (self.cached(), self.policy.spec_max_age) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(cached), Some(max_age)) => cached.fetched_at.elapsed() > max_age,
        }
    }

    /// Returns the cached spec, fetching it from the handler if it is missing or stale.
    pub async fn spec(&self) -> Result<Arc<ContainerSpec>> {
        self.spec_within(self.policy.handler_timeout).await
    }

    async fn spec_within(&self, timeout: Duration) -> Result<Arc<ContainerSpec>> {
        if !self.is_spec_stale() {
            if let Some(spec) = self.cached_spec() {
                return Ok(spec);
            }
        }
        self.refresh_spec(timeout).await
    }

    /// Fetches the spec from the handler and publishes it.
    pub async fn refresh_spec(&self, timeout: Duration) -> Result<Arc<ContainerSpec>> {
        let spec = self
            .handler
            .run(timeout, |handler| handler.spec())
            .await
            .map_err(|err| Error::handler(self.name(), err))?;
        let spec = Arc::new(spec);
        let cached = Arc::new(CachedSpec {
            spec: Arc::clone(&spec),
            fetched_at: Instant::now(),
        });
        *self.spec.write().unwrap_or_else(PoisonError::into_inner) = Some(cached);
        Ok(spec)
    }

    /// Lists the container's children as currently reported by the handler.
    pub async fn subcontainers(
        &self,
        list_type: ListType,
        timeout: Duration,
    ) -> Result<Vec<ContainerReference>> {
        self.handler
            .run(timeout, move |handler| handler.list_containers(list_type))
            .await
            .map_err(|err| Error::handler(self.name(), err))
    }

    /// Assembles spec, direct subcontainers and the requested stats.
    pub async fn info(&self, request: &ContainerInfoRequest) -> Result<ContainerInfo> {
        let timeout = request.timeout.unwrap_or(self.policy.handler_timeout);
        let (spec, subcontainers, stats) = tokio::try_join!(
            self.spec_within(timeout),
            self.subcontainers(ListType::Direct, timeout),
            self.recent_stats(request, timeout),
        )?;

        Ok(ContainerInfo {
            reference: self.reference.clone(),
            subcontainers,
            spec: ContainerSpec::clone(&spec),
            stats,
        })
    }

    async fn recent_stats(
        &self,
        request: &ContainerInfoRequest,
        timeout: Duration,
    ) -> Result<Vec<ContainerStats>> {
        match self.read_stats(request).await {
            Err(storage::Error::UnknownContainer(_)) => {}
            other => return other.map_err(|err| Error::storage(self.name(), err)),
        }

        log::debug!(
            "No stats recorded for `{}` yet, collecting synchronously",
            self.name()
        );
        self.collect_stats(timeout).await?;
        match self.read_stats(request).await {
            Err(storage::Error::UnknownContainer(_)) => Ok(Vec::new()),
            other => other.map_err(|err| Error::storage(self.name(), err)),
        }
    }

    async fn read_stats(&self, request: &ContainerInfoRequest) -> storage::Result<Vec<ContainerStats>> {
        self.stats_store
            .recent_stats(self.name(), request.start, request.end, request.num_stats)
            .await
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    async fn collect_stats(&self, timeout: Duration) -> Result<()> {
        let stats = self
            .handler
            .run(timeout, |handler| handler.stats())
            .await
            .map_err(|err| Error::handler(self.name(), err))?;
        if self.is_stopped() {
            return Ok(());
        }
        self.stats_store
            .add_stats(&self.reference, stats)
            .await
            .map_err(|err| Error::storage(self.name(), err))?;
        // `stop` ran while the sample was appended; drop what it could not see.
        if self.is_stopped() {
            self.stats_store
                .remove_container(self.name())
                .await
                .map_err(|err| Error::storage(self.name(), err))?;
        }
        Ok(())
    }

    /// One periodic refresh: re-fetches a stale spec and appends a fresh stats sample.
    ///
    /// A failed spec refresh is logged and keeps the previous spec; a failed stats
    /// collection is returned so the driver can report it. Either way the data already
    /// cached stays valid.
    pub async fn housekeep(&self) -> Result<()> {
        if self.is_spec_stale() {
            if let Err(err) = self.refresh_spec(self.policy.handler_timeout).await {
                log::warn!(target: "housekeeping", "keeping previous spec: {err}");
            }
        }
        self.collect_stats(self.policy.handler_timeout).await
    }

    /// Asks the handler whether the container is still there. A handler that does not
    /// answer in time counts as present.
    pub async fn exists(&self) -> bool {
        self.handler
            .run(self.policy.handler_timeout, |handler| Ok(handler.exists()))
            .await
            .unwrap_or(true)
    }

    /// Releases the handler and the container's stored samples. Samples collected by a
    /// housekeeping pass still in flight are discarded.
    pub(crate) async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Err(err) = self.stats_store.remove_container(self.name()).await {
            log::warn!("failed to drop stats of `{}`: {}", self.name(), err);
        }
        self.release_handler().await;
    }

    /// Releases the handler only, leaving stored samples alone.
    pub(crate) async fn release_handler(&self) {
        let cleanup = self
            .handler
            .run(self.policy.handler_timeout, |handler| {
                handler.cleanup();
                Ok(())
            })
            .await;
        if let Err(err) = cleanup {
            log::warn!("failed to clean up handler of `{}`: {}", self.name(), err);
        }
    }
}
