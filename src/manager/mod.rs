//! The per-host container registry.
//!
//! [`Manager`] maps every [`NamespacedName`] of a monitored container to its shared
//! [`ContainerData`]. Canonical names and runtime aliases point at the same value, and a
//! container's keys are inserted and removed under one write lock, so lookups never see a
//! half registered or half removed container.
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};

use crate::config::ManagerConfig;
use crate::container::factory::{self, FactoryRegistry, HandlerFactory};
use crate::container::handler::{self, ContainerHandler, ContainerReference, ListType};
use crate::container::{ContainerData, DOCKER_NAMESPACE, NamespacedName, WatchSource};
use crate::error::{Error, Result};
use crate::events::{Event, EventRequest, EventStore, EventType, EventWatch};
use crate::host::HostInfo;
use crate::info::{ContainerInfo, ContainerInfoRequest, MachineInfo};
use crate::storage::StatsStore;

mod housekeeping;

pub use housekeeping::HousekeepingReport;

type ContainerMap = HashMap<NamespacedName, Arc<ContainerData>>;

/// Outcome of a subtree query. Containers that could not be assembled are listed in
/// `failures` instead of failing the whole query.
#[derive(Debug, Default)]
pub struct RequestedContainers {
    pub containers: HashMap<String, ContainerInfo>,
    pub failures: HashMap<String, Error>,
}

impl RequestedContainers {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct ManagerBuilder {
    stats_store: Option<Arc<dyn StatsStore>>,
    host: Option<Arc<dyn HostInfo>>,
    config: ManagerConfig,
    factories: Vec<Arc<dyn HandlerFactory>>,
}

impl ManagerBuilder {
    pub fn set_stats_store(&mut self, stats_store: Arc<dyn StatsStore>) -> &mut Self {
        self.stats_store = Some(stats_store);
        self
    }

    pub fn set_host(&mut self, host: Arc<dyn HostInfo>) -> &mut Self {
        self.host = Some(host);
        self
    }

    pub fn set_config(&mut self, config: ManagerConfig) -> &mut Self {
        self.config = config;
        self
    }

    pub fn add_factory(&mut self, factory: Arc<dyn HandlerFactory>) -> &mut Self {
        self.factories.push(factory);
        self
    }

    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if no stats store or no host was provided.
    pub fn build(self) -> Result<Manager> {
        let stats_store = self
            .stats_store
            .ok_or_else(|| Error::Configuration("a stats store is required".to_owned()))?;
        let host = self
            .host
            .ok_or_else(|| Error::Configuration("host information is required".to_owned()))?;

        let factories = FactoryRegistry::default();
        for factory in self.factories {
            factories.register(factory);
        }
        let (shutdown, _) = watch::channel(false);

        Ok(Manager {
            containers: RwLock::new(HashMap::new()),
            events: EventStore::new(self.config.event_retention, self.config.watch_capacity),
            stats_store,
            host,
            factories,
            config: self.config,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        })
    }
}

#[derive(Debug)]
pub struct Manager {
    containers: RwLock<ContainerMap>,
    events: EventStore,
    stats_store: Arc<dyn StatsStore>,
    host: Arc<dyn HostInfo>,
    factories: FactoryRegistry,
    config: ManagerConfig,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Manager {
    /// Creates a manager with the default configuration and no handler factories.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `stats_store` or `host` is missing.
    pub fn new(
        stats_store: Option<Arc<dyn StatsStore>>,
        host: Option<Arc<dyn HostInfo>>,
    ) -> Result<Self> {
        let mut builder = ManagerBuilder::default();
        if let Some(stats_store) = stats_store {
            builder.set_stats_store(stats_store);
        }
        if let Some(host) = host {
            builder.set_host(host);
        }
        builder.build()
    }

    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::default()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, ContainerMap> {
        self.containers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ContainerMap> {
        self.containers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a factory with lower priority than every factory registered before it.
    pub fn register_factory(&self, factory: Arc<dyn HandlerFactory>) {
        self.factories.register(factory);
    }

    /// Starts monitoring `name` on behalf of an API caller. See [`Self::create_container_with_source`].
    pub async fn create_container(&self, name: &str) -> Result<()> {
        self.create_container_with_source(name, WatchSource::Api).await
    }

    /// Starts monitoring `name`. Creating a container that is already monitored is a no-op.
    ///
    /// On success the container is reachable under its canonical name and every alias its
    /// handler reports, and exactly one creation event has been recorded.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if no registered factory accepts `name`.
    /// - [`Error::Handler`] if the accepting factory or the new handler fails.
    pub async fn create_container_with_source(
        &self,
        name: &str,
        watch_source: WatchSource,
    ) -> Result<()> {
        let canonical = NamespacedName::canonical(name);
        if self.read().contains_key(&canonical) {
            log::trace!("Container `{name}` is already monitored");
            return Ok(());
        }

        let (factory_name, handler, reference) = self.build_handler(name).await?;
        let data = Arc::new(ContainerData::new(
            reference,
            handler,
            Arc::clone(&self.stats_store),
            watch_source,
            self.config.collection_policy(),
        ));
        let aliases = NamespacedName::aliases_of(data.reference());

        let registered = {
            let mut containers = self.write();
            if containers.contains_key(&canonical) {
                false
            } else {
                containers.insert(canonical, Arc::clone(&data));
                for alias in &aliases {
                    match containers.get(alias) {
                        Some(other) => log::warn!(
                            "Alias `{}` of `{}` is already taken by `{}`",
                            alias,
                            name,
                            other.name()
                        ),
                        None => {
                            containers.insert(alias.clone(), Arc::clone(&data));
                        }
                    }
                }
                self.events.add_event(Event::at(
                    name,
                    EventType::ContainerCreation,
                    data.created_at(),
                ));
                true
            }
        };

        if !registered {
            // Lost the race against a concurrent create; only the handler is ours.
            data.release_handler().await;
            return Ok(());
        }
        log::info!(
            "Monitoring container `{}` (factory={}, source={:?}, aliases={})",
            name,
            factory_name,
            watch_source,
            aliases.len()
        );
        Ok(())
    }

    async fn build_handler(
        &self,
        name: &str,
    ) -> Result<(String, Box<dyn ContainerHandler>, ContainerReference)> {
        let factories = self.factories.snapshot();
        let owned = name.to_owned();
        let timeout = self.config.handler_timeout;
        let task = tokio::task::spawn_blocking(move || {
            let Some((factory_name, handler)) = factory::new_handler(&factories, &owned)? else {
                return Ok(None);
            };
            match handler.reference() {
                Ok(mut reference) => {
                    if reference.name != owned {
                        log::warn!(
                            "Handler of `{}` reports itself as `{}`",
                            owned,
                            reference.name
                        );
                        reference.name = owned;
                    }
                    Ok(Some((factory_name, handler, reference)))
                }
                Err(err) => {
                    handler.cleanup();
                    Err(err)
                }
            }
        });

        let built = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(handler::Error::Panicked(join_err.to_string())),
            Err(_) => Err(handler::Error::Timeout(timeout)),
        };
        built
            .map_err(|err| Error::handler(name, err))?
            .ok_or_else(|| Error::NotFound(name.to_owned()))
    }

    /// Stops monitoring `name` and every alias of it.
    ///
    /// Records exactly one deletion event, timestamped no earlier than the container's
    /// creation event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `name` is not monitored.
    pub async fn destroy_container(&self, name: &str) -> Result<()> {
        let data = {
            let mut containers = self.write();
            let data = containers
                .get(&NamespacedName::canonical(name))
                .cloned()
                .ok_or_else(|| Error::NotFound(name.to_owned()))?;
            containers.retain(|_, other| !Arc::ptr_eq(other, &data));

            let timestamp = SystemTime::now().max(data.created_at());
            self.events
                .add_event(Event::at(name, EventType::ContainerDeletion, timestamp));
            data
        };

        data.stop().await;
        log::info!("Stopped monitoring container `{name}`");
        Ok(())
    }

    pub fn get_container(&self, name: &NamespacedName) -> Option<Arc<ContainerData>> {
        self.read().get(name).cloned()
    }

    /// Every monitored container once, ordered by canonical name.
    pub fn containers(&self) -> Vec<Arc<ContainerData>> {
        let mut out: Vec<Arc<ContainerData>> = self
            .read()
            .iter()
            .filter(|(key, _)| key.is_canonical())
            .map(|(_, data)| Arc::clone(data))
            .collect();
        out.sort_by(|a, b| a.name().cmp(b.name()));
        out
    }

    /// Canonical names of the containers registered by `watch_source`.
    pub fn container_names(&self, watch_source: WatchSource) -> Vec<String> {
        self.containers()
            .into_iter()
            .filter(|data| data.watch_source() == watch_source)
            .map(|data| data.name().to_owned())
            .collect()
    }

    /// Maps an alias to the canonical name of the container it belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the alias is not registered.
    pub fn resolve_alias_name(&self, namespace: &str, alias: &str) -> Result<NamespacedName> {
        let key = NamespacedName::new(namespace, alias);
        self.get_container(&key)
            .map(|data| NamespacedName::canonical(data.name()))
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    /// # Errors
    ///
    /// - [`Error::NotFound`] if `name` is not monitored.
    /// - [`Error::Handler`] or [`Error::Storage`] if assembling the info fails.
    pub async fn get_container_info(
        &self,
        name: &str,
        request: &ContainerInfoRequest,
    ) -> Result<ContainerInfo> {
        let data = self
            .get_container(&NamespacedName::canonical(name))
            .ok_or_else(|| Error::NotFound(name.to_owned()))?;
        data.info(request).await
    }

    /// Looks a docker container up by its id, i.e. its alias in the docker namespace.
    pub async fn get_docker_container(
        &self,
        id: &str,
        request: &ContainerInfoRequest,
    ) -> Result<ContainerInfo> {
        let key = NamespacedName::new(DOCKER_NAMESPACE, id);
        let data = self
            .get_container(&key)
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        data.info(request).await
    }

    /// Assembles the info of `root` and every monitored container below it.
    ///
    /// Containers are queried concurrently, at most
    /// [`ManagerConfig::max_concurrency`] at a time. A container that cannot be
    /// assembled is recorded in [`RequestedContainers::failures`] and the rest of the
    /// tree is still returned; its children are still visited if the handler can list
    /// them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `root` itself is not monitored.
    pub async fn get_requested_containers(
        &self,
        root: &str,
        request: &ContainerInfoRequest,
    ) -> Result<RequestedContainers> {
        let root_data = self
            .get_container(&NamespacedName::canonical(root))
            .ok_or_else(|| Error::NotFound(root.to_owned()))?;

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let list_timeout = request.timeout.unwrap_or(self.config.handler_timeout);
        let mut visited = HashSet::from([root_data.name().to_owned()]);
        let mut frontier = vec![root_data];
        let mut out = RequestedContainers::default();

        while !frontier.is_empty() {
            let mut set = JoinSet::new();
            let mut names = HashMap::new();
            for data in frontier.drain(..) {
                let semaphore = Arc::clone(&semaphore);
                let request = request.clone();
                let name = data.name().to_owned();
                let handle = set.spawn(async move {
                    // The semaphore is never closed.
                    let _permit = semaphore.acquire_owned().await.ok();
                    let info = data.info(&request).await;
                    let children = match &info {
                        Ok(info) => Ok(info.subcontainers.clone()),
                        Err(_) => data.subcontainers(ListType::Direct, list_timeout).await,
                    };
                    (info, children)
                });
                names.insert(handle.id(), name);
            }

            while let Some(joined) = set.join_next_with_id().await {
                let (id, (info, children)) = match joined {
                    Ok(done) => done,
                    Err(join_err) => {
                        let name = names.remove(&join_err.id()).unwrap_or_default();
                        log::error!("Query of container `{name}` failed: {join_err}");
                        out.failures.insert(
                            name.clone(),
                            Error::handler(name, handler::Error::Panicked(join_err.to_string())),
                        );
                        continue;
                    }
                };
                let name = names.remove(&id).unwrap_or_default();

                match info {
                    Ok(info) => {
                        out.containers.insert(name.clone(), info);
                    }
                    Err(err) => {
                        log::warn!("Leaving `{name}` out of the query result: {err}");
                        out.failures.insert(name.clone(), err);
                    }
                }

                let children = match children {
                    Ok(children) => children,
                    Err(err) => {
                        log::warn!("Cannot list children of `{name}`: {err}");
                        continue;
                    }
                };
                for child in children {
                    if !visited.insert(child.name.clone()) {
                        continue;
                    }
                    match self.get_container(&NamespacedName::canonical(&child.name)) {
                        Some(data) => frontier.push(data),
                        None => {
                            log::debug!("Child `{}` of `{}` is not monitored", child.name, name);
                            out.failures
                                .insert(child.name.clone(), Error::NotFound(child.name));
                        }
                    }
                }
            }
        }

        Ok(out)
    }

    /// The events recorded so far that match `request`.
    pub fn get_events(&self, request: &EventRequest) -> Vec<Event> {
        self.events.get_events(request)
    }

    /// Follows matching events recorded from now on.
    pub fn watch_events(&self, request: EventRequest) -> EventWatch {
        self.events.watch(request)
    }

    pub fn events(&self) -> &EventStore {
        &self.events
    }

    pub fn machine_info(&self) -> Result<MachineInfo> {
        Ok(self.host.machine_info()?)
    }

    /// Starts the periodic housekeeping driver. Calling it again while running is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if !tasks.is_empty() {
            return;
        }
        self.shutdown.send_replace(false);
        tasks.push(housekeeping::spawn(
            Arc::downgrade(self),
            self.config.housekeeping_interval,
            self.shutdown.subscribe(),
        ));
        log::info!(
            "Started housekeeping every {:?}",
            self.config.housekeeping_interval
        );
    }

    /// Stops background work and releases every handler. The registry is empty afterwards.
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);
        let tasks: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(err) = task.await {
                log::error!("Background task failed: {err}");
            }
        }

        let drained: Vec<Arc<ContainerData>> = {
            let mut containers = self.write();
            containers
                .drain()
                .filter(|(key, _)| key.is_canonical())
                .map(|(_, data)| data)
                .collect()
        };
        for data in &drained {
            data.stop().await;
        }
        log::info!("Manager stopped, released {} containers", drained.len());
    }
}
