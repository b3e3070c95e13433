//! Creo Manager: a per-host container manager.
//!
//! It keeps a registry of monitored containers, samples their cgroup usage on a fixed
//! interval, records lifecycle events and answers queries about single containers or
//! whole subtrees over HTTP.
use std::sync::Arc;

pub mod api;
pub mod cgroup;
pub mod config;
pub mod container;
pub mod discovery;
pub mod error;
pub mod events;
pub mod fsutil;
pub mod host;
pub mod info;
pub mod manager;
pub mod storage;

pub use error::{Error, Result};

/// Runs the manager until the API server fails or the process receives Ctrl-C.
///
/// # Errors
///
/// Fails on invalid configuration or when the API listener cannot be bound.
pub async fn run() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let config = config::Config::from_env()?;
    log::debug!("Rootfs: {}", config.rootfs.display());
    log::debug!("Cgroup root: {}", config.cgroup_root.display());

    let mut builder = manager::Manager::builder();
    builder
        .set_stats_store(Arc::new(storage::InMemoryStatsStore::new(
            config.max_stats_per_container,
        )))
        .set_host(Arc::new(host::RootfsHost::new(&config.rootfs)))
        .set_config(config.manager.clone())
        .add_factory(Arc::new(cgroup::DockerFactory::new(&config.cgroup_root)))
        .add_factory(Arc::new(cgroup::RawFactory::new(&config.cgroup_root)));
    let manager = Arc::new(builder.build()?);

    match manager.machine_info() {
        Ok(machine) => log::info!(
            "Monitoring host `{}` ({} cores, {} bytes memory)",
            machine.hostname,
            machine.num_cores,
            machine.memory_capacity_bytes
        ),
        Err(err) => log::warn!("{err}"),
    }

    manager.start();
    let watcher = discovery::CgroupWatcher::new(&config.cgroup_root, config.discovery_interval);
    let discovery = tokio::spawn(watcher.run(Arc::clone(&manager)));

    let api = api::APIServer::new(Arc::clone(&manager));
    let result = tokio::select! {
        result = api.listen(config.listen_addr.as_str()) => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("Shutting down");
            Ok(())
        }
    };

    discovery.abort();
    manager.stop().await;
    Ok(result?)
}
