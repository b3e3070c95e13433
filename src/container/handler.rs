//! The collection capability behind every monitored container.
//!
//! A [`ContainerHandler`] knows how to talk to one container through one runtime
//! (cgroup files, a container engine, ...). Handlers are synchronous and may block on
//! I/O for an unbounded time; callers go through [`BlockingHandler`], which moves the call
//! onto the blocking pool and bounds it with a timeout.
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::info::{ContainerSpec, ContainerStats};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("container `{0}` no longer exists")]
    Gone(String),
    #[error("handler did not respond within {0:?}")]
    Timeout(Duration),
    #[error("handler task failed: {0}")]
    Panicked(String),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<crate::fsutil::FileReadError> for Error {
    fn from(err: crate::fsutil::FileReadError) -> Self {
        Self::Io {
            path: err.path,
            source: err.source,
        }
    }
}

/// How a container names itself, including any runtime-specific aliases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerReference {
    /// Canonical, path-like name, e.g. `/docker/c1`.
    pub name: String,
    /// Alternate names inside [`Self::namespace`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// Naming scheme of the aliases; empty for the default namespace.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

impl ContainerReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Which subcontainers to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListType {
    /// Only the direct children.
    Direct,
    /// The whole subtree, excluding the container itself.
    Recursive,
}

pub trait ContainerHandler: fmt::Debug + Send + Sync {
    fn reference(&self) -> Result<ContainerReference>;

    fn spec(&self) -> Result<ContainerSpec>;

    fn stats(&self) -> Result<ContainerStats>;

    fn list_containers(&self, list_type: ListType) -> Result<Vec<ContainerReference>>;

    fn exists(&self) -> bool;

    /// Releases whatever the handler holds open. Called once, after the container has been
    /// removed from the registry.
    fn cleanup(&self) {}
}

/// Calls a handler that may hang on the blocking pool.
///
/// A call that times out keeps running in the background and holds its slot until the
/// handler returns. Once every slot is held by a hung call, further calls wait for a free
/// slot until their own deadline and then time out without touching the handler. A hung
/// container therefore pins at most [`Self::MAX_IN_FLIGHT`] blocking threads.
#[derive(Debug)]
pub struct BlockingHandler {
    handler: Arc<dyn ContainerHandler>,
    in_flight: Arc<Semaphore>,
}

impl BlockingHandler {
    /// One query runs spec, listing and stats side by side, plus one housekeeping call.
    pub const MAX_IN_FLIGHT: usize = 4;

    pub fn new(handler: Box<dyn ContainerHandler>) -> Self {
        Self {
            handler: Arc::from(handler),
            in_flight: Arc::new(Semaphore::new(Self::MAX_IN_FLIGHT)),
        }
    }

    /// Runs `op` against the handler, giving up after `timeout`.
    pub async fn run<T, F>(&self, timeout: Duration, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ContainerHandler) -> Result<T> + Send + 'static,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        let acquire = Arc::clone(&self.in_flight).acquire_owned();
        // The semaphore is never closed.
        let Ok(Ok(permit)) = tokio::time::timeout_at(deadline, acquire).await else {
            return Err(Error::Timeout(timeout));
        };

        let handler = Arc::clone(&self.handler);
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            op(handler.as_ref())
        });
        match tokio::time::timeout_at(deadline, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(Error::Panicked(join_err.to_string())),
            Err(_) => Err(Error::Timeout(timeout)),
        }
    }
}

impl<H> ContainerHandler for Arc<H>
where
    H: ContainerHandler + ?Sized,
{
    fn reference(&self) -> Result<ContainerReference> {
        (**self).reference()
    }

    fn spec(&self) -> Result<ContainerSpec> {
        (**self).spec()
    }

    fn stats(&self) -> Result<ContainerStats> {
        (**self).stats()
    }

    fn list_containers(&self, list_type: ListType) -> Result<Vec<ContainerReference>> {
        (**self).list_containers(list_type)
    }

    fn exists(&self) -> bool {
        (**self).exists()
    }

    fn cleanup(&self) {
        (**self).cleanup()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::mock::MockHandler;

    #[tokio::test]
    async fn test_hung_handler_holds_its_slots() {
        let mock = Arc::new(MockHandler::new("/hung").with_delay(Duration::from_secs(1)));
        let handler = BlockingHandler::new(Box::new(Arc::clone(&mock)));

        for _ in 0..BlockingHandler::MAX_IN_FLIGHT * 2 {
            let err = handler
                .run(Duration::from_millis(20), |handler| handler.spec())
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Timeout(_)));
        }
        assert_eq!(mock.spec_calls(), BlockingHandler::MAX_IN_FLIGHT);
    }

    #[tokio::test]
    async fn test_slot_is_released_after_completion() {
        let mock = Arc::new(MockHandler::new("/c1"));
        let handler = BlockingHandler::new(Box::new(Arc::clone(&mock)));

        for _ in 0..BlockingHandler::MAX_IN_FLIGHT * 2 {
            handler
                .run(Duration::from_millis(200), |handler| handler.spec())
                .await
                .unwrap();
        }
        assert_eq!(mock.spec_calls(), BlockingHandler::MAX_IN_FLIGHT * 2);
    }
}
