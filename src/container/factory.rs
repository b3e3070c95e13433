use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use super::handler::{ContainerHandler, Result};

/// Builds handlers for the containers a runtime is responsible for.
pub trait HandlerFactory: fmt::Debug + Send + Sync {
    /// A short, human readable name used in logs.
    fn name(&self) -> &str;

    /// Returns `Ok(None)` if this factory does not handle `container_name`.
    fn new_handler(&self, container_name: &str) -> Result<Option<Box<dyn ContainerHandler>>>;
}

/// An ordered set of factories. Factories registered first are asked first.
#[derive(Debug, Default)]
pub struct FactoryRegistry {
    factories: RwLock<Vec<Arc<dyn HandlerFactory>>>,
}

impl FactoryRegistry {
    pub fn register(&self, factory: Arc<dyn HandlerFactory>) {
        log::debug!("Registering handler factory `{}`", factory.name());
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(factory);
    }

    pub fn clear(&self) {
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the current factories in priority order.
    pub fn snapshot(&self) -> Vec<Arc<dyn HandlerFactory>> {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Asks each factory in turn for a handler; the first one that accepts wins.
///
/// A factory that fails to build a handler for a name it claimed stops the search: the
/// container belongs to that runtime, so falling through to a lower priority factory would
/// monitor it under the wrong identity.
pub fn new_handler(
    factories: &[Arc<dyn HandlerFactory>],
    container_name: &str,
) -> Result<Option<(String, Box<dyn ContainerHandler>)>> {
    for factory in factories {
        if let Some(handler) = factory.new_handler(container_name)? {
            log::trace!(
                "Factory `{}` accepted container `{}`",
                factory.name(),
                container_name
            );
            return Ok(Some((factory.name().to_owned(), handler)));
        }
    }
    Ok(None)
}
