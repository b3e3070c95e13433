//! Container identity and the per-container monitoring unit.
//!
//! A monitored container is addressed by a [`NamespacedName`]. The default (empty)
//! namespace holds the canonical, path-like name of every container, e.g. `/docker/c1`.
//! Runtimes with their own naming scheme additionally expose the same container under
//! their namespace, e.g. `docker:c1`. Both keys resolve to one [`ContainerData`].
use std::fmt;
use std::sync::Arc;

pub mod data;
pub mod factory;
pub mod handler;
#[cfg(test)]
pub(crate) mod mock;

pub use data::{ContainerData, WatchSource};
pub use factory::{FactoryRegistry, HandlerFactory};
pub use handler::{ContainerHandler, ContainerReference, ListType};

/// The namespace of canonical container names.
pub const DEFAULT_NAMESPACE: &str = "";

/// The namespace docker containers are aliased under by their short id.
pub const DOCKER_NAMESPACE: &str = "docker";

/// A container name qualified by the naming scheme it belongs to.
///
/// # Examples
///
/// ```
/// # use creo_manager::container::NamespacedName;
/// let canonical = NamespacedName::canonical("/docker/c1");
/// let alias = NamespacedName::new("docker", "c1");
/// assert!(canonical.is_canonical());
/// assert!(!alias.is_canonical());
/// assert_eq!(alias.to_string(), "docker:c1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespacedName {
    namespace: Arc<str>,
    name: Arc<str>,
}

impl NamespacedName {
    pub fn new(namespace: impl AsRef<str>, name: impl AsRef<str>) -> Self {
        Self {
            namespace: namespace.as_ref().into(),
            name: name.as_ref().into(),
        }
    }

    /// Creates a name in the default namespace.
    pub fn canonical(name: impl AsRef<str>) -> Self {
        Self::new(DEFAULT_NAMESPACE, name)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_canonical(&self) -> bool {
        self.namespace.is_empty()
    }

    /// Returns the alias keys a handler's reference asks to be registered under.
    ///
    /// References in the default namespace have no aliases, whatever they list.
    pub fn aliases_of(reference: &ContainerReference) -> Vec<NamespacedName> {
        if reference.namespace.is_empty() {
            return Vec::new();
        }
        reference
            .aliases
            .iter()
            .filter(|alias| !alias.is_empty())
            .map(|alias| NamespacedName::new(&reference.namespace, alias))
            .collect()
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_canonical() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}:{}", self.namespace, self.name)
        }
    }
}
