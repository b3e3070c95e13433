use std::path::PathBuf;

use crate::container::handler::{self, ContainerHandler, ContainerReference};
use crate::container::{DOCKER_NAMESPACE, HandlerFactory};

use super::handler::{CgroupHandler, cgroup_path};

const DOCKER_ID_LENGTH: usize = 64;
const DOCKER_SHORT_ID_LENGTH: usize = 12;

/// Monitors any cgroup by its path. Register it last: it accepts every existing cgroup.
#[derive(Debug)]
pub struct RawFactory {
    cgroup_root: PathBuf,
}

impl RawFactory {
    pub fn new(cgroup_root: impl Into<PathBuf>) -> Self {
        Self {
            cgroup_root: cgroup_root.into(),
        }
    }
}

impl HandlerFactory for RawFactory {
    fn name(&self) -> &str {
        "raw"
    }

    fn new_handler(
        &self,
        container_name: &str,
    ) -> handler::Result<Option<Box<dyn ContainerHandler>>> {
        if !cgroup_path(&self.cgroup_root, container_name).is_dir() {
            return Ok(None);
        }
        Ok(Some(Box::new(CgroupHandler::new(
            &self.cgroup_root,
            ContainerReference::new(container_name),
        ))))
    }
}

/// Monitors docker containers, aliased in the docker namespace by their id.
///
/// Accepts both the cgroupfs layout (`/docker/<id>`) and the systemd layout
/// (`/system.slice/docker-<id>.scope`).
#[derive(Debug)]
pub struct DockerFactory {
    cgroup_root: PathBuf,
}

impl DockerFactory {
    pub fn new(cgroup_root: impl Into<PathBuf>) -> Self {
        Self {
            cgroup_root: cgroup_root.into(),
        }
    }
}

impl HandlerFactory for DockerFactory {
    fn name(&self) -> &str {
        DOCKER_NAMESPACE
    }

    fn new_handler(
        &self,
        container_name: &str,
    ) -> handler::Result<Option<Box<dyn ContainerHandler>>> {
        let Some(id) = docker_id(container_name) else {
            return Ok(None);
        };
        if !cgroup_path(&self.cgroup_root, container_name).is_dir() {
            return Err(handler::Error::Gone(container_name.to_owned()));
        }

        let mut aliases = vec![id.to_owned()];
        if id.is_ascii() && id.len() > DOCKER_SHORT_ID_LENGTH {
            aliases.push(id[..DOCKER_SHORT_ID_LENGTH].to_owned());
        }
        let reference = ContainerReference {
            name: container_name.to_owned(),
            aliases,
            namespace: DOCKER_NAMESPACE.to_owned(),
        };
        Ok(Some(Box::new(CgroupHandler::new(&self.cgroup_root, reference))))
    }
}

/// Extracts the container id from a docker cgroup name.
pub(crate) fn docker_id(container_name: &str) -> Option<&str> {
    if let Some(id) = container_name.strip_prefix("/docker/") {
        return (!id.is_empty() && !id.contains('/')).then_some(id);
    }
    let last = container_name.rsplit('/').next()?;
    let id = last.strip_prefix("docker-")?.strip_suffix(".scope")?;
    (id.len() == DOCKER_ID_LENGTH && id.bytes().all(|b| b.is_ascii_hexdigit())).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn test_docker_id() {
        assert_eq!(docker_id("/docker/c1"), Some("c1"));
        assert_eq!(
            docker_id(&format!("/system.slice/docker-{ID}.scope")),
            Some(ID)
        );
        assert_eq!(docker_id("/docker"), None);
        assert_eq!(docker_id("/docker/c1/nested"), None);
        assert_eq!(docker_id("/system.slice/docker-invalid.scope"), None);
        assert_eq!(docker_id("/system.slice/sshd.service"), None);
    }

    #[test]
    fn test_docker_factory_aliases() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join(format!("system.slice/docker-{ID}.scope"))).unwrap();
        let factory = DockerFactory::new(root.path());

        let handler = factory
            .new_handler(&format!("/system.slice/docker-{ID}.scope"))
            .unwrap()
            .unwrap();
        let reference = handler.reference().unwrap();
        assert_eq!(reference.namespace, "docker");
        assert_eq!(reference.aliases, vec![ID.to_owned(), ID[..12].to_owned()]);

        assert!(factory.new_handler("/system.slice/sshd.service").unwrap().is_none());
    }

    #[test]
    fn test_docker_factory_non_ascii_id() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("docker/aéééééé")).unwrap();
        let factory = DockerFactory::new(root.path());

        let handler = factory.new_handler("/docker/aéééééé").unwrap().unwrap();
        let reference = handler.reference().unwrap();
        assert_eq!(reference.aliases, vec!["aéééééé".to_owned()]);
    }

    #[test]
    fn test_docker_factory_missing_cgroup() {
        let root = tempfile::tempdir().unwrap();
        let factory = DockerFactory::new(root.path());
        assert!(matches!(
            factory.new_handler("/docker/c1"),
            Err(handler::Error::Gone(_))
        ));
    }

    #[test]
    fn test_raw_factory() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("system.slice")).unwrap();
        let factory = RawFactory::new(root.path());

        assert!(factory.new_handler("/").unwrap().is_some());
        assert!(factory.new_handler("/system.slice").unwrap().is_some());
        assert!(factory.new_handler("/missing").unwrap().is_none());
    }
}
