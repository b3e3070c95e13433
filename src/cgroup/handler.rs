use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::container::handler::{self, ContainerHandler, ContainerReference, ListType};
use crate::fsutil;
use crate::info::{ContainerSpec, ContainerStats, CpuSpec, CpuStats, MemorySpec, MemoryStats};

use super::stats::{KeyValueStat, MemoryUsage, SingleLineStat};

/// Maps a canonical container name onto its cgroup directory below `cgroup_root`.
pub(crate) fn cgroup_path(cgroup_root: &Path, name: &str) -> PathBuf {
    let relative = name.trim_start_matches('/');
    if relative.is_empty() {
        cgroup_root.to_path_buf()
    } else {
        cgroup_root.join(relative)
    }
}

/// Joins a child directory onto a canonical container name.
pub(crate) fn child_name(parent: &str, dir_name: &str) -> String {
    if parent == "/" {
        format!("/{dir_name}")
    } else {
        format!("{parent}/{dir_name}")
    }
}

/// Reads spec and usage of one cgroup v2 directory.
#[derive(Debug)]
pub struct CgroupHandler {
    reference: ContainerReference,
    path: PathBuf,
}

impl CgroupHandler {
    pub fn new(cgroup_root: &Path, reference: ContainerReference) -> Self {
        let path = cgroup_path(cgroup_root, &reference.name);
        Self { reference, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_exists(&self) -> handler::Result<()> {
        if self.path.is_dir() {
            Ok(())
        } else {
            Err(handler::Error::Gone(self.reference.name.clone()))
        }
    }

    fn read_key_value<T: KeyValueStat>(&self, file: &str) -> handler::Result<Option<T>> {
        let path = self.path.join(file);
        match fsutil::open_optional_reader(&path)? {
            Some(mut reader) => T::from_reader(&mut reader)
                .map(Some)
                .map_err(|err| handler::Error::io(path, err)),
            None => Ok(None),
        }
    }

    fn read_single<T: SingleLineStat>(&self, file: &str) -> handler::Result<Option<T>> {
        let path = self.path.join(file);
        match fsutil::open_optional_reader(&path)? {
            Some(mut reader) => T::from_reader(&mut reader)
                .map(Some)
                .map_err(|err| handler::Error::io(path, err)),
            None => Ok(None),
        }
    }

    fn creation_time(&self) -> Option<SystemTime> {
        let metadata = std::fs::metadata(&self.path).ok()?;
        metadata.created().or_else(|_| metadata.modified()).ok()
    }
}

impl ContainerHandler for CgroupHandler {
    fn reference(&self) -> handler::Result<ContainerReference> {
        Ok(self.reference.clone())
    }

    fn spec(&self) -> handler::Result<ContainerSpec> {
        self.ensure_exists()?;
        let cpu = self.read_single::<CpuSpec>("cpu.max")?;
        let memory = self.read_single::<MemorySpec>("memory.max")?;

        let mut spec = ContainerSpec {
            creation_time: self.creation_time(),
            has_cpu: cpu.is_some() || self.path.join("cpu.stat").is_file(),
            cpu: cpu.unwrap_or_default(),
            has_memory: memory.is_some() || self.path.join("memory.current").is_file(),
            memory: memory.unwrap_or_default(),
            ..Default::default()
        };
        if !self.reference.namespace.is_empty() {
            spec.labels
                .insert("runtime".to_owned(), self.reference.namespace.clone());
        }
        Ok(spec)
    }

    fn stats(&self) -> handler::Result<ContainerStats> {
        self.ensure_exists()?;
        let mut stats = ContainerStats::new(SystemTime::now());
        stats.cpu = self.read_key_value::<CpuStats>("cpu.stat")?;

        let usage = self.read_single::<MemoryUsage>("memory.current")?;
        let breakdown = self.read_key_value::<MemoryStats>("memory.stat")?;
        stats.memory = match (usage, breakdown) {
            (None, None) => None,
            (usage, breakdown) => {
                let mut memory = breakdown.unwrap_or_default();
                memory.usage_bytes = usage.map(|MemoryUsage(bytes)| bytes).unwrap_or_default();
                Some(memory)
            }
        };
        Ok(stats)
    }

    fn list_containers(&self, list_type: ListType) -> handler::Result<Vec<ContainerReference>> {
        self.ensure_exists()?;
        let mut out = Vec::new();
        let mut stack = vec![(self.path.clone(), self.reference.name.clone())];
        while let Some((dir, name)) = stack.pop() {
            let entries = std::fs::read_dir(&dir).map_err(|err| handler::Error::io(&dir, err))?;
            for entry in entries {
                let entry = entry.map_err(|err| handler::Error::io(&dir, err))?;
                let is_dir = entry
                    .file_type()
                    .map_err(|err| handler::Error::io(entry.path(), err))?
                    .is_dir();
                if !is_dir {
                    continue;
                }
                let child = child_name(&name, &entry.file_name().to_string_lossy());
                if list_type == ListType::Recursive {
                    stack.push((entry.path(), child.clone()));
                }
                out.push(ContainerReference::new(child));
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    fn exists(&self) -> bool {
        self.path.is_dir()
    }
}
