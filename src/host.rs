//! Facts about the machine the manager runs on.
use std::fmt;
use std::io::BufRead;
use std::path::PathBuf;
use std::str::FromStr;

use crate::fsutil::{self, FileReadError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Read(#[from] FileReadError),
    #[error("invalid machine id: {0}")]
    InvalidMachineID(String),
    #[error("no `MemTotal` entry in `{0}`")]
    MissingMemTotal(PathBuf),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Source of [`MachineInfo`](crate::info::MachineInfo).
pub trait HostInfo: fmt::Debug + Send + Sync {
    fn machine_info(&self) -> Result<crate::info::MachineInfo>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineID([u8; 16]);

impl MachineID {
    pub fn as_raw(&self) -> [u8; 16] {
        self.0
    }
}

impl FromStr for MachineID {
    type Err = Error;

    /// Parses the 32 hex digit format of `/etc/machine-id`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.len() != 32 || !s.is_ascii() {
            return Err(Error::InvalidMachineID(s.to_owned()));
        }
        let mut bytes = [0u8; 16];
        for i in (0..s.len()).step_by(2) {
            bytes[i / 2] = u8::from_str_radix(&s[i..i + 2], 16)
                .map_err(|_| Error::InvalidMachineID(s.to_owned()))?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for MachineID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Reads host facts below a root filesystem mount, `/` when running on the host itself.
#[derive(Debug, Clone)]
pub struct RootfsHost {
    rootfs: PathBuf,
}

impl RootfsHost {
    pub fn new(rootfs: impl Into<PathBuf>) -> Self {
        Self {
            rootfs: rootfs.into(),
        }
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.rootfs.join(relative)
    }

    fn hostname(&self) -> Result<String> {
        fsutil::read_trimmed(self.path("etc/hostname"))
            .or_else(|_| fsutil::read_trimmed(self.path("proc/sys/kernel/hostname")))
            .map_err(Error::from)
    }

    fn num_cores(&self) -> Result<usize> {
        let reader = fsutil::open_file_reader(self.path("proc/cpuinfo"))?;
        let count = reader
            .lines()
            .map_while(std::result::Result::ok)
            .filter(|line| line.starts_with("processor"))
            .count();
        Ok(count.max(1))
    }

    fn memory_capacity(&self) -> Result<u64> {
        let path = self.path("proc/meminfo");
        let reader = fsutil::open_file_reader(&path)?;
        reader
            .lines()
            .map_while(std::result::Result::ok)
            .find_map(|line| parse_mem_total(&line))
            .ok_or(Error::MissingMemTotal(path))
    }
}

impl HostInfo for RootfsHost {
    fn machine_info(&self) -> Result<crate::info::MachineInfo> {
        let machine_id = MachineID::from_str(&fsutil::read_trimmed(self.path("etc/machine-id"))?)?;
        let hostname = self.hostname()?;
        log::debug!("Hostname: {}", &hostname);

        Ok(crate::info::MachineInfo {
            machine_id: machine_id.to_string(),
            hostname,
            num_cores: self.num_cores()?,
            memory_capacity_bytes: self.memory_capacity()?,
        })
    }
}

/// Parses `MemTotal:   16318412 kB` into bytes.
fn parse_mem_total(line: &str) -> Option<u64> {
    let rest = line.strip_prefix("MemTotal:")?;
    let mut parts = rest.split_whitespace();
    let value: u64 = parts.next()?.parse().ok()?;
    match parts.next() {
        Some("kB") => value.checked_mul(1024),
        None => Some(value),
        Some(_) => None,
    }
}
