//! Container handlers backed by the cgroup v2 filesystem.
//!
//! Every container is a cgroup directory; its canonical name is the directory path
//! relative to the cgroup root, e.g. `/system.slice/sshd.service`.
//!
//! # Supported Stats
//!
//! The following files are read, if available:
//!
//! - `cpu.stat` and `cpu.max`
//! - `memory.stat`, `memory.current`, and `memory.max`
//!
//! # Platform Requirements
//!
//! - Linux with cgroup v2 support.
//! - Read access to the cgroup root, usually `/sys/fs/cgroup`.
mod factory;
mod handler;
pub mod stats;

pub use factory::{DockerFactory, RawFactory};
pub use handler::CgroupHandler;
pub(crate) use handler::child_name;
