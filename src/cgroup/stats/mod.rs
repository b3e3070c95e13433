//! Parsers for cgroup v2 controller files.
//!
//! Multi-line `key value` files (`cpu.stat`, `memory.stat`) go through [`KeyValueStat`];
//! single value files (`cpu.max`, `memory.max`, `memory.current`) through
//! [`SingleLineStat`]. Both fill the types served by the manager directly.
mod cpu;
mod error;
mod memory;
mod parser;

pub use error::StatParseError;
pub use memory::MemoryUsage;
pub use parser::{KeyValueStat, SingleLineStat};
