//! `memory.stat`, `memory.current` and `memory.max`.
use std::collections::HashMap;
use std::io::BufRead;
use std::sync::LazyLock;

use crate::info::{MemorySpec, MemoryStats};

use super::{KeyValueStat, SingleLineStat, StatParseError};

type Setter = fn(&mut MemoryStats, u64);

static SETTERS: LazyLock<HashMap<&'static str, Setter>> = LazyLock::new(|| {
    let mut m: HashMap<&'static str, Setter> = HashMap::with_capacity(7);

    m.insert("anon", |s: &mut MemoryStats, v: u64| s.anon = v);
    m.insert("file", |s: &mut MemoryStats, v: u64| s.file = v);
    m.insert("kernel_stack", |s: &mut MemoryStats, v: u64| s.kernel_stack = v);
    m.insert("slab", |s: &mut MemoryStats, v: u64| s.slab = v);
    m.insert("sock", |s: &mut MemoryStats, v: u64| s.sock = v);
    m.insert("shmem", |s: &mut MemoryStats, v: u64| s.shmem = v);
    m.insert("file_mapped", |s: &mut MemoryStats, v: u64| s.file_mapped = v);

    m
});

/// Fills the breakdown only; `usage_bytes` comes from `memory.current`.
impl KeyValueStat for MemoryStats {
    fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
        &SETTERS
    }
}

/// Bytes currently charged to the cgroup, from `memory.current`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryUsage(pub u64);

impl SingleLineStat for MemoryUsage {
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self> {
        let mut line = String::new();
        buf.read_line(&mut line)?;
        let line = line.trim();
        let bytes = line
            .parse::<u64>()
            .map_err(|source| StatParseError::InvalidValue {
                value: line.to_owned(),
                line: 1,
                source,
            })?;
        Ok(MemoryUsage(bytes))
    }
}

impl SingleLineStat for MemorySpec {
    /// `max`, or anything unparsable, means no limit.
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self> {
        let mut line = String::new();
        buf.read_line(&mut line)?;
        let limit_bytes = match line.trim() {
            "max" => None,
            value => value.parse::<u64>().ok(),
        };
        Ok(MemorySpec { limit_bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgroup::stats::error::extract_stat_parse_error;

    #[test]
    fn test_parse_memory_stat() {
        let data = "\
anon 1000
file 2000
kernel_stack 300
slab 400
sock 500
shmem 600
file_mapped 700
pgfault 12345
";
        let stats = MemoryStats::from_reader(&mut data.as_bytes()).unwrap();
        assert_eq!(
            stats,
            MemoryStats {
                usage_bytes: 0,
                anon: 1000,
                file: 2000,
                kernel_stack: 300,
                slab: 400,
                sock: 500,
                shmem: 600,
                file_mapped: 700,
            }
        );
    }

    #[test]
    fn test_extra_whitespace() {
        let data = "    anon     1000\nfile     2000\n";
        let stats = MemoryStats::from_reader(&mut data.as_bytes()).unwrap();
        assert_eq!(stats.anon, 1000);
        assert_eq!(stats.file, 2000);
    }

    #[test]
    fn test_duplicate_memory_stat_field() {
        let err = MemoryStats::from_reader(&mut "anon 1\nanon 2\n".as_bytes()).unwrap_err();
        assert!(matches!(
            extract_stat_parse_error(&err),
            StatParseError::DuplicateField { line: 2, .. }
        ));
    }

    #[test]
    fn test_parse_memory_usage() {
        let usage = MemoryUsage::from_reader(&mut "8192\n".as_bytes()).unwrap();
        assert_eq!(usage, MemoryUsage(8192));
    }

    #[test]
    fn test_parse_invalid_memory_usage() {
        let err = MemoryUsage::from_reader(&mut "".as_bytes()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        match extract_stat_parse_error(&err) {
            StatParseError::InvalidValue { value, line, .. } => {
                assert_eq!(value, "");
                assert_eq!(*line, 1);
            }
            _ => panic!("Expected InvalidValue Error"),
        }
    }

    #[test]
    fn test_parse_memory_max() {
        let limit = MemorySpec::from_reader(&mut "max\n".as_bytes()).unwrap();
        assert_eq!(limit.limit_bytes, None);
        let limit = MemorySpec::from_reader(&mut "104857600\n".as_bytes()).unwrap();
        assert_eq!(limit.limit_bytes, Some(104_857_600));
        let limit = MemorySpec::from_reader(&mut "abc\n".as_bytes()).unwrap();
        assert_eq!(limit.limit_bytes, None);
    }
}
