//! `cpu.stat` and `cpu.max`.
//!
//! ```rust
//! use creo_manager::cgroup::stats::{KeyValueStat, SingleLineStat};
//! use creo_manager::info::{CpuSpec, CpuStats};
//!
//! let stats = CpuStats::from_reader(&mut "usage_usec 1000\nuser_usec 600\n".as_bytes()).unwrap();
//! assert_eq!(stats.usage_usec, 1000);
//!
//! let limit = CpuSpec::from_reader(&mut "max 100000\n".as_bytes()).unwrap();
//! assert_eq!(limit.quota_usec, None);
//! ```
use std::collections::HashMap;
use std::io::BufRead;
use std::sync::LazyLock;

use crate::info::{CpuSpec, CpuStats};

use super::{KeyValueStat, SingleLineStat};

type Setter = fn(&mut CpuStats, u64);

static SETTERS: LazyLock<HashMap<&'static str, Setter>> = LazyLock::new(|| {
    let mut m: HashMap<&'static str, Setter> = HashMap::with_capacity(6);

    m.insert("usage_usec", |s: &mut CpuStats, v: u64| s.usage_usec = v);
    m.insert("user_usec", |s: &mut CpuStats, v: u64| s.user_usec = v);
    m.insert("system_usec", |s: &mut CpuStats, v: u64| s.system_usec = v);
    m.insert("nr_periods", |s: &mut CpuStats, v: u64| s.nr_periods = v);
    m.insert("nr_throttled", |s: &mut CpuStats, v: u64| s.nr_throttled = v);
    m.insert("throttled_usec", |s: &mut CpuStats, v: u64| s.throttled_usec = v);

    m
});

impl KeyValueStat for CpuStats {
    fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
        &SETTERS
    }
}

impl SingleLineStat for CpuSpec {
    /// Parses `<quota> <period>`, where quota may be `max`.
    ///
    /// Unparsable fields fall back to the defaults: no quota, 100ms period.
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self> {
        let mut line = String::new();
        buf.read_line(&mut line)?;
        let mut parts = line.split_whitespace();
        let quota = parts.next().unwrap_or("max");
        let defaults = CpuSpec::default();

        Ok(CpuSpec {
            quota_usec: match quota {
                "max" => None,
                quota => quota.parse::<u64>().ok(),
            },
            period_usec: parts
                .next()
                .and_then(|period| period.parse::<u64>().ok())
                .unwrap_or(defaults.period_usec),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgroup::stats::StatParseError;
    use crate::cgroup::stats::error::extract_stat_parse_error;

    #[test]
    fn test_parse_cpu_stat() {
        let data = "\
usage_usec 623932088000
user_usec 421230248000
system_usec 202701840000
nr_periods 12
nr_throttled 3
throttled_usec 4500
nr_bursts 0
burst_usec 0
";
        let stats = CpuStats::from_reader(&mut data.as_bytes()).unwrap();
        assert_eq!(
            stats,
            CpuStats {
                usage_usec: 623_932_088_000,
                user_usec: 421_230_248_000,
                system_usec: 202_701_840_000,
                nr_periods: 12,
                nr_throttled: 3,
                throttled_usec: 4500,
            }
        );
    }

    #[test]
    fn test_parse_empty_cpu_stat() {
        let stats = CpuStats::from_reader(&mut "".as_bytes()).unwrap();
        assert_eq!(stats, CpuStats::default());
    }

    #[test]
    fn test_parse_invalid_cpu_stat() {
        let data = "\
invalid_line
usage_usec abc
user_usec 42
";
        let err = CpuStats::from_reader(&mut data.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        match extract_stat_parse_error(&err) {
            StatParseError::InvalidKeyValue {
                key, value, line, ..
            } => {
                assert_eq!(key, "usage_usec");
                assert_eq!(value, "abc");
                assert_eq!(*line, 2);
            }
            _ => panic!("Expected InvalidKeyValue error"),
        }
    }

    #[test]
    fn test_parse_cpu_max() {
        let limit = CpuSpec::from_reader(&mut "50000 100000\n".as_bytes()).unwrap();
        assert_eq!(limit.quota_usec, Some(50_000));
        assert_eq!(limit.period_usec, 100_000);

        let limit = CpuSpec::from_reader(&mut "max 250000".as_bytes()).unwrap();
        assert_eq!(limit.quota_usec, None);
        assert_eq!(limit.period_usec, 250_000);
    }

    #[test]
    fn test_parse_cpu_max_defaults() {
        assert_eq!(CpuSpec::from_reader(&mut "".as_bytes()).unwrap(), CpuSpec::default());
        let limit = CpuSpec::from_reader(&mut "max".as_bytes()).unwrap();
        assert_eq!(limit.period_usec, 100_000);
    }
}
