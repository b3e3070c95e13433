//! Generic readers for cgroup controller files.
//!
//! # Example: Implementing `KeyValueStat`
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::sync::LazyLock;
//! use creo_manager::cgroup::stats::KeyValueStat;
//!
//! #[derive(Default)]
//! struct Pressure {
//!     some: u64,
//!     full: u64,
//! }
//!
//! type Setter = fn(&mut Pressure, u64);
//!
//! static SETTERS: LazyLock<HashMap<&'static str, Setter>> = LazyLock::new(|| {
//!     let mut m: HashMap<&'static str, Setter> = HashMap::new();
//!     m.insert("some", |p: &mut Pressure, v: u64| p.some = v);
//!     m.insert("full", |p: &mut Pressure, v: u64| p.full = v);
//!     m
//! });
//!
//! impl KeyValueStat for Pressure {
//!     fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
//!         &SETTERS
//!     }
//! }
//!
//! let parsed = Pressure::from_reader(&mut "some 4\nfull 2\n".as_bytes()).unwrap();
//! assert_eq!((parsed.some, parsed.full), (4, 2));
//! ```
use std::collections::{HashMap, HashSet};
use std::io::BufRead;

use super::StatParseError;

/// A file of `key value` lines, such as `cpu.stat` or `memory.stat`.
///
/// Keys without a handler are ignored, so new kernel fields do not break parsing.
pub trait KeyValueStat: Default + 'static {
    /// Whether a key may appear more than once. Later values win.
    const ALLOW_DUPLICATE_KEYS: bool = false;

    /// Maps every known key to the function storing its value.
    fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)>;

    /// # Errors
    ///
    /// Fails on read errors, values that are not `u64` and, unless
    /// [`Self::ALLOW_DUPLICATE_KEYS`], repeated keys. Parse failures carry a
    /// [`StatParseError`] with kind `InvalidData`.
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self> {
        let handlers = Self::field_handlers();
        let mut stat = Self::default();
        let mut seen = HashSet::with_capacity(handlers.len());
        let mut line = String::new();
        let mut lineno = 0;

        while buf.read_line(&mut line)? != 0 {
            lineno += 1;
            let mut parts = line.split_whitespace();
            if let (Some(key), Some(value)) = (parts.next(), parts.next()) {
                if let Some((known, set)) = handlers.get_key_value(key) {
                    let parsed = value.parse::<u64>().map_err(|source| {
                        StatParseError::InvalidKeyValue {
                            key: key.to_owned(),
                            value: value.to_owned(),
                            line: lineno,
                            source,
                        }
                    })?;
                    if !seen.insert(*known) && !Self::ALLOW_DUPLICATE_KEYS {
                        return Err(StatParseError::DuplicateField {
                            field: key.to_owned(),
                            line: lineno,
                        }
                        .into());
                    }
                    set(&mut stat, parsed);
                }
            }
            line.clear();
        }

        Ok(stat)
    }
}

/// A file holding one value on one line, such as `memory.current` or `cpu.max`.
pub trait SingleLineStat: Sized {
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self>;
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use super::*;
    use crate::cgroup::stats::error::extract_stat_parse_error;

    #[derive(Debug, Default, PartialEq)]
    struct Counters {
        a: u64,
        b: u64,
    }

    type Setter = fn(&mut Counters, u64);

    static SETTERS: LazyLock<HashMap<&'static str, Setter>> = LazyLock::new(|| {
        let mut m: HashMap<&'static str, Setter> = HashMap::new();
        m.insert("a", |c: &mut Counters, v: u64| c.a = v);
        m.insert("b", |c: &mut Counters, v: u64| c.b = v);
        m
    });

    impl KeyValueStat for Counters {
        fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
            &SETTERS
        }
    }

    #[test]
    fn test_unknown_keys_and_short_lines_are_skipped() {
        let data = "a 1\nnew_field 7\n\nlonely\nb 2\n";
        let parsed = Counters::from_reader(&mut data.as_bytes()).unwrap();
        assert_eq!(parsed, Counters { a: 1, b: 2 });
    }

    #[test]
    fn test_duplicate_key() {
        let err = Counters::from_reader(&mut "a 1\na 2\n".as_bytes()).unwrap_err();
        match extract_stat_parse_error(&err) {
            StatParseError::DuplicateField { field, line } => {
                assert_eq!(field, "a");
                assert_eq!(*line, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
