//! Build configuration.

use std::path::PathBuf;

use time::Duration;

use crate::batch::max_batch_size;
use crate::label::width_for;

pub const DEFAULT_BATCH_SIZE: usize = 1_000_000;

/// The largest batch whose labels, drawn from `universe` fixed-width
/// values, keep their bit offsets within 32 bits.
pub fn batch_size_for(universe: u64) -> usize {
    ::std::cmp::max(1, max_batch_size(width_for(universe)))
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Arcs staged before a batch is handed to the sink.
    pub batch_size: usize,
    /// Turns unresolved addresses, unmatched transactions and unread
    /// outputs into errors instead of warnings.
    pub strict: bool,
    /// Where sinks put their batch files; the system default if `None`.
    pub temp_dir: Option<PathBuf>,
    /// Minimum time between progress reports.
    pub log_interval: Duration,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            batch_size: DEFAULT_BATCH_SIZE,
            strict: false,
            temp_dir: None,
            log_interval: Duration::seconds(10),
        }
    }
}

#[test]
#[cfg(test)]
fn batch_sizes() {
    assert_eq!(Config::default().batch_size, 1_000_000);
    assert_eq!(batch_size_for(1), usize::max_value());
    assert_eq!(batch_size_for(2), u32::max_value() as usize);
    assert_eq!(batch_size_for(1 << 32), 134_217_727);
    assert_eq!(batch_size_for(u64::max_value()), 67_108_863);
}
