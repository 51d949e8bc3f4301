//! Round-limit oracle
//!
//! Comparison runs can be bounded by a round limit recorded by an earlier
//! run. The oracle is an injected provider; when it has nothing to say the
//! run is unbounded and never marked sub-optimal.

use log::{debug, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub trait RoundOracle {
    /// Round limit for `unit`, if one is known
    fn round_limit(&self, unit: &str) -> Option<u64>;

    /// Whether the recorded comparison marks `unit` as sub-optimal
    fn is_suboptimal(&self, unit: &str) -> bool;
}

/// Knows nothing: unbounded, never sub-optimal
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOracle;

impl RoundOracle for NoOracle {
    fn round_limit(&self, _unit: &str) -> Option<u64> {
        None
    }

    fn is_suboptimal(&self, _unit: &str) -> bool {
        false
    }
}

/// In-memory oracle
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedOracle {
    pub limit: Option<u64>,
    pub suboptimal: bool,
}

impl RoundOracle for FixedOracle {
    fn round_limit(&self, _unit: &str) -> Option<u64> {
        self.limit
    }

    fn is_suboptimal(&self, _unit: &str) -> bool {
        self.suboptimal
    }
}

/// Reads `<dir>/<unit>.txt`.
///
/// The first line is the round limit. When a second line is present, the
/// two lines are read as floats and the unit is sub-optimal when the first
/// is smaller.
#[derive(Debug, Clone)]
pub struct FileOracle {
    dir: PathBuf,
}

impl FileOracle {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, unit: &str) -> PathBuf {
        self.dir.join(format!("{unit}.txt"))
    }

    fn read(&self, unit: &str) -> Option<String> {
        read_optional(&self.path_for(unit))
    }
}

fn read_optional(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("no oracle file at {}", path.display());
            None
        }
        Err(e) => {
            warn!("cannot read oracle file {}: {}", path.display(), e);
            None
        }
    }
}

/// First line as an unsigned round count
pub fn parse_round_limit(text: &str) -> Option<u64> {
    text.lines().next()?.trim().parse().ok()
}

/// Two float lines, sub-optimal when the first is smaller
pub fn parse_suboptimal(text: &str) -> bool {
    let mut lines = text.lines().map(|l| l.trim().parse::<f64>());
    match (lines.next(), lines.next()) {
        (Some(Ok(s1)), Some(Ok(s2))) => s1 < s2,
        _ => false,
    }
}

impl RoundOracle for FileOracle {
    fn round_limit(&self, unit: &str) -> Option<u64> {
        let text = self.read(unit)?;
        let limit = parse_round_limit(&text);
        if limit.is_none() {
            warn!("unparsable round limit for {}, running unbounded", unit);
        }
        limit
    }

    fn is_suboptimal(&self, unit: &str) -> bool {
        self.read(unit).is_some_and(|text| parse_suboptimal(&text))
    }
}
