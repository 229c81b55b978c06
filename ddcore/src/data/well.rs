use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const PLATE_ROWS: u8 = 8;
pub const PLATE_COLUMNS: u8 = 12;

/// Position of a well on a plate, e.g. `A01`.
///
/// Ordering is row-major (`A01 < A02 < ... < A12 < B01`), which is the order
/// wells appear in a `PlateSummary`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WellId {
    /// zero-based row, `A` = 0
    pub row: u8,
    /// one-based column
    pub column: u8,
}

impl WellId {
    pub fn new(row: char, column: u8) -> Option<Self> {
        let row = row.to_ascii_uppercase();
        if !row.is_ascii_uppercase() || column == 0 {
            return None;
        }
        Some(WellId { row: row as u8 - b'A', column })
    }

    pub fn row_letter(&self) -> char {
        (b'A' + self.row) as char
    }

    /// True for positions on a standard 96-well plate (A-H, 1-12).
    pub fn in_96_well_plate(&self) -> bool {
        self.row < PLATE_ROWS && self.column >= 1 && self.column <= PLATE_COLUMNS
    }

    /// All 96 wells in row-major order.
    pub fn all_96() -> Vec<WellId> {
        (0..PLATE_ROWS)
            .flat_map(|row| (1..=PLATE_COLUMNS).map(move |column| WellId { row, column }))
            .collect()
    }

    /// Pulls a well coordinate out of a sample or file name.
    ///
    /// Explicit `_A01_` markers win; otherwise the last coordinate-looking
    /// token is used, preferring ones delimited by `_` or `.`.
    pub fn extract_from_name(name: &str) -> Option<WellId> {
        let patterns = well_name_patterns();

        if let Some(m) = patterns[0].captures_iter(name).next() {
            return m.get(1).and_then(|g| g.as_str().parse().ok());
        }

        for pattern in &patterns[1..] {
            if let Some(m) = pattern.captures_iter(name).last() {
                return m.get(1).and_then(|g| g.as_str().parse().ok());
            }
        }
        None
    }
}

fn well_name_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"_([A-H][0-9]{2})_",
            r"_([A-H][0-9]{2})",
            r"([A-H][0-9]{2})_",
            r"_([A-H][0-9]{1,2})[_.]",
            r"([A-H][0-9]{1,2})[_.]",
            r"([A-H][0-9]{1,2})",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static well pattern"))
        .collect()
    })
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("invalid well identifier: {0:?}")]
pub struct ParseWellIdError(pub String);

impl FromStr for WellId {
    type Err = ParseWellIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let row = chars.next().ok_or_else(|| ParseWellIdError(s.to_string()))?;
        let digits = chars.as_str();
        if digits.is_empty() || digits.len() > 2 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(ParseWellIdError(s.to_string()));
        }
        let column: u8 = digits.parse().map_err(|_| ParseWellIdError(s.to_string()))?;
        WellId::new(row, column).ok_or_else(|| ParseWellIdError(s.to_string()))
    }
}

impl Display for WellId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:02}", self.row_letter(), self.column)
    }
}
