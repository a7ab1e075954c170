use chrono::Datelike;
use thiserror::Error;

/// First year the hearing-decision archive publishes.
pub const FIRST_ARCHIVE_YEAR: i32 = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{year} is not a supported archive year: {detail}")]
pub struct InvalidYear {
    pub year: i32,
    pub detail: String,
}

/// A year inside the archive's publication range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchiveYear(i32);

impl ArchiveYear {
    /// Accepts years from [`FIRST_ARCHIVE_YEAR`] to the current calendar year.
    pub fn new(year: i32) -> Result<Self, InvalidYear> {
        let current = chrono::Utc::now().year();
        if (FIRST_ARCHIVE_YEAR..=current).contains(&year) {
            Ok(Self(year))
        } else {
            Err(InvalidYear {
                year,
                detail: format!("expected {FIRST_ARCHIVE_YEAR}..={current}"),
            })
        }
    }

    pub fn get(&self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for ArchiveYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ArchiveYear {
    type Err = InvalidYear;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let year = s.trim().parse::<i32>().map_err(|_| InvalidYear {
            year: 0,
            detail: format!("not a year: {s:?}"),
        })?;
        Self::new(year)
    }
}
