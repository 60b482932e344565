/// Transient view state: filters and the album lightbox
///
/// Neither is persisted. The filtered view they produce is what the
/// presentation layer indexes into.

use serde::{Deserialize, Serialize};

use super::data::Record;

/// Wildcard value accepted by selectors
pub const ALL: &str = "all";

/// Either a wildcard or an exact value
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub enum Selector {
    #[default]
    All,
    Exact(String),
}

impl Selector {
    /// `"all"` or an empty string is the wildcard
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw == ALL {
            Selector::All
        } else {
            Selector::Exact(raw.to_string())
        }
    }

    fn matches(&self, value: Option<&str>) -> bool {
        match self {
            Selector::All => true,
            Selector::Exact(expected) => value == Some(expected.as_str()),
        }
    }
}

/// Year, status and free-text query; all three are ANDed
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterState {
    pub year: Selector,
    pub status: Selector,
    pub query: String,
}

impl FilterState {
    pub fn new(year: &str, status: &str, query: &str) -> Self {
        Self {
            year: Selector::parse(year),
            status: Selector::parse(status),
            query: query.trim().to_lowercase(),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        let year = record.start_year().map(|y| y.to_string());
        self.year.matches(year.as_deref())
            && self.status.matches(Some(record.status.as_str()))
            && (self.query.is_empty() || record.search_text().contains(&self.query))
    }
}

/// Which filtered record's album is open, and which photo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LightboxState {
    #[default]
    Closed,
    Open { album: usize, photo: usize },
}
