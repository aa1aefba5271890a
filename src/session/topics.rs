//! Topic list parsing for broker subscriptions
//!
//! The configured list is a single delimiter-separated string. It is split
//! once at startup into an ordered, unbounded [`TopicSet`]; entries are never
//! truncated, and malformed filters are rejected instead of silently dropped.

use thiserror::Error;

/// Separator between topic filters in the configured list
pub const TOPIC_DELIMITER: char = ';';

/// Ordered, immutable set of topic filters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicSet {
    filters: Vec<String>,
}

/// Topic filter validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopicError {
    #[error("topic filter contains a NUL character: {0:?}")]
    NulCharacter(String),
    #[error("multi-level wildcard must be the whole last level: {0:?}")]
    MisplacedMultiLevelWildcard(String),
    #[error("single-level wildcard must occupy a whole level: {0:?}")]
    MisplacedSingleLevelWildcard(String),
    #[error("topic filter exceeds 65535 bytes")]
    TooLong,
}

impl TopicSet {
    /// Split `list` on [`TOPIC_DELIMITER`], trimming whitespace and skipping empty entries
    ///
    /// An empty (or all-whitespace) list yields an empty set, which is not an error.
    pub fn parse(list: &str) -> Result<Self, TopicError> {
        let filters = list
            .split(TOPIC_DELIMITER)
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| validate_topic_filter(entry).map(|()| entry.to_string()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { filters })
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.filters.iter().map(String::as_str)
    }
}

impl<'a> IntoIterator for &'a TopicSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.filters.iter()
    }
}

/// Check MQTT topic filter syntax
pub fn validate_topic_filter(filter: &str) -> Result<(), TopicError> {
    if filter.len() > u16::MAX as usize {
        return Err(TopicError::TooLong);
    }
    if filter.contains('\0') {
        return Err(TopicError::NulCharacter(filter.to_string()));
    }

    let levels: Vec<&str> = filter.split('/').collect();
    let last = levels.len() - 1;
    for (index, level) in levels.iter().enumerate() {
        if level.contains('#') && (*level != "#" || index != last) {
            return Err(TopicError::MisplacedMultiLevelWildcard(filter.to_string()));
        }
        if level.contains('+') && *level != "+" {
            return Err(TopicError::MisplacedSingleLevelWildcard(filter.to_string()));
        }
    }
    Ok(())
}
