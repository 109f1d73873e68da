// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Topic names and topic filters.
//!
//! A topic name addresses a single publication and never contains wildcards.
//! A topic filter is a subscription pattern where any level may be `+` and
//! the last level may be `#`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils;

pub const LEVEL_SEPARATOR: char = '/';
pub const SINGLE_WILDCARD: &str = "+";
pub const MULTI_WILDCARD: &str = "#";

/// Prefix of server internal topics like `$SYS`.
pub const SYS_PREFIX: char = '$';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicError {
    EmptyTopic,
    InvalidString,
    /// Wildcard character in a topic name.
    WildcardInName,
    /// `#` is not the last level, or `+`/`#` is part of a longer level.
    InvalidWildcard,
}

impl fmt::Display for TopicError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for TopicError {}

/// A validated topic name.
///
/// A non-empty sequence of UTF-8 levels separated by `/`. Levels may be
/// empty. The name must not contain `+` or `#` [MQTT-4.7.3-1].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicName(String);

impl TopicName {
    /// Validate `s` as a topic name.
    ///
    /// # Errors
    ///
    /// Returns error if `s` is empty, too long or contains wildcards.
    pub fn parse(s: &str) -> Result<Self, TopicError> {
        if s.is_empty() {
            return Err(TopicError::EmptyTopic);
        }
        if !utils::is_valid_string(s) {
            return Err(TopicError::InvalidString);
        }
        if s.contains(['+', '#']) {
            return Err(TopicError::WildcardInName);
        }
        Ok(Self(s.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Topics starting with `$` are reserved for server internal use.
    #[must_use]
    pub fn is_sys(&self) -> bool {
        self.0.starts_with(SYS_PREFIX)
    }
}

impl fmt::Display for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One level of a parsed topic filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum Level {
    Literal(String),

    /// `+` matches exactly one level.
    Single,

    /// `#` matches the remaining zero or more levels.
    Multi,
}

/// A validated topic filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicFilter {
    filter: String,
    levels: Vec<Level>,
}

impl TopicFilter {
    /// Validate `s` as a topic filter.
    ///
    /// The multi-level wildcard MUST be the last character of the filter and
    /// either on its own or following a separator [MQTT-4.7.1-2]. The
    /// single-level wildcard MUST occupy an entire level [MQTT-4.7.1-3].
    ///
    /// # Errors
    ///
    /// Returns error if `s` is empty or wildcards are misplaced.
    pub fn parse(s: &str) -> Result<Self, TopicError> {
        if s.is_empty() {
            return Err(TopicError::EmptyTopic);
        }
        if !utils::is_valid_string(s) {
            return Err(TopicError::InvalidString);
        }

        let parts: Vec<&str> = s.split(LEVEL_SEPARATOR).collect();
        let last = parts.len() - 1;
        let mut levels = Vec::with_capacity(parts.len());
        for (index, part) in parts.iter().enumerate() {
            let level = match *part {
                SINGLE_WILDCARD => Level::Single,
                MULTI_WILDCARD => {
                    if index != last {
                        return Err(TopicError::InvalidWildcard);
                    }
                    Level::Multi
                }
                literal => {
                    if literal.contains(['+', '#']) {
                        return Err(TopicError::InvalidWildcard);
                    }
                    Level::Literal(literal.to_string())
                }
            };
            levels.push(level);
        }

        Ok(Self {
            filter: s.to_string(),
            levels,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.filter
    }

    #[must_use]
    pub fn has_wildcard(&self) -> bool {
        self.levels
            .iter()
            .any(|l| matches!(l, Level::Single | Level::Multi))
    }

    /// Check whether `topic` matches this filter.
    ///
    /// Levels are compared one by one; `+` matches exactly one level and a
    /// trailing `#` matches the remaining levels, including none at all, so
    /// `a/#` matches `a`. The wildcards do not match topics starting with
    /// `$` unless the first filter level is a literal [MQTT-4.7.2-1].
    #[must_use]
    pub fn matches(&self, topic: &str) -> bool {
        // The Server MUST NOT match topic filters starting with a wildcard
        // character with topic names beginning with a $ character.
        if topic.starts_with(SYS_PREFIX)
            && matches!(self.levels.first(), Some(Level::Single | Level::Multi))
        {
            return false;
        }

        let mut topic_levels = topic.split(LEVEL_SEPARATOR);
        for level in &self.levels {
            match level {
                Level::Multi => return true,
                Level::Single => {
                    if topic_levels.next().is_none() {
                        return false;
                    }
                }
                Level::Literal(literal) => match topic_levels.next() {
                    Some(part) if part == literal => {}
                    _ => return false,
                },
            }
        }

        // Unmatched topic levels remain; `a/b` does not match `a`.
        topic_levels.next().is_none()
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_topic_name() {
        assert!(TopicName::parse("home/kitchen/temp").is_ok());
        assert!(TopicName::parse("/leading/empty").is_ok());
        assert!(TopicName::parse("$SYS/broker/uptime").is_ok());
        assert_eq!(TopicName::parse("").unwrap_err(), TopicError::EmptyTopic);
        assert_eq!(
            TopicName::parse("a/+/b").unwrap_err(),
            TopicError::WildcardInName
        );
        assert_eq!(
            TopicName::parse("a/#").unwrap_err(),
            TopicError::WildcardInName
        );
    }

    #[test]
    fn test_parse_topic_filter() {
        assert!(TopicFilter::parse("a/b/c").is_ok());
        assert!(TopicFilter::parse("#").is_ok());
        assert!(TopicFilter::parse("+/+/#").is_ok());
        assert!(TopicFilter::parse("sport/+/player1").is_ok());
        assert_eq!(
            TopicFilter::parse("a/#/b").unwrap_err(),
            TopicError::InvalidWildcard
        );
        assert_eq!(
            TopicFilter::parse("a/b#").unwrap_err(),
            TopicError::InvalidWildcard
        );
        assert_eq!(
            TopicFilter::parse("a/b+/c").unwrap_err(),
            TopicError::InvalidWildcard
        );
    }

    #[test]
    fn test_literal_match() {
        let filter = TopicFilter::parse("a/b/c").unwrap();
        assert!(filter.matches("a/b/c"));
        assert!(!filter.matches("a/b"));
        assert!(!filter.matches("a/b/c/d"));
        assert!(!filter.matches("a/b/x"));
    }

    #[test]
    fn test_single_wildcard_match() {
        let filter = TopicFilter::parse("a/+/c").unwrap();
        assert!(filter.matches("a/b/c"));
        assert!(filter.matches("a//c"));
        assert!(!filter.matches("a/b/d"));
        assert!(!filter.matches("a/b/c/d"));

        // `+` matches exactly one level.
        let filter = TopicFilter::parse("+").unwrap();
        assert!(filter.matches("finance"));
        assert!(!filter.matches("finance/stock"));
    }

    #[test]
    fn test_multi_wildcard_match() {
        let filter = TopicFilter::parse("a/#").unwrap();
        assert!(filter.matches("a/b"));
        assert!(filter.matches("a/b/c/d"));
        // `#` matches the empty continuation as well.
        assert!(filter.matches("a"));
        assert!(!filter.matches("b/a"));

        let filter = TopicFilter::parse("#").unwrap();
        assert!(filter.matches("a"));
        assert!(filter.matches("a/b/c"));
    }

    #[test]
    fn test_sys_topics_hidden_from_root_wildcards() {
        let multi = TopicFilter::parse("#").unwrap();
        let single = TopicFilter::parse("+/broker/uptime").unwrap();
        assert!(!multi.matches("$SYS/broker/uptime"));
        assert!(!single.matches("$SYS/broker/uptime"));

        // An explicit $SYS prefix still matches.
        let explicit = TopicFilter::parse("$SYS/#").unwrap();
        assert!(explicit.matches("$SYS/broker/uptime"));
    }

    #[test]
    fn test_empty_levels() {
        let filter = TopicFilter::parse("a//c").unwrap();
        assert!(filter.matches("a//c"));
        assert!(!filter.matches("a/c"));

        let filter = TopicFilter::parse("/+").unwrap();
        assert!(filter.matches("/finance"));
        assert!(!filter.matches("finance"));
    }
}
