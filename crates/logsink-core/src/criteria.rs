// ABOUTME: MatchCriteria filter descriptor and the predicate deciding whether an entry matches it.
// ABOUTME: Shared by queries and deletions so every store applies identical field semantics.

use crate::entry::{LogEntry, LogLevel};

/// A flat AND-of-ORs filter. Every set-valued field accepts everything when
/// empty; `start` and `end` are inclusive epoch-millisecond bounds where 0
/// means unbounded.
///
/// `limit` is carried for queries only. It is never consulted by
/// [`MatchCriteria::matches`]; callers apply it after matching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchCriteria {
    pub origin_services: Vec<String>,
    pub log_levels: Vec<LogLevel>,
    pub labels: Vec<String>,
    pub keywords: Vec<String>,
    pub start: i64,
    pub end: i64,
    pub limit: usize,
}

impl MatchCriteria {
    /// True when no filter field is active, i.e. every entry matches.
    pub fn is_unfiltered(&self) -> bool {
        self.origin_services.is_empty()
            && self.log_levels.is_empty()
            && self.labels.is_empty()
            && self.keywords.is_empty()
            && self.start <= 0
            && self.end <= 0
    }

    /// Decide whether `entry` satisfies every active field.
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if !self.origin_services.is_empty()
            && !self.origin_services.iter().any(|s| *s == entry.origin_service)
        {
            return false;
        }

        if !self.log_levels.is_empty() && !self.log_levels.contains(&entry.level) {
            return false;
        }

        if !self.labels.is_empty()
            && !self.labels.iter().any(|label| entry.labels.contains(label))
        {
            return false;
        }

        // The empty keyword is a substring of every message.
        if !self.keywords.is_empty()
            && !self.keywords.iter().any(|k| entry.message.contains(k.as_str()))
        {
            return false;
        }

        if self.start > 0 && self.start > entry.created {
            return false;
        }

        if self.end > 0 && self.end < entry.created {
            return false;
        }

        true
    }
}
