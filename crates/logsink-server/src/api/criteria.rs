// ABOUTME: Translates the segments after /api/v1/logs/ into a MatchCriteria.
// ABOUTME: Accepts filter pairs in a fixed order followed by numeric start/end/limit segments.

use logsink_core::{LogLevel, MatchCriteria, ParseLevelError, now_millis};
use thiserror::Error;

/// Filter segment names, in the order they may appear in a path.
const FILTERS: [&str; 4] = ["logLevels", "originServices", "labels", "keywords"];

/// What a path must end with after its filter pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trailing {
    /// `{limit}` alone, or `{start}/{end}/{limit}`.
    Query,
    /// `{start}/{end}`.
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CriteriaError {
    #[error("no route for logs path '{0}'")]
    UnknownPath(String),

    #[error("could not parse {field} '{value}'")]
    NotANumber { field: &'static str, value: String },

    #[error("{field} is not positive: {value}")]
    Negative { field: &'static str, value: i64 },

    #[error("age value too large: {0}")]
    AgeTooLarge(i64),

    #[error(transparent)]
    Level(#[from] ParseLevelError),
}

/// Parse `rest`, the path below `/api/v1/logs/`, into criteria.
///
/// Filters are `name/value` pairs drawn from `logLevels`, `originServices`,
/// `labels`, `keywords`, each at most once and in that order. Values are
/// comma-separated lists; an empty value means no filter. A bare `{limit}` is
/// only accepted for queries without filters. Deletes also accept
/// `removeOld/age/{age}`, see [`older_than`].
pub fn parse_logs_path(rest: &str, trailing: Trailing) -> Result<MatchCriteria, CriteriaError> {
    let segments: Vec<&str> = rest.split('/').collect();
    if let ["removeOld", "age", age] = segments.as_slice() {
        return match trailing {
            Trailing::Delete => older_than(age, now_millis()),
            Trailing::Query => Err(CriteriaError::UnknownPath(rest.to_string())),
        };
    }

    let mut criteria = MatchCriteria::default();
    let mut pos = 0;
    let mut next_filter = 0;

    while let Some(segment) = segments.get(pos) {
        let Some(offset) = FILTERS[next_filter..].iter().position(|f| f == segment) else {
            break;
        };
        let field = next_filter + offset;
        let Some(value) = segments.get(pos + 1) else {
            return Err(CriteriaError::UnknownPath(rest.to_string()));
        };
        apply_filter(&mut criteria, FILTERS[field], value)?;
        next_filter = field + 1;
        pos += 2;
    }

    let filtered = pos > 0;
    match (trailing, &segments[pos..]) {
        (Trailing::Query, [limit]) if !filtered => {
            criteria.limit = parse_limit(limit)?;
        }
        (Trailing::Query, [start, end, limit]) => {
            criteria.start = parse_non_negative("start", start)?;
            criteria.end = parse_non_negative("end", end)?;
            criteria.limit = parse_limit(limit)?;
        }
        (Trailing::Delete, [start, end]) => {
            criteria.start = parse_non_negative("start", start)?;
            criteria.end = parse_non_negative("end", end)?;
        }
        _ => return Err(CriteriaError::UnknownPath(rest.to_string())),
    }

    Ok(criteria)
}

/// Criteria selecting every entry created at least `age` milliseconds before
/// `now`. The age must leave a positive cutoff, since an `end` of 0 would mean
/// no bound at all.
pub fn older_than(age: &str, now: i64) -> Result<MatchCriteria, CriteriaError> {
    let age = parse_non_negative("age", age)?;
    if age >= now {
        return Err(CriteriaError::AgeTooLarge(age));
    }
    Ok(MatchCriteria {
        end: now - age,
        ..Default::default()
    })
}

fn apply_filter(criteria: &mut MatchCriteria, name: &str, value: &str) -> Result<(), CriteriaError> {
    let values = split_list(value);
    match name {
        "logLevels" => {
            criteria.log_levels = values
                .iter()
                .map(|v| v.parse::<LogLevel>())
                .collect::<Result<_, _>>()?;
        }
        "originServices" => criteria.origin_services = values,
        "labels" => criteria.labels = values,
        _ => criteria.keywords = values,
    }
    Ok(())
}

fn split_list(value: &str) -> Vec<String> {
    if value.is_empty() {
        Vec::new()
    } else {
        value.split(',').map(String::from).collect()
    }
}

fn parse_non_negative(field: &'static str, value: &str) -> Result<i64, CriteriaError> {
    let parsed = value
        .parse::<i64>()
        .map_err(|_| CriteriaError::NotANumber {
            field,
            value: value.to_string(),
        })?;
    if parsed < 0 {
        return Err(CriteriaError::Negative {
            field,
            value: parsed,
        });
    }
    Ok(parsed)
}

fn parse_limit(value: &str) -> Result<usize, CriteriaError> {
    let limit = parse_non_negative("limit", value)?;
    usize::try_from(limit).map_err(|_| CriteriaError::NotANumber {
        field: "limit",
        value: value.to_string(),
    })
}
