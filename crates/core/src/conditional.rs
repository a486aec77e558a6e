//! Conditional request evaluation.
//!
//! Reads honor `If-Modified-Since`; writes honor `If-Unmodified-Since` and
//! `If-Match`. HTTP dates carry whole seconds, so stored timestamps are
//! truncated to the second before any date comparison. Header values that do
//! not parse are ignored rather than rejected.

use std::time::SystemTime;
use time::OffsetDateTime;

/// Prefix that versions the ETag format.
const ETAG_VERSION: &str = "v1";

/// Result of evaluating request preconditions against a stored resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Continue with the request.
    Proceed,
    /// The client copy is current (reads only).
    NotModified,
    /// The stored resource changed since the client observed it (writes only).
    PreconditionFailed,
}

/// Compute the ETag for a resource last modified at `last_modified`.
///
/// Format: `"v1-<unix nanoseconds in base 36>"`, quoted.
pub fn etag(last_modified: OffsetDateTime) -> String {
    let nanos = last_modified.unix_timestamp_nanos();
    let digits = to_base36(nanos.unsigned_abs());
    if nanos < 0 {
        format!("\"{ETAG_VERSION}--{digits}\"")
    } else {
        format!("\"{ETAG_VERSION}-{digits}\"")
    }
}

fn to_base36(mut n: u128) -> String {
    const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(ALPHABET[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Parse an RFC 7231 HTTP date. Returns `None` on malformed input.
pub fn parse_http_date(value: &str) -> Option<OffsetDateTime> {
    httpdate::parse_http_date(value.trim())
        .ok()
        .map(OffsetDateTime::from)
}

/// Format a timestamp as an RFC 7231 HTTP date (second resolution).
pub fn format_http_date(t: OffsetDateTime) -> String {
    httpdate::fmt_http_date(SystemTime::from(truncate_to_second(t)))
}

/// Drop sub-second precision.
pub fn truncate_to_second(t: OffsetDateTime) -> OffsetDateTime {
    t.replace_nanosecond(0).unwrap_or(t)
}

/// Preconditions attached to a read.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadConditions {
    pub if_modified_since: Option<OffsetDateTime>,
}

impl ReadConditions {
    /// Build from raw header values.
    pub fn from_headers(if_modified_since: Option<&str>) -> Self {
        Self {
            if_modified_since: if_modified_since.and_then(parse_http_date),
        }
    }

    /// Evaluate against a single resource.
    pub fn evaluate(&self, last_modified: OffsetDateTime) -> Outcome {
        match self.if_modified_since {
            Some(since) if truncate_to_second(last_modified) <= since => Outcome::NotModified,
            _ => Outcome::Proceed,
        }
    }

    /// Evaluate against a collection. The newest member decides; an empty
    /// collection always proceeds.
    pub fn evaluate_all<I>(&self, last_modified: I) -> Outcome
    where
        I: IntoIterator<Item = OffsetDateTime>,
    {
        match last_modified.into_iter().max() {
            Some(newest) => self.evaluate(newest),
            None => Outcome::Proceed,
        }
    }
}

/// Entity tags listed in an `If-Match` header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IfMatch {
    /// `*`: any current representation matches.
    Any,
    /// Explicit list, compared strongly after stripping quotes.
    Tags(Vec<String>),
}

impl IfMatch {
    /// Parse a header value. Empty values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        if value == "*" {
            return Some(Self::Any);
        }
        let tags: Vec<String> = value
            .split(',')
            .map(|t| unquote(t.trim()).to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if tags.is_empty() {
            None
        } else {
            Some(Self::Tags(tags))
        }
    }

    fn matches(&self, current: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Tags(tags) => {
                let current = unquote(current);
                tags.iter().any(|t| t == current)
            }
        }
    }
}

fn unquote(tag: &str) -> &str {
    tag.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(tag)
}

/// Preconditions attached to a write (update or delete).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteConditions {
    pub if_unmodified_since: Option<OffsetDateTime>,
    pub if_match: Option<IfMatch>,
}

impl WriteConditions {
    /// Build from raw header values.
    pub fn from_headers(if_unmodified_since: Option<&str>, if_match: Option<&str>) -> Self {
        Self {
            if_unmodified_since: if_unmodified_since.and_then(parse_http_date),
            if_match: if_match.and_then(IfMatch::parse),
        }
    }

    /// Whether any precondition is present.
    pub fn is_empty(&self) -> bool {
        self.if_unmodified_since.is_none() && self.if_match.is_none()
    }

    /// Evaluate against the stored resource. Both headers must pass.
    pub fn evaluate(&self, last_modified: OffsetDateTime) -> Outcome {
        if let Some(since) = self.if_unmodified_since
            && truncate_to_second(last_modified) > since
        {
            return Outcome::PreconditionFailed;
        }
        if let Some(if_match) = &self.if_match
            && !if_match.matches(&etag(last_modified))
        {
            return Outcome::PreconditionFailed;
        }
        Outcome::Proceed
    }
}
