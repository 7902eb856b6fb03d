//! Version normalization across semantic, timestamp, and label schemes.
//!
//! Every raw version string normalizes to a [`Version`]; normalization never
//! fails, unrecognized input simply becomes a label. Versions are totally
//! ordered: within a scheme by the scheme's natural order, across schemes
//! `semantic < timestamp < label`. Two versions are equal exactly when their
//! canonical forms are equal, so `"v1.0"` and `"1.0.0"` are the same version.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use regex::Regex;
use semver::BuildMetadata;

use docpipe_shared::{DocpipeError, Result};

/// Which scheme a version was recognized as. Declaration order is the
/// cross-scheme ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VersionScheme {
    Semantic,
    Timestamp,
    Label,
}

impl VersionScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Timestamp => "timestamp",
            Self::Label => "label",
        }
    }
}

impl fmt::Display for VersionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How many fields of a semantic version were spelled out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    /// `1`
    Major,
    /// `1.2`
    Minor,
    /// `1.2.3`, possibly with pre-release or build metadata.
    Patch,
}

#[derive(Debug, Clone)]
enum Normalized {
    Semantic {
        version: semver::Version,
        precision: Precision,
    },
    Timestamp(DateTime<Utc>),
    Label,
}

/// A normalized version with its raw spelling and canonical form.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    canonical: String,
    kind: Normalized,
}

impl Version {
    /// Normalize `raw`. See [`normalize`].
    pub fn parse(raw: &str) -> Self {
        normalize(raw)
    }

    /// The string this version was normalized from.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Canonical spelling; equal versions share it.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn scheme(&self) -> VersionScheme {
        match self.kind {
            Normalized::Semantic { .. } => VersionScheme::Semantic,
            Normalized::Timestamp(_) => VersionScheme::Timestamp,
            Normalized::Label => VersionScheme::Label,
        }
    }

    /// Spelled-out precision of a semantic version.
    pub fn precision(&self) -> Option<Precision> {
        match self.kind {
            Normalized::Semantic { precision, .. } => Some(precision),
            _ => None,
        }
    }

    /// Whether this is a semantic pre-release (`1.0.0-beta.1`).
    pub fn is_prerelease(&self) -> bool {
        matches!(&self.kind, Normalized::Semantic { version, .. } if !version.pre.is_empty())
    }

    fn semver(&self) -> Option<&semver::Version> {
        match &self.kind {
            Normalized::Semantic { version, .. } => Some(version),
            _ => None,
        }
    }
}

impl From<&str> for Version {
    fn from(raw: &str) -> Self {
        normalize(raw)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let within = match (&self.kind, &other.kind) {
            (Normalized::Semantic { version: a, .. }, Normalized::Semantic { version: b, .. }) => {
                a.cmp(b)
            }
            (Normalized::Timestamp(a), Normalized::Timestamp(b)) => a.cmp(b),
            _ => Ordering::Equal,
        };
        self.scheme()
            .cmp(&other.scheme())
            .then(within)
            // Keeps Ord consistent with canonical equality (`2024-01-01` vs
            // `2024-01-01T00:00:00Z`), and orders labels byte-wise.
            .then_with(|| self.canonical.as_bytes().cmp(other.canonical.as_bytes()))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

static PARTIAL_SEMVER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(0|[1-9]\d*)(?:\.(0|[1-9]\d*))?$").expect("valid regex"));

static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{4})([-.]?)(\d{2})([-.]?)(\d{2})(?:[T ](\d{2}):(\d{2})(?::(\d{2}))?(Z|[+-]\d{2}:?\d{2})?)?$",
    )
    .expect("valid regex")
});

/// Normalize a raw version string. Never fails.
///
/// Detection order: semantic (optional `v` prefix, full or partial), then
/// timestamp (`YYYY-MM-DD` / `YYYY.MM.DD` / `YYYYMMDD` with optional time, or
/// RFC 3339), then label. A valid calendar date is never semantic, even when
/// it also fits semver's grammar (`2024.10.15`, `20240115`).
pub fn normalize(raw: &str) -> Version {
    let trimmed = raw.trim();

    if let Some((version, precision)) = parse_semantic(trimmed) {
        let canonical = version.to_string();
        return Version {
            raw: raw.to_string(),
            canonical,
            kind: Normalized::Semantic { version, precision },
        };
    }

    if let Some((at, date_only)) = parse_timestamp(trimmed) {
        let canonical = if date_only {
            at.format("%Y-%m-%d").to_string()
        } else {
            at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
        };
        return Version {
            raw: raw.to_string(),
            canonical,
            kind: Normalized::Timestamp(at),
        };
    }

    Version {
        raw: raw.to_string(),
        canonical: trimmed.to_string(),
        kind: Normalized::Label,
    }
}

/// Compare two versions. Same as `a.cmp(b)`.
pub fn compare(a: &Version, b: &Version) -> Ordering {
    a.cmp(b)
}

fn parse_semantic(s: &str) -> Option<(semver::Version, Precision)> {
    let body = s.strip_prefix(['v', 'V']).unwrap_or(s);

    // Calendar dates such as `2024.10.15` and `20240115` also fit semver.
    if parse_timestamp(body).is_some() {
        return None;
    }

    if let Ok(mut version) = semver::Version::parse(body) {
        version.build = BuildMetadata::EMPTY;
        // `2024.10.15+build` would otherwise canonicalize to a date.
        if parse_timestamp(&version.to_string()).is_some() {
            return None;
        }
        return Some((version, Precision::Patch));
    }

    let caps = PARTIAL_SEMVER_RE.captures(body)?;
    let major: u64 = caps[1].parse().ok()?;
    match caps.get(2) {
        Some(minor) => Some((
            semver::Version::new(major, minor.as_str().parse().ok()?, 0),
            Precision::Minor,
        )),
        None => Some((semver::Version::new(major, 0, 0), Precision::Major)),
    }
}

fn parse_timestamp(s: &str) -> Option<(DateTime<Utc>, bool)> {
    if let Some(caps) = TIMESTAMP_RE.captures(s) {
        // Both date separators must agree.
        if caps[2] != caps[4] {
            return None;
        }
        let date = NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[3].parse().ok()?,
            caps[5].parse().ok()?,
        )?;

        let Some(hour) = caps.get(6) else {
            let at = date.and_time(NaiveTime::MIN).and_utc();
            return Some((at, true));
        };

        let time = NaiveTime::from_hms_opt(
            hour.as_str().parse().ok()?,
            caps[7].parse().ok()?,
            caps.get(8).map_or(Some(0), |m| m.as_str().parse().ok())?,
        )?;
        let offset = match caps.get(9).map(|m| m.as_str()) {
            None | Some("Z") => FixedOffset::east_opt(0)?,
            Some(offset) => parse_offset(offset)?,
        };
        let at = offset
            .from_local_datetime(&date.and_time(time))
            .single()?
            .with_timezone(&Utc);
        return Some((at, false));
    }

    // Fractional seconds and other RFC 3339 spellings.
    let at = DateTime::parse_from_rfc3339(s).ok()?.with_timezone(&Utc);
    Some((at.with_nanosecond(0)?, false))
}

/// `+HH:MM` or `-HHMM` to a fixed offset.
fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let sign = if raw.starts_with('-') { -1 } else { 1 };
    let digits: String = raw[1..].chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

// ---------------------------------------------------------------------------
// Inheritance
// ---------------------------------------------------------------------------

/// Pick the highest available version compatible with `requested`.
///
/// - semantic: highest available with the same major, whatever the
///   request's precision (`1`, `1.2` and `1.0.0` all pick the highest `1.x.y`)
/// - a fully spelled-out semantic request that is itself available resolves
///   to itself
/// - pre-release candidates are only considered for pre-release requests
/// - timestamp: the latest version at or after the requested time
/// - label: only an equal label
pub fn resolve_inheritance(requested: &Version, available: &[Version]) -> Result<Version> {
    if requested.precision() == Some(Precision::Patch) {
        if let Some(exact) = available.iter().rev().find(|v| *v == requested) {
            return Ok(exact.clone());
        }
    }

    available
        .iter()
        .filter(|candidate| is_compatible(requested, candidate))
        .max()
        .cloned()
        .ok_or_else(|| DocpipeError::NoCompatibleVersion {
            requested: requested.raw().to_string(),
            available: available.iter().map(|v| v.canonical().to_string()).collect(),
        })
}

fn is_compatible(requested: &Version, candidate: &Version) -> bool {
    if requested.scheme() != candidate.scheme() {
        return false;
    }

    match requested.scheme() {
        VersionScheme::Semantic => {
            let (Some(req), Some(cand)) = (requested.semver(), candidate.semver()) else {
                return false;
            };
            if candidate.is_prerelease() && !requested.is_prerelease() {
                return false;
            }
            cand.major == req.major
        }
        VersionScheme::Timestamp => candidate >= requested,
        VersionScheme::Label => candidate == requested,
    }
}
