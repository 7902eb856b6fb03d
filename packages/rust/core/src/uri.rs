//! URI template parsing and parameter extraction.
//!
//! Templates look like `docs://api/{version}/{page}`: the path after the
//! scheme is split on `/`, and a segment of the exact form `{name}` is a
//! parameter slot. Matching is purely structural; typing happens in
//! [`validate_parameters`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use docpipe_shared::{DocpipeError, RESOURCE_SCHEME, Result, VERSION_SEPARATOR};

use crate::version::{Version, normalize};

/// Parameter values exactly as they appeared in a URI.
pub type RawParameters = BTreeMap<String, String>;

/// Declared parameter name → semantic type.
pub type ParameterTypes = BTreeMap<String, ParamType>;

/// Typed parameters extracted from a URI.
pub type ParameterSet = BTreeMap<String, ParamValue>;

/// Semantic type of a template parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Version,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Version => "version",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamType {
    type Err = DocpipeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "str" => Ok(Self::String),
            "integer" | "int" => Ok(Self::Integer),
            "version" => Ok(Self::Version),
            other => Err(DocpipeError::config(format!(
                "unknown parameter type {other:?} (expected string, integer, or version)"
            ))),
        }
    }
}

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Version(Version),
}

impl ParamValue {
    pub fn param_type(&self) -> ParamType {
        match self {
            Self::Str(_) => ParamType::String,
            Self::Int(_) => ParamType::Integer,
            Self::Version(_) => ParamType::Version,
        }
    }

    pub fn as_version(&self) -> Option<&Version> {
        match self {
            Self::Version(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(n) => write!(f, "{n}"),
            Self::Version(v) => write!(f, "{v}"),
        }
    }
}

// ---------------------------------------------------------------------------
// UriTemplate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(String),
}

/// A parsed `docs://` URI template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl UriTemplate {
    /// Parse a template string.
    pub fn parse(template: &str) -> Result<Self> {
        let invalid = |reason: &str| DocpipeError::InvalidTemplate {
            template: template.to_string(),
            reason: reason.to_string(),
        };

        let path = template
            .strip_prefix(RESOURCE_SCHEME)
            .ok_or_else(|| invalid("must start with docs://"))?;
        if path.is_empty() {
            return Err(invalid("empty path"));
        }

        let mut segments = Vec::new();
        for part in path.split('/') {
            if part.is_empty() {
                return Err(invalid("empty path segment"));
            }
            if let Some(name) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                {
                    return Err(invalid(&format!("invalid parameter name {name:?}")));
                }
                if segments.iter().any(|s| matches!(s, Segment::Slot(n) if n == name)) {
                    return Err(invalid(&format!("duplicate parameter {name:?}")));
                }
                segments.push(Segment::Slot(name.to_string()));
            } else if part.contains(['{', '}']) {
                return Err(invalid(&format!("stray brace in segment {part:?}")));
            } else if part.contains(VERSION_SEPARATOR) {
                return Err(invalid(&format!(
                    "segment {part:?} uses the reserved '{VERSION_SEPARATOR}'"
                )));
            } else {
                segments.push(Segment::Literal(part.to_string()));
            }
        }

        Ok(Self {
            raw: template.to_string(),
            segments,
        })
    }

    /// The template string as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Slot names in template order.
    pub fn slots(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Slot(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Number of path segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The same template with slot `name` removed.
    pub(crate) fn without_slot(&self, name: &str) -> Result<Self> {
        let segments: Vec<Segment> = self
            .segments
            .iter()
            .filter(|s| !matches!(s, Segment::Slot(n) if n == name))
            .cloned()
            .collect();
        if segments.is_empty() {
            return Err(DocpipeError::InvalidTemplate {
                template: self.raw.clone(),
                reason: format!("no segments left once {name:?} is removed"),
            });
        }

        let mut raw = String::from(RESOURCE_SCHEME);
        raw.push_str(
            &segments
                .iter()
                .map(|s| match s {
                    Segment::Literal(l) => l.clone(),
                    Segment::Slot(n) => format!("{{{n}}}"),
                })
                .collect::<Vec<_>>()
                .join("/"),
        );
        Ok(Self { raw, segments })
    }

    /// Structurally match `uri` and capture each slot's segment verbatim.
    pub fn extract(&self, uri: &str) -> Result<RawParameters> {
        let mismatch = |reason: String| DocpipeError::TemplateMismatch {
            template: self.raw.clone(),
            uri: uri.to_string(),
            reason,
        };

        let path = uri
            .strip_prefix(RESOURCE_SCHEME)
            .ok_or_else(|| mismatch("scheme is not docs://".into()))?;
        let parts: Vec<&str> = path.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(mismatch("empty path segment".into()));
        }
        if parts.len() != self.segments.len() {
            return Err(mismatch(format!(
                "expected {} segments, found {}",
                self.segments.len(),
                parts.len()
            )));
        }

        let mut raw = RawParameters::new();
        for (segment, part) in self.segments.iter().zip(&parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(literal) => {
                    return Err(mismatch(format!("expected {literal:?}, found {part:?}")));
                }
                Segment::Slot(name) => {
                    raw.insert(name.clone(), (*part).to_string());
                }
            }
        }
        Ok(raw)
    }

    /// Substitute slot values. Every slot must have a value.
    pub(crate) fn expand(&self, values: &BTreeMap<&str, String>) -> Result<String> {
        let mut parts = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => parts.push(literal.as_str()),
                Segment::Slot(name) => {
                    let value = values.get(name.as_str()).ok_or_else(|| {
                        DocpipeError::ParameterType {
                            name: name.clone(),
                            expected: "a value".into(),
                            value: "<missing>".into(),
                        }
                    })?;
                    parts.push(value.as_str());
                }
            }
        }
        Ok(format!("{RESOURCE_SCHEME}{}", parts.join("/")))
    }
}

impl fmt::Display for UriTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Coerce raw values to their declared types.
///
/// Missing, undeclared, or uncoercible parameters fail with
/// [`DocpipeError::ParameterType`] naming the parameter.
pub fn validate_parameters(types: &ParameterTypes, raw: &RawParameters) -> Result<ParameterSet> {
    if let Some((name, value)) = raw.iter().find(|(name, _)| !types.contains_key(*name)) {
        return Err(DocpipeError::ParameterType {
            name: name.clone(),
            expected: "no such parameter".into(),
            value: value.clone(),
        });
    }

    let mut params = ParameterSet::new();
    for (name, ty) in types {
        let value = raw.get(name).ok_or_else(|| DocpipeError::ParameterType {
            name: name.clone(),
            expected: ty.to_string(),
            value: "<missing>".into(),
        })?;

        let typed = match ty {
            ParamType::String => ParamValue::Str(value.clone()),
            ParamType::Integer => {
                ParamValue::Int(value.parse().map_err(|_| DocpipeError::ParameterType {
                    name: name.clone(),
                    expected: ty.to_string(),
                    value: value.clone(),
                })?)
            }
            ParamType::Version => ParamValue::Version(normalize(value)),
        };

        // Whatever is accepted here has to render back into a path segment.
        let text = typed.to_string();
        if text.is_empty() || text.contains(['/', VERSION_SEPARATOR]) {
            return Err(DocpipeError::ParameterType {
                name: name.clone(),
                expected: format!("{ty} without '/' or '~'"),
                value: value.clone(),
            });
        }
        params.insert(name.clone(), typed);
    }
    Ok(params)
}
