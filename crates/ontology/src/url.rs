//! Base and versioned type URLs
//!
//! Every ontology type is identified by a base URL (`https://…/property-type/name/`).
//! A specific version renders as `{base}v/{version}`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Errors produced while parsing URLs and version ranges
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlError {
    #[error("type URL is empty")]
    Empty,

    #[error("type URL contains whitespace: {0:?}")]
    Whitespace(String),

    #[error("type URL has no version segment: {0}")]
    MissingVersion(String),

    #[error("invalid version in type URL: {0}")]
    InvalidVersion(String),

    #[error("invalid version range {min}..{max:?}")]
    InvalidRange { min: u32, max: Option<u32> },

    #[error("versioned reference {0} cannot also carry a version range")]
    ConflictingRange(String),
}

/// Stable identifier of an ontology type, independent of its version
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BaseUrl(String);

impl BaseUrl {
    /// Create a base URL, normalizing it to end with `/`
    pub fn new(url: impl Into<String>) -> Result<Self, UrlError> {
        let mut url: String = url.into();
        if url.trim().is_empty() {
            return Err(UrlError::Empty);
        }
        if url.chars().any(char::is_whitespace) {
            return Err(UrlError::Whitespace(url));
        }
        if !url.ends_with('/') {
            url.push('/');
        }
        Ok(Self(url))
    }

    /// Wrap a URL already known to be well formed
    pub(crate) fn from_trusted(url: String) -> Self {
        Self(url)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The versioned URL of this type at `version`
    pub fn at(&self, version: u32) -> VersionedUrl {
        VersionedUrl {
            base: self.clone(),
            version,
        }
    }

    /// Last path segment, e.g. `person` for `…/entity-type/person/`
    pub fn slug(&self) -> &str {
        let trimmed = self.0.trim_end_matches('/');
        trimmed.rsplit('/').next().unwrap_or(trimmed)
    }

    /// Whether this URL lives under `prefix`
    pub fn starts_with(&self, prefix: &BaseUrl) -> bool {
        self.0.starts_with(prefix.as_str())
    }
}

impl TryFrom<String> for BaseUrl {
    type Error = UrlError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BaseUrl> for String {
    fn from(value: BaseUrl) -> Self {
        value.0
    }
}

impl FromStr for BaseUrl {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A specific version of a type
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionedUrl {
    pub base: BaseUrl,
    pub version: u32,
}

impl VersionedUrl {
    pub fn new(base: BaseUrl, version: u32) -> Self {
        Self { base, version }
    }

    /// The URL of the version published after this one
    pub fn next(&self) -> Self {
        self.base.at(self.version + 1)
    }
}

impl FromStr for VersionedUrl {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, version) = s
            .trim_end_matches('/')
            .rsplit_once("/v/")
            .ok_or_else(|| UrlError::MissingVersion(s.to_string()))?;

        let version: u32 = version
            .parse()
            .map_err(|_| UrlError::InvalidVersion(s.to_string()))?;
        if version == 0 {
            return Err(UrlError::InvalidVersion(s.to_string()));
        }

        Ok(Self {
            base: BaseUrl::new(format!("{base}/"))?,
            version,
        })
    }
}

impl TryFrom<String> for VersionedUrl {
    type Error = UrlError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VersionedUrl> for String {
    fn from(value: VersionedUrl) -> Self {
        value.to_string()
    }
}

impl fmt::Display for VersionedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v/{}", self.base, self.version)
    }
}

/// Inclusive range of acceptable versions for a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionRange {
    pub min: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
}

impl VersionRange {
    pub fn new(min: u32, max: Option<u32>) -> Result<Self, UrlError> {
        if min == 0 || max.is_some_and(|max| max < min) {
            return Err(UrlError::InvalidRange { min, max });
        }
        Ok(Self { min, max })
    }

    /// Exactly one version
    pub fn exact(version: u32) -> Self {
        Self {
            min: version,
            max: Some(version),
        }
    }

    /// `version` or anything newer
    pub fn at_least(version: u32) -> Self {
        Self {
            min: version,
            max: None,
        }
    }

    /// Any published version
    pub fn any() -> Self {
        Self::at_least(1)
    }

    pub fn contains(&self, version: u32) -> bool {
        version >= self.min && self.max.is_none_or(|max| version <= max)
    }

    pub fn is_exact(&self) -> bool {
        self.max == Some(self.min)
    }

    /// Highest version from `versions` inside the range
    pub fn highest<I>(&self, versions: I) -> Option<u32>
    where
        I: IntoIterator<Item = u32>,
    {
        versions.into_iter().filter(|v| self.contains(*v)).max()
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "v{max}"),
            Some(max) => write!(f, "v{}..=v{max}", self.min),
            None => write!(f, "v{}..", self.min),
        }
    }
}

/// An unresolved reference as authored: a base URL plus acceptable versions
///
/// In declaration files this is written either as a versioned URL
/// (`{"$ref": "…/name/v/2"}`, exactly that version) or as a base URL with an
/// optional range (`{"$ref": "…/name/", "minVersion": 2}`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "TypeRefRepr", into = "TypeRefRepr")]
pub struct TypeRef {
    pub base: BaseUrl,
    pub range: VersionRange,
}

impl TypeRef {
    pub fn new(base: BaseUrl, range: VersionRange) -> Self {
        Self { base, range }
    }

    pub fn exact(url: &VersionedUrl) -> Self {
        Self {
            base: url.base.clone(),
            range: VersionRange::exact(url.version),
        }
    }

    pub fn any(base: BaseUrl) -> Self {
        Self {
            base,
            range: VersionRange::any(),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.base, self.range)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypeRefRepr {
    #[serde(rename = "$ref")]
    reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_version: Option<u32>,
}

impl TryFrom<TypeRefRepr> for TypeRef {
    type Error = UrlError;

    fn try_from(repr: TypeRefRepr) -> Result<Self, Self::Error> {
        if let Ok(url) = repr.reference.parse::<VersionedUrl>() {
            if repr.min_version.is_some() || repr.max_version.is_some() {
                return Err(UrlError::ConflictingRange(repr.reference));
            }
            return Ok(Self::exact(&url));
        }

        let base = BaseUrl::new(repr.reference)?;
        let range = VersionRange::new(repr.min_version.unwrap_or(1), repr.max_version)?;
        Ok(Self { base, range })
    }
}

impl From<TypeRef> for TypeRefRepr {
    fn from(value: TypeRef) -> Self {
        if value.range.is_exact() {
            return Self {
                reference: value.base.at(value.range.min).to_string(),
                min_version: None,
                max_version: None,
            };
        }
        Self {
            reference: value.base.into(),
            min_version: (value.range.min > 1).then_some(value.range.min),
            max_version: value.range.max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalizes_trailing_slash() {
        let url = BaseUrl::new("https://example.com/@alice/types/entity-type/person").unwrap();
        assert_eq!(url.as_str(), "https://example.com/@alice/types/entity-type/person/");
        assert_eq!(url.slug(), "person");
    }

    #[test]
    fn test_base_url_rejects_empty_and_whitespace() {
        assert_eq!(BaseUrl::new("  "), Err(UrlError::Empty));
        assert!(matches!(
            BaseUrl::new("https://example.com/a b/"),
            Err(UrlError::Whitespace(_))
        ));
    }

    #[test]
    fn test_versioned_url_display_and_parse() {
        let base = BaseUrl::new("https://example.com/types/data-type/text/").unwrap();
        let url = base.at(3);
        assert_eq!(url.to_string(), "https://example.com/types/data-type/text/v/3");

        let parsed: VersionedUrl = url.to_string().parse().unwrap();
        assert_eq!(parsed, url);
        assert_eq!(parsed.next().version, 4);
    }

    #[test]
    fn test_versioned_url_rejects_bad_versions() {
        assert!(matches!(
            "https://example.com/text/".parse::<VersionedUrl>(),
            Err(UrlError::MissingVersion(_))
        ));
        assert!(matches!(
            "https://example.com/text/v/0".parse::<VersionedUrl>(),
            Err(UrlError::InvalidVersion(_))
        ));
        assert!(matches!(
            "https://example.com/text/v/x".parse::<VersionedUrl>(),
            Err(UrlError::InvalidVersion(_))
        ));
    }

    #[test]
    fn test_version_range() {
        let range = VersionRange::new(2, Some(4)).unwrap();
        assert!(!range.contains(1));
        assert!(range.contains(2));
        assert!(range.contains(4));
        assert!(!range.contains(5));
        assert_eq!(range.highest([1, 3, 5]), Some(3));
        assert_eq!(VersionRange::any().highest([1, 2, 7]), Some(7));
        assert!(VersionRange::new(3, Some(2)).is_err());
        assert!(VersionRange::new(0, None).is_err());
    }

    #[test]
    fn test_type_ref_from_versioned_url_is_exact() {
        let reference: TypeRef =
            serde_json::from_str(r#"{"$ref": "https://example.com/name/v/2"}"#).unwrap();
        assert_eq!(reference.range, VersionRange::exact(2));
        assert_eq!(reference.base.as_str(), "https://example.com/name/");
    }

    #[test]
    fn test_type_ref_from_base_url_with_range() {
        let reference: TypeRef = serde_json::from_str(
            r#"{"$ref": "https://example.com/name/", "minVersion": 2, "maxVersion": 3}"#,
        )
        .unwrap();
        assert_eq!(reference.range, VersionRange::new(2, Some(3)).unwrap());

        let any: TypeRef = serde_json::from_str(r#"{"$ref": "https://example.com/name/"}"#).unwrap();
        assert_eq!(any.range, VersionRange::any());
    }

    #[test]
    fn test_type_ref_rejects_conflicting_range() {
        let result: Result<TypeRef, _> = serde_json::from_str(
            r#"{"$ref": "https://example.com/name/v/2", "minVersion": 1}"#,
        );
        assert!(result.is_err());
    }
}
