use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Delimiter between permission segments (`resource:action:scope`).
pub const SEGMENT_DELIMITER: char = ':';

/// A segment that matches any value in the same position.
pub const WILDCARD_SEGMENT: &str = "*";

/// Single-token form of "all permissions".
pub const UNIVERSAL_WILDCARD: &str = "*";

/// Fully segmented form of "all permissions".
pub const FULL_WILDCARD: &str = "*:*:*";

/// Namespaces whose all-wildcard grant (`admin:*:*`) unlocks everything,
/// unless configured otherwise.
pub const DEFAULT_SUPERUSER_NAMESPACES: &[&str] = &["admin"];

/// Permission identifier.
///
/// Permissions are opaque strings, canonically `resource:action:scope`, where
/// any segment may be the wildcard `*`. There is no negative permission: the
/// absence of a match is the only deny.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `*` or `*:*:*`.
    pub fn is_wildcard(&self) -> bool {
        is_universal(self.as_str())
    }

    /// Whether holding this permission satisfies `required`.
    pub fn grants(&self, required: &str) -> bool {
        grants(self.as_str(), required)
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Permission {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Whether any held permission satisfies `required`.
///
/// Rules, first match wins: exact equality; a universal wildcard held;
/// segment-wise wildcard match over equal segment counts; an all-wildcard
/// grant in one of [`DEFAULT_SUPERUSER_NAMESPACES`].
pub fn matches<H: AsRef<str>>(held: &[H], required: &str) -> bool {
    held.iter().any(|p| {
        let p = p.as_ref();
        grants(p, required) || is_superuser(DEFAULT_SUPERUSER_NAMESPACES, p)
    })
}

/// Whether any entry of `required` is satisfied by `held`.
pub fn matches_any<H: AsRef<str>, R: AsRef<str>>(held: &[H], required: &[R]) -> bool {
    required.iter().any(|r| matches(held, r.as_ref()))
}

fn grants(held: &str, required: &str) -> bool {
    held == required || is_universal(held) || segments_match(held, required)
}

fn is_universal(permission: &str) -> bool {
    permission == UNIVERSAL_WILDCARD || permission == FULL_WILDCARD
}

fn segments_match(held: &str, required: &str) -> bool {
    if !held.contains(WILDCARD_SEGMENT) {
        return false;
    }

    let mut held_segments = held.split(SEGMENT_DELIMITER);
    let mut required_segments = required.split(SEGMENT_DELIMITER);

    loop {
        match (held_segments.next(), required_segments.next()) {
            (None, None) => return true,
            (Some(h), Some(r)) if h == WILDCARD_SEGMENT || h == r => {}
            // Segment-count mismatch never matches, wildcards included.
            _ => return false,
        }
    }
}

/// Permission matcher with configurable superuser namespaces.
///
/// A namespace `ns` turns any held `ns:*[:*...]` into a grant for every
/// permission. The default matcher uses [`DEFAULT_SUPERUSER_NAMESPACES`] and
/// behaves exactly like [`matches`]; [`PermissionMatcher::without_superusers`]
/// keeps only the plain rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionMatcher {
    superuser_namespaces: Vec<String>,
}

impl Default for PermissionMatcher {
    fn default() -> Self {
        Self::with_superuser_namespaces(DEFAULT_SUPERUSER_NAMESPACES.iter().copied())
    }
}

impl PermissionMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_superusers() -> Self {
        Self {
            superuser_namespaces: Vec::new(),
        }
    }

    pub fn with_superuser_namespaces<I, S>(namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            superuser_namespaces: namespaces
                .into_iter()
                .map(Into::into)
                .filter(|ns: &String| !ns.is_empty())
                .collect(),
        }
    }

    pub fn superuser_namespaces(&self) -> &[String] {
        &self.superuser_namespaces
    }

    pub fn matches<H: AsRef<str>>(&self, held: &[H], required: &str) -> bool {
        held.iter().any(|p| {
            let p = p.as_ref();
            grants(p, required) || is_superuser(self.superuser_namespaces.as_slice(), p)
        })
    }

    pub fn matches_any<H: AsRef<str>, R: AsRef<str>>(&self, held: &[H], required: &[R]) -> bool {
        required.iter().any(|r| self.matches(held, r.as_ref()))
    }
}

fn is_superuser<S: AsRef<str>>(namespaces: &[S], held: &str) -> bool {
    let mut segments = held.split(SEGMENT_DELIMITER);
    let Some(namespace) = segments.next() else {
        return false;
    };
    if !namespaces.iter().any(|ns| ns.as_ref() == namespace) {
        return false;
    }

    let mut rest = segments.peekable();
    rest.peek().is_some() && rest.all(|s| s == WILDCARD_SEGMENT)
}
