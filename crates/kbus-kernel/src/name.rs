//! Bus name grammar and wildcard matching.
//!
//! A bus name is `$` followed by one or more `.`-separated components, each a
//! non-empty run of ASCII alphanumerics:
//!
//! ```text
//! $.Fred
//! $.Fred.Jim.Bob
//! ```
//!
//! Binding patterns may additionally end in a wildcard component:
//!
//! | Token | Matches |
//! |-------|---------|
//! | `*` | one or more further components (`$.Fred.*` matches `$.Fred.Jim.Bob`) |
//! | `%` | exactly one further component (`$.Fred.%` matches `$.Fred.Jim` only) |
//!
//! Message names never contain wildcards.
//!
//! # Example
//!
//! ```rust
//! # use kbus_kernel::name::{matches, Pattern};
//! assert!(matches("$.*", "$.A.B"));
//! assert!(!matches("$.%", "$.A.B"));
//!
//! let exact = Pattern::parse("$.Fred.Jim").unwrap();
//! let wild = Pattern::parse("$.Fred.*").unwrap();
//! assert!(exact.specificity() > wild.specificity());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{KbusError, Result};

const ROOT: &str = "$.";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Wildcard token allowed as the final component of a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Wildcard {
    /// `*`: the rest of the hierarchy, at least one more level.
    Any,
    /// `%`: exactly one more level.
    One,
}

impl Wildcard {
    fn from_component(component: &str) -> Option<Self> {
        match component {
            "*" => Some(Self::Any),
            "%" => Some(Self::One),
            _ => None,
        }
    }
}

/// Shape of a pattern, ordered from least to most specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PatternKind {
    /// Ends in `*`.
    Any,
    /// Ends in `%`.
    One,
    /// No wildcard.
    Exact,
}

/// Rank of a pattern among the patterns matching one name.
///
/// Compares by the number of leading literal components first, then by
/// [`PatternKind`].  Greater is more specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Specificity {
    pub literals: usize,
    pub kind: PatternKind,
}

/// A validated binding pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    text: String,
    literals: Vec<String>,
    wildcard: Option<Wildcard>,
}

impl Pattern {
    /// Parse a pattern with no length bound.
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_bounded(text, usize::MAX)
    }

    /// Parse a pattern, rejecting it with [`KbusError::NameTooLong`] if it is
    /// longer than `max_len` bytes.
    pub fn parse_bounded(text: &str, max_len: usize) -> Result<Self> {
        let components = split_components(text, max_len, true)?;
        let (wildcard, literal_count) = match components.last().copied() {
            Some(last) => match Wildcard::from_component(last) {
                Some(w) => (Some(w), components.len() - 1),
                None => (None, components.len()),
            },
            None => (None, 0),
        };

        Ok(Self {
            text: text.to_string(),
            literals: components[..literal_count]
                .iter()
                .map(|c| (*c).to_string())
                .collect(),
            wildcard,
        })
    }

    /// The pattern exactly as it was bound.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The trailing wildcard, if any.
    pub fn wildcard(&self) -> Option<Wildcard> {
        self.wildcard
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard.is_some()
    }

    /// Whether this pattern matches the (already validated) message `name`.
    pub fn matches(&self, name: &str) -> bool {
        let Some(rest) = name.strip_prefix(ROOT) else {
            return false;
        };
        let mut parts = rest.split('.');
        for literal in &self.literals {
            if parts.next() != Some(literal.as_str()) {
                return false;
            }
        }
        let remaining = parts.count();
        match self.wildcard {
            None => remaining == 0,
            Some(Wildcard::One) => remaining == 1,
            Some(Wildcard::Any) => remaining >= 1,
        }
    }

    pub fn specificity(&self) -> Specificity {
        let kind = match self.wildcard {
            None => PatternKind::Exact,
            Some(Wildcard::One) => PatternKind::One,
            Some(Wildcard::Any) => PatternKind::Any,
        };
        Specificity {
            literals: self.literals.len(),
            kind,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Validate a message name: grammar, length, and no wildcard anywhere.
pub fn validate_name(name: &str, max_len: usize) -> Result<()> {
    split_components(name, max_len, false).map(|_| ())
}

/// Whether `pattern` matches `name`.
///
/// Returns `false` if `pattern` is not a valid pattern.  `name` is expected to
/// be a valid message name.
pub fn matches(pattern: &str, name: &str) -> bool {
    Pattern::parse(pattern).is_ok_and(|p| p.matches(name))
}

// -- Private helpers --------------------------------------------------------

fn split_components(text: &str, max_len: usize, allow_wildcard: bool) -> Result<Vec<&str>> {
    if text.len() > max_len {
        return Err(KbusError::NameTooLong {
            len: text.len(),
            max: max_len,
        });
    }
    if text.is_empty() {
        return Err(bad_format(text, "name is empty"));
    }
    let rest = text
        .strip_prefix(ROOT)
        .ok_or_else(|| bad_format(text, "name must start with `$.`"))?;

    let components: Vec<&str> = rest.split('.').collect();
    let last = components.len() - 1;
    for (index, component) in components.iter().enumerate() {
        if component.is_empty() {
            return Err(bad_format(text, "empty component"));
        }
        if Wildcard::from_component(component).is_some() {
            if !allow_wildcard {
                return Err(bad_format(text, "message names may not contain wildcards"));
            }
            if index != last {
                return Err(bad_format(text, "wildcard must be the final component"));
            }
            continue;
        }
        if !component.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(bad_format(text, "components must be alphanumeric"));
        }
    }
    Ok(components)
}

fn bad_format(text: &str, reason: &'static str) -> KbusError {
    KbusError::BadFormat {
        name: text.to_string(),
        reason,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
