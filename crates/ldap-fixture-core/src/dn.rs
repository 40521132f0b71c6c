//! Distinguished name parsing for fixture suffixes and entries.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::Error as CoreError;

/// Errors that can occur when parsing distinguished names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistinguishedNameError {
    /// The distinguished name was empty.
    #[error("distinguished name cannot be empty")]
    Empty,
    /// A component in the distinguished name was invalid.
    #[error("invalid distinguished name component: {0}")]
    InvalidComponent(String),
    /// A component was missing the attribute name to the left of the `=`.
    #[error("distinguished name component missing attribute: {0}")]
    MissingAttribute(String),
    /// A component was missing the value to the right of the `=`.
    #[error("distinguished name component missing value for attribute {0}")]
    MissingValue(String),
    /// The distinguished name ended with an escape character.
    #[error("distinguished name contains an unterminated escape sequence")]
    UnterminatedEscape,
}

impl From<DistinguishedNameError> for CoreError {
    fn from(err: DistinguishedNameError) -> Self {
        CoreError::ConfigError(err.to_string())
    }
}

/// A validated distinguished name.
///
/// The original spelling is kept verbatim: the directory server compares DNs
/// textually when the fixture normalizes lookups against its suffix, so the
/// fixture never rewrites what the caller provided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistinguishedName {
    raw: String,
    leaf: String,
}

impl DistinguishedName {
    /// Parses a distinguished name.
    ///
    /// Multi-valued RDNs (`cn=a+uid=b`) are accepted; the first attribute of
    /// the leading component provides [`DistinguishedName::leaf_value`].
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError`] if the input is empty or contains invalid syntax.
    pub fn parse(input: impl AsRef<str>) -> std::result::Result<Self, DistinguishedNameError> {
        let raw = input.as_ref().trim();
        if raw.is_empty() {
            return Err(DistinguishedNameError::Empty);
        }

        let mut values = Vec::new();
        for component in split_escaped(raw, ',')? {
            let first = split_escaped(&component, '+')?
                .into_iter()
                .next()
                .ok_or_else(|| DistinguishedNameError::InvalidComponent(component.clone()))?;
            values.push(split_attribute_value(&first)?);
        }

        Ok(Self {
            raw: raw.to_string(),
            leaf: values.into_iter().next().unwrap_or_default(),
        })
    }

    /// Borrows the distinguished name as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Unescaped value of the leading RDN (`example` for `dc=example,dc=org`).
    #[must_use]
    pub fn leaf_value(&self) -> &str {
        &self.leaf
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for DistinguishedName {
    type Err = DistinguishedNameError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<DistinguishedName> for String {
    fn from(value: DistinguishedName) -> Self {
        value.raw
    }
}

fn split_escaped(
    input: &str,
    delimiter: char,
) -> std::result::Result<Vec<String>, DistinguishedNameError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escape = false;

    for ch in input.chars() {
        if escape {
            current.push('\\');
            current.push(ch);
            escape = false;
            continue;
        }

        if ch == '\\' {
            escape = true;
            continue;
        }

        if ch == delimiter {
            parts.push(current.trim().to_string());
            current.clear();
            continue;
        }

        current.push(ch);
    }

    if escape {
        return Err(DistinguishedNameError::UnterminatedEscape);
    }

    parts.push(current.trim().to_string());
    if parts.iter().any(String::is_empty) {
        return Err(DistinguishedNameError::InvalidComponent(input.to_string()));
    }
    Ok(parts)
}

/// Validates one `attribute=value` pair and returns the unescaped value.
fn split_attribute_value(component: &str) -> std::result::Result<String, DistinguishedNameError> {
    let (attribute, value) = component
        .split_once('=')
        .ok_or_else(|| DistinguishedNameError::InvalidComponent(component.to_string()))?;
    let attribute = attribute.trim();
    let value = value.trim_start();

    if attribute.is_empty() {
        return Err(DistinguishedNameError::MissingAttribute(
            component.to_string(),
        ));
    }

    if value.is_empty() {
        return Err(DistinguishedNameError::MissingValue(attribute.to_string()));
    }

    unescape(value)
}

fn unescape(value: &str) -> std::result::Result<String, DistinguishedNameError> {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            let next = chars
                .next()
                .ok_or(DistinguishedNameError::UnterminatedEscape)?;
            result.push(next);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}
