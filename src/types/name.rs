// ABOUTME: Phantom-typed, validated names for repositories and projects.
// ABOUTME: Prevents accidental swapping of repo and project identifiers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use thiserror::Error;

/// Marker types for phantom type parameters.
/// Empty enums prevent instantiation and require no trait bounds.
pub enum RepoMarker {}
pub enum ProjectMarker {}

#[derive(Debug, Error)]
pub enum NameError {
    #[error("name cannot be empty")]
    Empty,

    #[error("name exceeds maximum length of 64 characters")]
    TooLong,

    #[error("name cannot start or end with a separator")]
    EdgeSeparator,

    #[error("invalid character in name: '{0}'")]
    InvalidChar(char),
}

/// A validated identifier that prevents mixing repository and project names.
///
/// Names are used as map keys, lock keys, and compose project name
/// components, so the character set is restricted to lowercase
/// alphanumerics plus `-` and `_`.
pub struct Name<T> {
    value: String,
    _marker: PhantomData<T>,
}

impl<T> Name<T> {
    pub fn new(value: &str) -> Result<Self, NameError> {
        if value.is_empty() {
            return Err(NameError::Empty);
        }

        if value.len() > 64 {
            return Err(NameError::TooLong);
        }

        if value.starts_with(['-', '_']) || value.ends_with(['-', '_']) {
            return Err(NameError::EdgeSeparator);
        }

        for c in value.chars() {
            if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' && c != '_' {
                return Err(NameError::InvalidChar(c));
            }
        }

        Ok(Self {
            value: value.to_string(),
            _marker: PhantomData,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

// Manual trait implementations that don't require T to implement the trait.
// T is only a phantom marker.

impl<T> std::fmt::Debug for Name<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Name").field("value", &self.value).finish()
    }
}

impl<T> Clone for Name<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for Name<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Name<T> {}

impl<T> PartialOrd for Name<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Name<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

impl<T> Hash for Name<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> std::fmt::Display for Name<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T> Serialize for Name<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for Name<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Name::new(&value).map_err(serde::de::Error::custom)
    }
}

pub type RepoName = Name<RepoMarker>;
pub type ProjectName = Name<ProjectMarker>;
