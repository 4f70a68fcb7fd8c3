// ABOUTME: DNS-compatible project name validation.
// ABOUTME: Project names prefix compose projects and container names.

use super::Color;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectNameError {
    #[error("project name cannot be empty")]
    Empty,

    #[error("project name exceeds maximum length of 48 characters")]
    TooLong,

    #[error("project name cannot start with a hyphen")]
    StartsWithHyphen,

    #[error("project name cannot end with a hyphen")]
    EndsWithHyphen,

    #[error("project name must be lowercase")]
    NotLowercase,

    #[error("invalid character in project name: '{0}'")]
    InvalidChar(char),
}

/// Name of the deployed application stack.
///
/// Kept shorter than a full DNS label so that `<project>-<color>` still fits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectName(String);

impl ProjectName {
    pub fn new(value: &str) -> Result<Self, ProjectNameError> {
        if value.is_empty() {
            return Err(ProjectNameError::Empty);
        }

        if value.len() > 48 {
            return Err(ProjectNameError::TooLong);
        }

        if value.starts_with('-') {
            return Err(ProjectNameError::StartsWithHyphen);
        }

        if value.ends_with('-') {
            return Err(ProjectNameError::EndsWithHyphen);
        }

        for c in value.chars() {
            if c.is_ascii_uppercase() {
                return Err(ProjectNameError::NotLowercase);
            }
            if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
                return Err(ProjectNameError::InvalidChar(c));
            }
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compose project namespace for one color, e.g. `erp-blue`.
    pub fn scoped(&self, color: Color) -> String {
        format!("{}-{}", self.0, color)
    }
}

impl Default for ProjectName {
    fn default() -> Self {
        Self("app".to_string())
    }
}

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for ProjectName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ProjectName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ProjectName::new(&s).map_err(serde::de::Error::custom)
    }
}
