use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ChallengeboxError;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The tag assumed when a reference does not carry one.
pub const DEFAULT_TAG: &str = "latest";

/// The literal the engine reports as the repository and tag of untagged images.
pub const UNTAGGED_SENTINEL: &str = "<none>";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A `repository[:tag]` image reference as understood by the container engine.
///
/// The tag separator is the last `:` after the last `/`, so registry ports survive:
/// `registry.local:5000/web` has no tag, `registry.local:5000/web:v2` has tag `v2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    repository: String,
    tag: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ImageRef {
    /// Creates a reference from its parts.
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    /// The bare repository name, which is also the slot key for an owner.
    pub fn get_repository(&self) -> &str {
        &self.repository
    }

    /// The tag.
    pub fn get_tag(&self) -> &str {
        &self.tag
    }

    /// Returns the bare repository portion of any reference string.
    pub fn repository_of(reference: &str) -> &str {
        let name_start = reference.rfind('/').map_or(0, |i| i + 1);
        match reference[name_start..].rfind(':') {
            Some(i) => &reference[..name_start + i],
            None => reference,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl FromStr for ImageRef {
    type Err = ChallengeboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let repository = Self::repository_of(s);
        let tag = s[repository.len()..].strip_prefix(':').unwrap_or(DEFAULT_TAG);

        if repository.is_empty()
            || tag.is_empty()
            || repository == UNTAGGED_SENTINEL
            || tag == UNTAGGED_SENTINEL
            || s.chars().any(char::is_whitespace)
        {
            return Err(ChallengeboxError::InvalidImageReference(s.to_string()));
        }

        Ok(Self::new(repository, tag))
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

impl Serialize for ImageRef {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ImageRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
