use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

pub const LATEST: &str = "latest";
const MAX_PART_LEN: usize = 63;

/// `name:version` reference to a stored model. A missing version means the
/// most recently saved one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tag {
    name: String,
    version: Option<String>,
}

impl Tag {
    pub fn new(name: &str, version: Option<&str>) -> Result<Self, ServiceError> {
        validate_part("name", name)?;
        let version = match version {
            None | Some(LATEST) => None,
            Some(v) => {
                validate_part("version", v)?;
                Some(v.to_string())
            }
        };
        Ok(Self {
            name: name.to_string(),
            version,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn is_latest(&self) -> bool {
        self.version.is_none()
    }
}

fn validate_part(what: &str, part: &str) -> Result<(), ServiceError> {
    if part.is_empty() || part.len() > MAX_PART_LEN {
        return Err(ServiceError::InvalidTag(format!(
            "{what} must be 1 to {MAX_PART_LEN} characters, got '{part}'"
        )));
    }
    let mut chars = part.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    let rest_ok = chars.all(|c| {
        c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-' | '.')
    });
    if !first_ok || !rest_ok {
        return Err(ServiceError::InvalidTag(format!(
            "{what} '{part}' must be lowercase alphanumerics, '_', '-' or '.', starting with an alphanumeric"
        )));
    }
    Ok(())
}

impl FromStr for Tag {
    type Err = ServiceError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.split_once(':') {
            Some((name, version)) => Tag::new(name, Some(version)),
            None => Tag::new(raw, None),
        }
    }
}

impl TryFrom<String> for Tag {
    type Error = ServiceError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.to_string()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.name,
            self.version.as_deref().unwrap_or(LATEST)
        )
    }
}
