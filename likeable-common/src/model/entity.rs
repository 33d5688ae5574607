//! Polymorphic references to likeable and liker entities.
//!
//! A like record does not know the concrete types it connects. It stores an
//! [`EntityRef`], a type tag plus an id, and a
//! [`Resolver`](crate::resolver::Resolver) maps that back to a domain object.

use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::{
    borrow::Cow,
    fmt::{Display, Formatter},
    num::ParseIntError,
    str::FromStr,
};
use thiserror::Error;

pub const TYPE_TAG_MAX_LEN: usize = 64;

const fn is_valid_type_tag(tag: &str) -> bool {
    let bytes = tag.as_bytes();
    if bytes.is_empty() || bytes.len() > TYPE_TAG_MAX_LEN {
        return false;
    }

    let mut i = 0;
    while i < bytes.len() {
        let byte = bytes[i];
        if !(byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-' | b'.' | b':')) {
            return false;
        }
        i += 1;
    }
    true
}

/// Names the kind of an entity, e.g. `book` or `user`.
///
/// Non-empty, at most [`TYPE_TAG_MAX_LEN`] characters, made of ASCII
/// alphanumerics and `_`, `-`, `.`, `:`. In particular it never contains the
/// `#` separating tag and id in the textual form of an [`EntityRef`].
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct TypeTag(Cow<'static, str>);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The type tag is invalid: {0:?}")]
pub struct InvalidTypeTagError(String);

impl TypeTag {
    /// Builds a tag from a literal. Invalid literals fail const evaluation.
    #[must_use]
    pub const fn from_static(tag: &'static str) -> Self {
        assert!(is_valid_type_tag(tag), "invalid type tag");
        Self(Cow::Borrowed(tag))
    }

    pub fn new(tag: impl Into<String>) -> Result<Self, InvalidTypeTagError> {
        let tag = tag.into();
        if is_valid_type_tag(&tag) {
            Ok(Self(Cow::Owned(tag)))
        } else {
            Err(InvalidTypeTagError(tag))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl Display for TypeTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TypeTag {
    type Err = InvalidTypeTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for TypeTag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        TypeTag::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"TypeTag"))
    }
}

/// Points at an entity of any registered type.
///
/// Written as `<type_tag>#<id>`, for example `book#1`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub type_tag: TypeTag,
    pub id: u64,
}

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum EntityRefParseError {
    #[error("Missing '#' between type tag and id")]
    MissingSeparator,
    #[error(transparent)]
    TypeTag(#[from] InvalidTypeTagError),
    #[error("Invalid id: {0}")]
    Id(#[from] ParseIntError),
}

impl EntityRef {
    #[must_use]
    pub fn new(type_tag: TypeTag, id: impl Into<u64>) -> Self {
        Self {
            type_tag,
            id: id.into(),
        }
    }
}

impl Display for EntityRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.type_tag, self.id)
    }
}

impl FromStr for EntityRef {
    type Err = EntityRefParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (type_tag, id) = s
            .split_once('#')
            .ok_or(EntityRefParseError::MissingSeparator)?;

        Ok(Self {
            type_tag: type_tag.parse()?,
            id: id.parse()?,
        })
    }
}
