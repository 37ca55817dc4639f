//! Validated display identities and room codes.
//!
//! Both are trimmed, non-empty, and at most [`MAX_NAME_LEN`] characters.
//! Room codes are additionally upper-cased so `abcd` and `ABCD` name the same
//! room.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Maximum length of identities and room codes, in characters.
pub const MAX_NAME_LEN: usize = 20;

fn validate(field: &'static str, raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }

    let len = trimmed.chars().count();
    if len > MAX_NAME_LEN {
        return Err(ValidationError::TooLong { field, max: MAX_NAME_LEN, len });
    }

    Ok(trimmed.to_string())
}

/// Display name chosen by the local user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Validate and wrap a display name.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        validate("username", raw).map(Self)
    }

    /// Name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `name` refers to this identity.
    pub fn is(&self, name: &str) -> bool {
        self.0 == name
    }
}

impl TryFrom<String> for Identity {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        id.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Case-normalized room code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Validate, trim, and upper-case a room code.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        validate("room code", raw).map(|code| Self(code.to_uppercase()))
    }

    /// Code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_trimmed() {
        assert_eq!(Identity::parse("  alice ").unwrap().as_str(), "alice");
    }

    #[test]
    fn blank_identity_is_rejected() {
        assert_eq!(Identity::parse("   "), Err(ValidationError::Empty { field: "username" }));
    }

    #[test]
    fn long_names_are_rejected_by_chars_not_bytes() {
        assert!(Identity::parse(&"é".repeat(20)).is_ok());
        assert!(matches!(
            Identity::parse(&"a".repeat(21)),
            Err(ValidationError::TooLong { len: 21, .. })
        ));
    }

    #[test]
    fn room_codes_are_upper_cased() {
        assert_eq!(RoomCode::parse(" abcd ").unwrap().as_str(), "ABCD");
    }
}
