//! Internal implementation of the identifier types.

use crate::{IdError, IdResult};
use std::{fmt, str::FromStr};

/// Re-exported for convenience.
pub use ::uuid::Uuid;

/// Number of digits in a teacher reference number.
const TRN_DIGITS: usize = 7;

/// Canonical record identifier (32 lowercase hex characters, no hyphens).
///
/// Once constructed the contained UUID is guaranteed canonical, so its string form can be
/// used directly as a storage key.
///
/// # Construction
/// - [`RecordUuid::new`] generates a fresh identifier for a new row.
/// - [`RecordUuid::parse`] validates an externally supplied identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordUuid(Uuid);

impl Default for RecordUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordUuid {
    /// Generates a new random (v4) identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Validates and parses a string that must already be in canonical form.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::InvalidInput`] if `input` is not 32 lowercase hex characters.
    pub fn parse(input: &str) -> IdResult<Self> {
        if !Self::is_canonical(input) {
            return Err(IdError::InvalidInput(format!(
                "record id must be 32 lowercase hex characters without hyphens, got: '{}'",
                input
            )));
        }
        Uuid::parse_str(input)
            .map(Self)
            .map_err(|e| IdError::InvalidInput(e.to_string()))
    }

    /// Returns the underlying `uuid::Uuid`.
    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// Returns true if `input` is in canonical form.
    ///
    /// Purely syntactic: exactly 32 bytes of `0-9` / `a-f`.
    pub fn is_canonical(input: &str) -> bool {
        input.len() == 32
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }
}

impl fmt::Display for RecordUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for RecordUuid {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordUuid::parse(s)
    }
}

/// Teacher reference number: the identifier issued once per real-world person.
///
/// Always exactly seven ASCII digits. The issuing service owns uniqueness; this type only
/// owns shape.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Trn(String);

impl Trn {
    /// Validates a teacher reference number.
    ///
    /// Surrounding whitespace is ignored; anything else that is not seven digits is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::InvalidInput`] for empty or malformed values.
    pub fn parse(input: &str) -> IdResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(IdError::InvalidInput("TRN cannot be empty".into()));
        }
        if trimmed.len() != TRN_DIGITS || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(IdError::InvalidInput(format!(
                "TRN must be {TRN_DIGITS} digits, got: '{trimmed}'"
            )));
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Builds a TRN from a sequence value.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::InvalidInput`] if the value does not fit in seven digits.
    pub fn from_sequence(value: u64) -> IdResult<Self> {
        if !(1_000_000..=9_999_999).contains(&value) {
            return Err(IdError::InvalidInput(format!(
                "sequence value {value} is outside the TRN range"
            )));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Trn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Trn {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Trn::parse(s)
    }
}

#[cfg(feature = "serde")]
mod serde_impls {
    use super::{RecordUuid, Trn};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    impl Serialize for RecordUuid {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.collect_str(self)
        }
    }

    impl<'de> Deserialize<'de> for RecordUuid {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let s = String::deserialize(deserializer)?;
            RecordUuid::parse(&s).map_err(serde::de::Error::custom)
        }
    }

    impl Serialize for Trn {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(self.as_str())
        }
    }

    impl<'de> Deserialize<'de> for Trn {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let s = String::deserialize(deserializer)?;
            Trn::parse(&s).map_err(serde::de::Error::custom)
        }
    }
}
