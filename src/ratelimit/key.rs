//! Bucket key validation.

use std::borrow::Borrow;
use std::fmt;

use crate::error::{LimiterError, Result};

/// A key that identifies one caller's bucket.
///
/// Keys are stored verbatim; validation only rejects keys that are empty
/// once surrounding whitespace is trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey(String);

impl BucketKey {
    /// Validate a raw key.
    pub fn parse(key: &str) -> Result<Self> {
        if !Self::is_valid(key) {
            return Err(LimiterError::InvalidArgument(
                "key must not be empty".to_string(),
            ));
        }
        Ok(Self(key.to_string()))
    }

    /// Whether `key` would be accepted by [`BucketKey::parse`].
    pub fn is_valid(key: &str) -> bool {
        !key.trim().is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for BucketKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
