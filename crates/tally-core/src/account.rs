use std::fmt;

use crate::error::ValidationError;

/// Identifier of the account whose data is being edited and synced.
///
/// The raw value is kept for display and export. The storage-safe form
/// used for partition keys and cache rows comes from [`AccountKey::normalized`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountKey(String);

impl AccountKey {
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyField`] when `raw` is blank.
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyField { field: "account" });
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase, trimmed, every character outside `[a-z0-9]` replaced by
    /// `_`. Stable across devices for the same logical account.
    #[must_use]
    pub fn normalized(&self) -> String {
        self.0
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '_' })
            .collect()
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
