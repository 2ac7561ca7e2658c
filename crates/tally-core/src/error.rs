use std::fmt;
use std::time::Duration;

use crate::sync::status::SyncErrorKind;

/// Machine-readable error codes for scripts and front ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    NotLoggedIn,
    SignedOut,
    CustomerNotFound,
    ItemNotFound,
    TransactionNotFound,
    InvalidInput,
    InvalidBackup,
    CacheUnavailable,
    RemoteUnreachable,
    RemoteRejected,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::NotLoggedIn => "E1002",
            Self::SignedOut => "E1003",
            Self::CustomerNotFound => "E2001",
            Self::ItemNotFound => "E2002",
            Self::TransactionNotFound => "E2003",
            Self::InvalidInput => "E2004",
            Self::InvalidBackup => "E2005",
            Self::CacheUnavailable => "E5001",
            Self::RemoteUnreachable => "E6001",
            Self::RemoteRejected => "E6002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::NotLoggedIn => "No active account",
            Self::SignedOut => "Signed out from another device",
            Self::CustomerNotFound => "Customer not found",
            Self::ItemNotFound => "Item not found",
            Self::TransactionNotFound => "Transaction not found",
            Self::InvalidInput => "Invalid input",
            Self::InvalidBackup => "Invalid backup file",
            Self::CacheUnavailable => "Local cache unavailable",
            Self::RemoteUnreachable => "Cloud store unreachable",
            Self::RemoteRejected => "Cloud store rejected the request",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to users.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in config.toml and retry."),
            Self::NotLoggedIn => Some("Run `tally login <account>` first."),
            Self::SignedOut => Some("Run `tally login <account>` to sign this device in again."),
            Self::CustomerNotFound | Self::ItemNotFound | Self::TransactionNotFound => None,
            Self::InvalidInput => Some("Check the values passed and retry."),
            Self::InvalidBackup => {
                Some("Use a file produced by `tally export` (it must contain a customers array).")
            }
            Self::CacheUnavailable => Some("Check disk space and write permissions."),
            Self::RemoteUnreachable => {
                Some("Changes are kept locally and will sync on the next cycle.")
            }
            Self::RemoteRejected => Some(
                "Check cloud.url and cloud.key, then run `tally sync` to resume background sync.",
            ),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// Synchronous rejection at the mutation or import boundary.
///
/// A mutation that returns one of these has not touched the ledger.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("{field} must be a finite number >= 0, got {value}")]
    InvalidAmount { field: &'static str, value: f64 },

    #[error("quantity for line item '{item}' must be at least 1")]
    InvalidQuantity { item: String },

    #[error("amount {given} does not match line item total {expected}")]
    AmountMismatch { given: f64, expected: f64 },

    #[error("amount is required when a transaction has no line items")]
    MissingAmount,

    #[error("invalid date '{0}': expected ISO-8601")]
    InvalidDate(String),

    #[error("customer not found: {0}")]
    CustomerNotFound(String),

    #[error("item not found: {0}")]
    ItemNotFound(String),

    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("invalid backup file: {0}")]
    InvalidBackup(String),
}

impl ValidationError {
    /// Machine-readable code associated with this rejection.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::CustomerNotFound(_) => ErrorCode::CustomerNotFound,
            Self::ItemNotFound(_) => ErrorCode::ItemNotFound,
            Self::TransactionNotFound(_) => ErrorCode::TransactionNotFound,
            Self::InvalidBackup(_) => ErrorCode::InvalidBackup,
            Self::EmptyField { .. }
            | Self::InvalidAmount { .. }
            | Self::InvalidQuantity { .. }
            | Self::AmountMismatch { .. }
            | Self::MissingAmount
            | Self::InvalidDate(_) => ErrorCode::InvalidInput,
        }
    }
}

// ---------------------------------------------------------------------------
// RemoteError
// ---------------------------------------------------------------------------

/// Failure talking to the remote store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// Transport-level failure or a transient server error.
    #[error("network error: {0}")]
    Network(String),

    /// The request did not complete within the per-request bound.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Credentials rejected or backend misconfigured.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The backend answered with a body that is not a snapshot.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl RemoteError {
    /// Sync-status classification: transient failures retry on the next
    /// tick, everything else suspends background sync.
    #[must_use]
    pub const fn kind(&self) -> SyncErrorKind {
        match self {
            Self::Network(_) | Self::Timeout(_) => SyncErrorKind::Network,
            Self::Auth(_) | Self::Malformed(_) => SyncErrorKind::Auth,
        }
    }

    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self.kind() {
            SyncErrorKind::Network => ErrorCode::RemoteUnreachable,
            SyncErrorKind::Auth => ErrorCode::RemoteRejected,
        }
    }
}

// ---------------------------------------------------------------------------
// CacheError
// ---------------------------------------------------------------------------

/// Failure reading or writing the local cache database.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("cache encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::CacheUnavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::ConfigParseError,
            ErrorCode::NotLoggedIn,
            ErrorCode::SignedOut,
            ErrorCode::CustomerNotFound,
            ErrorCode::ItemNotFound,
            ErrorCode::TransactionNotFound,
            ErrorCode::InvalidInput,
            ErrorCode::InvalidBackup,
            ErrorCode::CacheUnavailable,
            ErrorCode::RemoteUnreachable,
            ErrorCode::RemoteRejected,
            ErrorCode::InternalUnexpected,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::InvalidBackup.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn remote_errors_classify_by_kind() {
        assert_eq!(
            RemoteError::Network("reset".into()).kind(),
            SyncErrorKind::Network
        );
        assert_eq!(
            RemoteError::Timeout(Duration::from_secs(10)).kind(),
            SyncErrorKind::Network
        );
        assert_eq!(RemoteError::Auth("401".into()).kind(), SyncErrorKind::Auth);
        assert_eq!(
            RemoteError::Malformed("not json".into()).kind(),
            SyncErrorKind::Auth
        );
    }

    #[test]
    fn validation_errors_map_to_codes() {
        assert_eq!(
            ValidationError::CustomerNotFound("c1".into()).code(),
            ErrorCode::CustomerNotFound
        );
        assert_eq!(ValidationError::MissingAmount.code(), ErrorCode::InvalidInput);
        assert_eq!(
            ValidationError::InvalidBackup("x".into()).code(),
            ErrorCode::InvalidBackup
        );
    }
}
