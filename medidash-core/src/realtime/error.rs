//! Error types for the sync bridge.

use thiserror::Error;

/// Errors returned by a table fetch.
///
/// `TableNotFound` and `PermissionDenied` are permanent: retrying cannot
/// succeed, so the bridge surfaces an empty result set instead. Everything
/// else is surfaced as an error; all of it except `Decode` is retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    /// The response arrived but its rows did not match the expected shape.
    #[error("could not decode rows: {0}")]
    Decode(String),

    #[error("backend returned {status}{}: {message}", code_suffix(.code))]
    Backend {
        status: u16,
        code: Option<String>,
        message: String,
    },
}

impl FetchError {
    /// Returns true for errors that retrying will never fix.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            FetchError::TableNotFound(_) | FetchError::PermissionDenied(_)
        )
    }

    /// Returns true if another attempt might succeed.
    pub fn is_retryable(&self) -> bool {
        !self.is_permanent() && !matches!(self, FetchError::Decode(_))
    }

    /// Classifies a failed HTTP response.
    ///
    /// `code` is the PostgREST/Postgres error code from the response body,
    /// when one was present.
    pub fn from_response(status: u16, code: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            Some("42P01") | Some("PGRST205") => return FetchError::TableNotFound(message),
            Some("42501") => return FetchError::PermissionDenied(message),
            _ => {}
        }
        match status {
            404 => FetchError::TableNotFound(message),
            401 | 403 => FetchError::PermissionDenied(message),
            408 | 504 => FetchError::Timeout,
            _ => FetchError::Backend {
                status,
                code: code.map(str::to_string),
                message,
            },
        }
    }
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref()
        .map(|c| format!(" ({c})"))
        .unwrap_or_default()
}

/// Errors reported by a channel provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),

    #[error("channel {0} is already gone")]
    Gone(u64),

    #[error("realtime connection is down")]
    Disconnected,
}

/// Errors returned by [`SyncBridge::attach`](super::SyncBridge::attach).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("table name must not be empty")]
    EmptyTable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_classes() {
        assert!(FetchError::TableNotFound("beds".into()).is_permanent());
        assert!(FetchError::PermissionDenied("beds".into()).is_permanent());
        assert!(!FetchError::Network("reset".into()).is_permanent());
        assert!(!FetchError::Timeout.is_permanent());
    }

    #[test]
    fn test_decode_errors_are_not_retried() {
        let err = FetchError::Decode("missing field `status`".into());
        assert!(!err.is_permanent());
        assert!(!err.is_retryable());
        assert!(FetchError::Timeout.is_retryable());
        assert!(!FetchError::TableNotFound("beds".into()).is_retryable());
    }

    #[test]
    fn test_from_response_uses_code_first() {
        let err = FetchError::from_response(400, Some("42P01"), "relation does not exist");
        assert_eq!(
            err,
            FetchError::TableNotFound("relation does not exist".into())
        );

        let err = FetchError::from_response(400, Some("42501"), "denied");
        assert!(matches!(err, FetchError::PermissionDenied(_)));
    }

    #[test]
    fn test_from_response_falls_back_to_status() {
        assert!(matches!(
            FetchError::from_response(404, None, "missing"),
            FetchError::TableNotFound(_)
        ));
        assert!(matches!(
            FetchError::from_response(401, None, "jwt expired"),
            FetchError::PermissionDenied(_)
        ));
        assert_eq!(FetchError::from_response(504, None, "gateway"), FetchError::Timeout);

        let err = FetchError::from_response(500, Some("XX000"), "boom");
        assert!(!err.is_permanent());
        assert_eq!(err.to_string(), "backend returned 500 (XX000): boom");
    }
}
