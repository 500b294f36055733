use serde_json::{json, Value};

/// Failure taxonomy surfaced to the UI layer.
///
/// Every rejected mutation resolves to exactly one of these variants.
/// Local pre-checks (input shape, duplicate title/url, the public-link cap)
/// fail before any gateway call; remote rejections arrive after the
/// optimistic local state has been rolled back.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    /// Malformed input. Never reaches the gateway.
    #[error("{message}")]
    Validation { message: String, details: Value },

    /// The target link does not exist, typically deleted concurrently.
    #[error("{message}")]
    NotFound { message: String, details: Value },

    /// Duplicate title/url, a stale reorder, or the public-link cap.
    #[error("{message}")]
    Conflict { message: String, details: Value },

    /// Ownership violation. Fatal, never retried.
    #[error("{message}")]
    PermissionDenied { message: String, details: Value },

    /// Transient transport failure. Eligible for retry.
    #[error("{message}")]
    Network { message: String, details: Value },
}

/// Discriminant of [`SyncError`], used for matching and as a metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncErrorKind {
    Validation,
    NotFound,
    Conflict,
    PermissionDenied,
    Network,
}

impl SyncErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::PermissionDenied => "permission_denied",
            Self::Network => "network",
        }
    }
}

impl SyncError {
    pub fn validation(message: impl Into<String>, details: Value) -> Self {
        Self::Validation {
            message: message.into(),
            details,
        }
    }
    pub fn not_found(message: impl Into<String>, details: Value) -> Self {
        Self::NotFound {
            message: message.into(),
            details,
        }
    }
    pub fn conflict(message: impl Into<String>, details: Value) -> Self {
        Self::Conflict {
            message: message.into(),
            details,
        }
    }
    pub fn permission_denied(message: impl Into<String>, details: Value) -> Self {
        Self::PermissionDenied {
            message: message.into(),
            details,
        }
    }
    pub fn network(message: impl Into<String>, details: Value) -> Self {
        Self::Network {
            message: message.into(),
            details,
        }
    }

    pub fn kind(&self) -> SyncErrorKind {
        match self {
            Self::Validation { .. } => SyncErrorKind::Validation,
            Self::NotFound { .. } => SyncErrorKind::NotFound,
            Self::Conflict { .. } => SyncErrorKind::Conflict,
            Self::PermissionDenied { .. } => SyncErrorKind::PermissionDenied,
            Self::Network { .. } => SyncErrorKind::Network,
        }
    }

    /// Whether retrying the same mutation unchanged is reasonable.
    ///
    /// Only [`SyncError::Network`] qualifies: conflicts need different input
    /// and permission failures are fatal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    pub fn details(&self) -> &Value {
        match self {
            Self::Validation { details, .. }
            | Self::NotFound { details, .. }
            | Self::Conflict { details, .. }
            | Self::PermissionDenied { details, .. }
            | Self::Network { details, .. } => details,
        }
    }
}

impl From<validator::ValidationErrors> for SyncError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields = serde_json::Map::new();
        for (field, field_errors) in errors.field_errors() {
            let messages: Vec<String> = field_errors
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                })
                .collect();
            fields.insert(field.to_string(), json!(messages));
        }

        SyncError::validation("Invalid input", Value::Object(fields))
    }
}
