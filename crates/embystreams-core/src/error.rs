use thiserror::Error;

/// Rejections produced while validating the media-server settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid host")]
    InvalidHost,

    #[error("invalid port")]
    InvalidPort,

    #[error("invalid API key format")]
    InvalidApiKey,
}

/// CSRF verification failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("CSRF token mismatch")]
    CsrfMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("too many requests")]
    TooManyRequests,
}

/// Coarse classification of upstream failures. Never carries upstream text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    #[error("connection to media server failed")]
    ConnectFailed,

    #[error("media server returned HTTP {0}")]
    HttpStatus(u16),

    #[error("media server returned an invalid body")]
    InvalidBody,
}

/// Errors from the plugin settings store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("settings io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings parse error at line {0}")]
    Parse(usize),
}

/// Everything the gateway can fail with for a single request.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("plugin not configured")]
    Unconfigured,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("unknown action")]
    UnknownAction,
}

impl GatewayError {
    /// Collapse the error into the user-facing category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            GatewayError::Unconfigured => ErrorCategory::NotConfigured,
            GatewayError::Config(ConfigError::MissingField(_)) => ErrorCategory::NotConfigured,
            GatewayError::Config(_) => ErrorCategory::InvalidConfiguration,
            GatewayError::Auth(_) => ErrorCategory::AuthenticationFailed,
            GatewayError::RateLimit(_) => ErrorCategory::RateLimited,
            GatewayError::Upstream(UpstreamError::HttpStatus(401 | 403)) => {
                ErrorCategory::UpstreamAuthFailed
            }
            GatewayError::Upstream(UpstreamError::InvalidBody) => ErrorCategory::InvalidResponse,
            GatewayError::Upstream(_) => ErrorCategory::ConnectionFailed,
            GatewayError::Store(_) => ErrorCategory::StorageFailed,
            GatewayError::UnknownAction => ErrorCategory::UnknownAction,
        }
    }
}

/// The closed set of failure categories a caller may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    NotConfigured,
    InvalidConfiguration,
    AuthenticationFailed,
    UpstreamAuthFailed,
    RateLimited,
    ConnectionFailed,
    InvalidResponse,
    StorageFailed,
    UnknownAction,
    /// The HTTP request itself could not be decoded.
    InvalidRequest,
}

impl ErrorCategory {
    /// Localization-key-style message rendered to the user.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorCategory::NotConfigured => "_(Please configure settings)_",
            ErrorCategory::InvalidConfiguration => "_(Invalid Configuration)_",
            ErrorCategory::AuthenticationFailed => "_(Authentication Failed)_",
            ErrorCategory::UpstreamAuthFailed => "_(Authentication Failed - Check API Key)_",
            ErrorCategory::RateLimited => "_(Too Many Requests)_",
            ErrorCategory::ConnectionFailed => "_(Connection Failed)_",
            ErrorCategory::InvalidResponse => "_(Invalid Response)_",
            ErrorCategory::StorageFailed => "_(Failed to save configuration)_",
            ErrorCategory::UnknownAction => "Unknown action",
            ErrorCategory::InvalidRequest => "_(Invalid Request)_",
        }
    }

    /// Stable machine-readable slug.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::NotConfigured => "not_configured",
            ErrorCategory::InvalidConfiguration => "invalid_configuration",
            ErrorCategory::AuthenticationFailed => "authentication_failed",
            ErrorCategory::UpstreamAuthFailed => "upstream_authentication_failed",
            ErrorCategory::RateLimited => "rate_limited",
            ErrorCategory::ConnectionFailed => "connection_failed",
            ErrorCategory::InvalidResponse => "invalid_response",
            ErrorCategory::StorageFailed => "storage_failed",
            ErrorCategory::UnknownAction => "unknown_action",
            ErrorCategory::InvalidRequest => "invalid_request",
        }
    }

    /// HTTP status the front end answers with.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCategory::NotConfigured => 200,
            ErrorCategory::InvalidConfiguration => 400,
            ErrorCategory::AuthenticationFailed => 403,
            ErrorCategory::UpstreamAuthFailed => 502,
            ErrorCategory::RateLimited => 429,
            ErrorCategory::ConnectionFailed => 502,
            ErrorCategory::InvalidResponse => 502,
            ErrorCategory::StorageFailed => 500,
            ErrorCategory::UnknownAction => 400,
            ErrorCategory::InvalidRequest => 400,
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_auth_statuses_get_their_own_category() {
        let e = GatewayError::from(UpstreamError::HttpStatus(401));
        assert_eq!(e.category(), ErrorCategory::UpstreamAuthFailed);
        let e = GatewayError::from(UpstreamError::HttpStatus(403));
        assert_eq!(e.category(), ErrorCategory::UpstreamAuthFailed);
        let e = GatewayError::from(UpstreamError::HttpStatus(500));
        assert_eq!(e.category(), ErrorCategory::ConnectionFailed);
    }

    #[test]
    fn missing_field_reads_as_unconfigured() {
        let e = GatewayError::from(ConfigError::MissingField("HOST"));
        assert_eq!(e.category(), ErrorCategory::NotConfigured);
        let e = GatewayError::from(ConfigError::InvalidHost);
        assert_eq!(e.category(), ErrorCategory::InvalidConfiguration);
    }

    #[test]
    fn user_messages_never_mention_status_codes() {
        let e = GatewayError::from(UpstreamError::HttpStatus(503));
        assert!(!e.category().user_message().contains("503"));
    }
}
