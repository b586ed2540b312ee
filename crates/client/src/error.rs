use vrfleet_core::backoff::is_rate_limit_message;

/// Errors from the entity backend client layer.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend answered 429 Too Many Requests.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The addressed row or collection does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: String },

    /// Any other non-2xx response.
    #[error("Backend API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Compacted response body preview.
        body: String,
    },

    /// A response body did not match the expected shape.
    #[error("Failed to decode backend response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid client configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether this error means the backend is throttling us.
    ///
    /// Besides the typed variant, API bodies that read like a 429 are
    /// treated the same so throttling surfaced by intermediaries is also
    /// retried. Transport errors count only when they carry a 429 status;
    /// their text includes the request URL.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::RateLimited(_) => true,
            Self::Api { status, body } => *status == 429 || is_rate_limit_message(body),
            Self::Request(e) => e.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
