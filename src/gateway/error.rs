use thiserror::Error;

/// Uniform failure signal raised by every gateway adapter
#[derive(Debug, Error)]
#[error("gateway error: {message}")]
pub struct GatewayFault {
    pub message: String,
    pub provider_code: Option<String>,
    pub http_status: Option<u16>,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl GatewayFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            provider_code: None,
            http_status: None,
            cause: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        matches!(self.http_status, Some(s) if (400..500).contains(&s))
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        matches!(self.http_status, Some(s) if (500..600).contains(&s))
    }
}
