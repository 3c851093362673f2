use relay_core::types::ErrorFrame;
use rocket::{
    http::Status,
    response::{self, Responder},
    serde::json::Json,
    Request, Response,
};
use thiserror::Error;

/// Every failure the relay can surface to a consumer.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Required credentials are missing. Terminal, never retried.
    #[error("server is not configured: {0}")]
    Configuration(String),

    /// The provider rejected the refresh-token exchange (revoked or expired grant).
    #[error("provider rejected the credentials: {0}")]
    ProviderAuth(String),

    #[error("provider request failed with status {status}: {body}")]
    ProviderApi { status: u16, body: String },

    #[error("provider did not answer within {0:?}")]
    ProviderTimeout(std::time::Duration),

    #[error("provider request could not be completed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("storage error: {0}")]
    Persistence(#[from] anyhow::Error),

    #[error("{0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,
}

impl RelayError {
    pub fn status(&self) -> Status {
        match self {
            RelayError::Configuration(_) | RelayError::Persistence(_) => {
                Status::InternalServerError
            }
            RelayError::ProviderAuth(_)
            | RelayError::ProviderApi { .. }
            | RelayError::Transport(_) => Status::BadGateway,
            RelayError::ProviderTimeout(_) => Status::GatewayTimeout,
            RelayError::NotFound(_) => Status::NotFound,
            RelayError::Unauthorized => Status::Unauthorized,
        }
    }

    /// The frame a consumer receives when this error ends its session.
    pub fn frame(&self) -> ErrorFrame {
        let kind = match self {
            RelayError::Configuration(_) => ErrorFrame::SERVER_MISCONFIGURED,
            RelayError::ProviderAuth(_) => ErrorFrame::PROVIDER_AUTH_FAILED,
            RelayError::ProviderApi { .. } | RelayError::ProviderTimeout(_) => {
                ErrorFrame::PROVIDER_API_ERROR
            }
            _ => ErrorFrame::STREAMING_ERROR,
        };
        ErrorFrame::new(kind, self.to_string())
    }
}

impl<'r> Responder<'r, 'static> for RelayError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        if status.code >= 500 {
            tracing::error!("request to {} failed: {}", request.uri(), self);
        }

        Response::build_from(Json(self.frame()).respond_to(request)?)
            .status(status)
            .ok()
    }
}
