use relay_core::types::{ErrorFrame, NowPlaying};
use reqwest::Client;
use thiserror::Error;

pub struct RelayClient {
    address: String,
    client: Client,
}

impl RelayClient {
    pub fn new(address: &str) -> RelayClient {
        RelayClient {
            address: address.to_owned(),
            client: Client::new(),
        }
    }

    /// Blocks on the relay's long-poll until the track changes or the
    /// server's wait budget runs out.
    pub async fn poll(&self) -> Result<NowPlaying, RelayServiceError> {
        let res = self
            .client
            .get(format!("http://{}/api/now-playing/poll", self.address))
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let frame: ErrorFrame = res.json().await?;
            return Err(RelayServiceError::Relay { status, frame });
        }

        Ok(res.json().await?)
    }
}

#[derive(Error, Debug)]
pub enum RelayServiceError {
    #[error("error using now-playing relay: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("relay answered {status}: {} ({})", .frame.message, .frame.error)]
    Relay { status: u16, frame: ErrorFrame },
}

impl RelayServiceError {
    /// Configuration problems on the server side will not fix themselves.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RelayServiceError::Relay { frame, .. } if frame.error == ErrorFrame::SERVER_MISCONFIGURED)
    }
}
