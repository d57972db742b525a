//! Errors from the third-party HTTP APIs the relay calls (WhatsApp, Google)

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("{service} is not configured: missing {missing}")]
    NotConfigured {
        service: &'static str,
        missing: String,
    },
    #[error("{service} API error: {status} - {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("{service} request failed: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },
    #[error("{service} returned an unexpected response: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },
}

impl UpstreamError {
    pub fn transport(service: &'static str, err: &reqwest::Error) -> Self {
        Self::Transport {
            service,
            message: err.to_string(),
        }
    }

    pub fn decode(service: &'static str, message: impl Into<String>) -> Self {
        Self::Decode {
            service,
            message: message.into(),
        }
    }

    pub fn is_not_configured(&self) -> bool {
        matches!(self, Self::NotConfigured { .. })
    }
}

pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Read a response body, turning non-2xx statuses into `UpstreamError::Status`.
pub async fn read_success_body(
    service: &'static str,
    response: reqwest::Response,
) -> UpstreamResult<String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| UpstreamError::transport(service, &e))?;

    if status.is_success() {
        Ok(body)
    } else {
        Err(UpstreamError::Status {
            service,
            status: status.as_u16(),
            body,
        })
    }
}
