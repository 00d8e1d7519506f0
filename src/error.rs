use thiserror::Error;

use crate::refresh::LoopState;

/// Everything that can go wrong talking to the shuttle backend or applying
/// its data to a view.
#[derive(Error, Debug)]
pub enum Error {
    /// Request rejected, unreachable host or non-success status.
    #[error("code: network_failure, description: {0}")]
    Network(String),

    /// Body could not be parsed into the expected shape.
    #[error("code: malformed_response, description: {0}")]
    MalformedResponse(String),

    /// Result arrived after cancellation or after newer data was applied.
    #[error("code: stale_result, description: {0}")]
    StaleResult(String),

    #[error("code: booking_rejected, description: {0}")]
    BookingRejected(String),

    #[error("code: invalid_input, description: {0}")]
    InvalidInput(String),

    #[error("code: already_started, description: refresh loop is {0}")]
    AlreadyStarted(LoopState),
}

impl Error {
    /// Returns the error code.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Network(_) => "network_failure",
            Error::MalformedResponse(_) => "malformed_response",
            Error::StaleResult(_) => "stale_result",
            Error::BookingRejected(_) => "booking_rejected",
            Error::InvalidInput(_) => "invalid_input",
            Error::AlreadyStarted(_) => "already_started",
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Error::MalformedResponse(err.to_string())
        } else {
            Error::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::MalformedResponse(format!("failed to deserialize body: {err}"))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
