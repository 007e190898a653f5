//! Update-check and artifact-fetch protocol against the deployment server.
//!
//! Flow:
//!   1. `requests` builds one candidate request per protocol dialect the
//!      server generations speak.
//!   2. `client` negotiates the candidates in order and hands the winning
//!      response to the decoder in `response`.
//!   3. `resume` streams the artifact itself, resuming over dropped
//!      connections until a time budget runs out.

pub mod client;
pub mod requests;
pub mod response;
pub mod resume;

#[cfg(test)]
pub(crate) mod testutil;

use reqwest::StatusCode;
use thiserror::Error;

use crate::api::TransportError;

use self::response::{UpdateInfo, UpdateResponse};

/// Errors of the update-check and fetch protocol.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// A candidate request could not be constructed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The server rejected a dialect with a status that rules out fallback.
    #[error("server rejected the update check: HTTP {status}: {body}")]
    ServerRejected { status: StatusCode, body: String },

    #[error("unexpected HTTP status {0} during update check")]
    UnexpectedStatus(StatusCode),

    /// Every dialect was answered with 404.
    #[error("no known update-check endpoint on the server")]
    EndpointsExhausted,

    #[error("device not authorized by the deployment server")]
    NotAuthorized,

    /// Undecodable update response, carrying whatever partial update info
    /// could be salvaged.
    #[error("malformed update response: {source}")]
    Malformed {
        partial: Option<UpdateInfo>,
        #[source]
        source:  serde_json::Error,
    },

    /// Decoded but structurally incomplete response.
    #[error("invalid update response: {reason}")]
    Validation {
        response: Box<UpdateResponse>,
        reason:   String,
    },

    #[error("invalid response from the deployment server: HTTP {0}")]
    InvalidResponse(StatusCode),

    /// 200 from the control-map endpoint without a control map in the body.
    #[error("server returned no update control map")]
    MissingControlMap,

    #[error("artifact fetch refused: HTTP {0}")]
    FetchRejected(StatusCode),

    /// The server did not declare a content length for the artifact.
    #[error("artifact size not declared by the server")]
    UnknownSize,

    /// Declared size below the plausibility floor.
    #[error("artifact implausibly small: {size} bytes declared, minimum {min}")]
    TooSmall { size: u64, min: u64 },

    /// Resume answered with something other than 206.
    #[error("resume rejected by the server: HTTP {0}")]
    ResumeRejected(StatusCode),

    /// Stream ended short of the declared size with no budget left.
    #[error("short transfer: {got} of {want} bytes delivered")]
    ShortTransfer { got: u64, want: u64 },
}

pub type Result<T> = std::result::Result<T, UpdateError>;
