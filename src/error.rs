//! Error types for the OTA client.

use thiserror::Error;

use crate::sink::SinkError;
use crate::update::UpdateError;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config: {0}")]
    Config(String),

    #[error("Update: {0}")]
    Update(#[from] UpdateError),

    #[error("Sink: {0}")]
    Sink(#[from] SinkError),
}

pub type Result<T> = std::result::Result<T, AgentError>;
