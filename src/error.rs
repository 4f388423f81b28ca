//! Error types for the AcornDB client SDK.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
  #[error("Transport error: {0}")]
  Transport(String),

  #[error("Error logging in, verify email and password")]
  Credentials,

  #[error("Codec error: {0}")]
  Codec(String),

  #[error("Protocol error: {0}")]
  Protocol(String),

  #[error("Push timed out")]
  Timeout,

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("Serialization error: {0}")]
  Serialization(String),

  #[error("Invalid configuration: {0}")]
  Config(String),

  #[error("Channel closed")]
  ChannelClosed,
}

impl From<serde_json::Error> for Error {
  fn from(e: serde_json::Error) -> Self {
    Self::Serialization(e.to_string())
  }
}

impl From<reqwest::Error> for Error {
  fn from(e: reqwest::Error) -> Self {
    Self::Transport(e.to_string())
  }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
  fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
    Self::Transport(e.to_string())
  }
}

pub type Result<T> = std::result::Result<T, Error>;
