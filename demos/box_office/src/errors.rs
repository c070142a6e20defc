// demos/box_office/src/errors.rs

use seatlock::SeatlockError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Seat reservation error: {source}")]
  Seatlock {
    #[from]
    source: SeatlockError,
  },

  #[error("Buyer task failed: {0}")]
  Buyer(String),

  #[error("Internal Error: {0}")]
  Internal(String),
}

impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    match err.downcast::<SeatlockError>() {
      Ok(source) => AppError::Seatlock { source },
      Err(err) => AppError::Internal(err.to_string()),
    }
  }
}

impl From<tokio::task::JoinError> for AppError {
  fn from(err: tokio::task::JoinError) -> Self {
    AppError::Buyer(err.to_string())
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
