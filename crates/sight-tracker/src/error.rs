//! Pipeline error types

use sight_core::CoreError;
use sight_cv::CvError;
use sight_store::{RelayError, StoreError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Vision error: {0}")]
    Cv(#[from] CvError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl TrackerError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

impl From<tokio::task::JoinError> for TrackerError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;
