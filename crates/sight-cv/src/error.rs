//! Error types for the CV module

use thiserror::Error;

/// Errors that can occur in CV operations
#[derive(Error, Debug)]
pub enum CvError {
    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Inference timed out after {0} ms")]
    InferenceTimeout(u64),

    #[error("Video source error: {0}")]
    Source(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Rendering error: {0}")]
    Rendering(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Resource not available: {0}")]
    ResourceUnavailable(String),
}

impl CvError {
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    pub fn source(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    pub fn rendering(msg: impl Into<String>) -> Self {
        Self::Rendering(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

impl From<image::ImageError> for CvError {
    fn from(err: image::ImageError) -> Self {
        Self::Encoding(err.to_string())
    }
}

impl From<reqwest::Error> for CvError {
    fn from(err: reqwest::Error) -> Self {
        Self::Inference(err.to_string())
    }
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for CvError {
    fn from(err: opencv::Error) -> Self {
        Self::Source(err.to_string())
    }
}

pub type CvResult<T> = Result<T, CvError>;
