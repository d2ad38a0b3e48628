use http::StatusCode;
use thiserror::Error;

pub type ServingResult<T> = std::result::Result<T, ServingError>;

/// Errors of the inference pipeline.
///
/// Each maps to one HTTP status; none of them takes the worker down.
#[derive(Debug, Error)]
pub enum ServingError {
    #[error("UnsupportedContentTypeError: {0}")]
    UnsupportedContentType(String),

    #[error("UnsupportedAcceptTypeError: {0}")]
    UnsupportedAccept(String),

    #[error("UnsupportedFormatError: {0}")]
    UnsupportedInputShape(String),

    #[error("model is not loaded")]
    ModelNotLoaded,

    #[error("failed to load model: {0:#}")]
    ModelLoad(anyhow::Error),

    #[error("{0:#}")]
    Internal(anyhow::Error),
}

impl ServingError {
    /// Wraps an error from user code, keeping pipeline errors it raised itself.
    pub fn from_user(err: anyhow::Error) -> Self {
        match err.downcast::<Self>() {
            Ok(typed) => typed,
            Err(err) => Self::Internal(err),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnsupportedContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::UnsupportedAccept(_) => StatusCode::NOT_ACCEPTABLE,
            Self::UnsupportedInputShape(_) => StatusCode::PRECONDITION_FAILED,
            Self::ModelNotLoaded => StatusCode::SERVICE_UNAVAILABLE,
            Self::ModelLoad(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the response should carry the error message.
    ///
    /// Internal errors are logged but answered with an empty body.
    pub fn exposes_message(&self) -> bool {
        !matches!(self, Self::ModelLoad(_) | Self::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(err: &ServingError) -> u16 {
        err.status_code().as_u16()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status(&ServingError::UnsupportedContentType("a/b".into())), 415);
        assert_eq!(status(&ServingError::UnsupportedAccept("a/b".into())), 406);
        assert_eq!(status(&ServingError::UnsupportedInputShape("ragged".into())), 412);
        assert_eq!(status(&ServingError::ModelNotLoaded), 503);
        assert_eq!(status(&ServingError::Internal(anyhow::anyhow!("x"))), 500);
    }

    #[test]
    fn test_from_user_keeps_pipeline_errors() {
        let shape = ServingError::UnsupportedInputShape("expected 4 features".into());
        assert_eq!(status(&ServingError::from_user(anyhow::Error::new(shape))), 412);

        let other = ServingError::from_user(anyhow::anyhow!("boom"));
        assert!(matches!(other, ServingError::Internal(_)));
    }
}
