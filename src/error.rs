use crate::reddit::DataError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("index {0} out of range")]
    OutOfRange(i64),
    #[error("no valid landing index")]
    InvalidMove,
    #[error("content unavailable: {0}")]
    ContentUnavailable(#[from] DataError),
}

impl Error {
    /// Short message for the notification box.
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::ContentUnavailable(DataError::AuthRequired) => "Not logged in",
            Error::ContentUnavailable(DataError::NotFound) => "Not found",
            Error::ContentUnavailable(DataError::RateLimited) => "Rate limited, try again later",
            Error::ContentUnavailable(DataError::Network(_)) => "Connection error",
            Error::ContentUnavailable(DataError::Forbidden) => "Forbidden",
            Error::ContentUnavailable(DataError::Api { .. })
            | Error::OutOfRange(_)
            | Error::InvalidMove => "Error",
        }
    }
}

/// Finds the data-source failure behind an error chain, if there is one.
pub fn classify(err: &anyhow::Error) -> Option<Error> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<DataError>())
        .cloned()
        .map(Error::ContentUnavailable)
}

pub fn user_message(err: &anyhow::Error) -> &'static str {
    classify(err).map_or("Error", |err| err.user_message())
}
