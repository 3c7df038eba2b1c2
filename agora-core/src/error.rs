use crate::api::{CommentId, Error as ApiError, ThreadId, Username};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A store could not be reached or failed the request
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl Error {
    pub fn thread_not_found(id: ThreadId) -> Error {
        Error::Api(ApiError::ThreadNotFound(id))
    }

    pub fn comment_not_found(id: CommentId) -> Error {
        Error::Api(ApiError::CommentNotFound(id))
    }

    pub fn user_not_found(user: Username) -> Error {
        Error::Api(ApiError::UserNotFound(user))
    }

    pub fn cycle_detected(id: CommentId) -> Error {
        Error::Api(ApiError::CycleDetected(id))
    }

    /// The wire-level error for this error, hiding store failure details
    pub fn to_api(&self) -> ApiError {
        match self {
            Error::Anyhow(_) => ApiError::DependencyFailure(String::from(
                "a backing store failed, see logs for details",
            )),
            Error::Api(err) => err.clone(),
        }
    }

    pub fn api(&self) -> Option<&ApiError> {
        match self {
            Error::Anyhow(_) => None,
            Error::Api(err) => Some(err),
        }
    }

    pub fn is_dependency_failure(&self) -> bool {
        matches!(self, Error::Anyhow(_))
    }
}
