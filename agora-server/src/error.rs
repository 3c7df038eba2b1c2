use agora_api::Error as ApiError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] agora_core::Error),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl Error {
    pub fn timed_out() -> Error {
        Error::Api(ApiError::DependencyFailure(String::from(
            "request timed out, a backing store may be slow",
        )))
    }
}

impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let err = match self {
            Error::Core(err) => {
                if let agora_core::Error::Anyhow(err) = &err {
                    tracing::error!(?err, "backing store failure");
                }
                err.to_api()
            }
            Error::Api(err) => err,
        };
        if err.is_validation() || err.is_not_found() {
            tracing::info!("returning error to client: {err}");
        } else {
            tracing::warn!("returning error to client: {err}");
        }
        (err.status_code(), err.contents()).into_response()
    }
}
