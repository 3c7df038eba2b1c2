use std::str::FromStr;

use anyhow::{anyhow, Context};
use serde_json::json;
use uuid::Uuid;

use crate::{CommentId, ThreadId, Username};

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Dependency failure: {0}")]
    DependencyFailure(String),

    #[error("Invalid feed depth {0:?}, expected a positive integer")]
    InvalidDepth(String),

    #[error("Invalid sort mode {0:?}")]
    InvalidSortMode(String),

    #[error("Field {0} must not be empty")]
    EmptyField(String),

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),

    #[error("Thread not found {0:?}")]
    ThreadNotFound(ThreadId),

    #[error("Comment not found {0:?}")]
    CommentNotFound(CommentId),

    #[error("User not found {0}")]
    UserNotFound(Username),

    #[error("Comment tree contains a cycle through {0:?}")]
    CycleDetected(CommentId),
}

impl Error {
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidDepth(_)
                | Error::InvalidSortMode(_)
                | Error::EmptyField(_)
                | Error::NullByteInString(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::ThreadNotFound(_) | Error::CommentNotFound(_) | Error::UserNotFound(_)
        )
    }

    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::DependencyFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::InvalidDepth(_) => StatusCode::BAD_REQUEST,
            Error::InvalidSortMode(_) => StatusCode::BAD_REQUEST,
            Error::EmptyField(_) => StatusCode::BAD_REQUEST,
            Error::NullByteInString(_) => StatusCode::BAD_REQUEST,
            Error::ThreadNotFound(_) => StatusCode::NOT_FOUND,
            Error::CommentNotFound(_) => StatusCode::NOT_FOUND,
            Error::UserNotFound(_) => StatusCode::NOT_FOUND,
            Error::CycleDetected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        serde_json::to_vec(&match self {
            Error::DependencyFailure(msg) => json!({
                "message": msg,
                "type": "dependency-failure",
            }),
            Error::InvalidDepth(d) => json!({
                "message": "depth must be a positive integer",
                "type": "invalid-depth",
                "depth": d,
            }),
            Error::InvalidSortMode(s) => json!({
                "message": "unknown sort mode",
                "type": "invalid-sort",
                "sort": s,
            }),
            Error::EmptyField(f) => json!({
                "message": "a required field was empty",
                "type": "empty-field",
                "field": f,
            }),
            Error::NullByteInString(s) => json!({
                "message": "there was a null byte in argument string",
                "type": "null-byte",
                "string": s,
            }),
            Error::ThreadNotFound(t) => json!({
                "message": "thread not found",
                "type": "thread-not-found",
                "id": t.0,
            }),
            Error::CommentNotFound(c) => json!({
                "message": "comment not found",
                "type": "comment-not-found",
                "id": c.0,
            }),
            Error::UserNotFound(u) => json!({
                "message": "user not found",
                "type": "user-not-found",
                "username": u,
            }),
            Error::CycleDetected(c) => json!({
                "message": "stored comment tree contains a cycle",
                "type": "cycle-detected",
                "id": c.0,
            }),
        })
        .expect("serializing error contents")
    }

    pub fn parse(body: &[u8]) -> anyhow::Result<Error> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        let field = |name: &str| -> anyhow::Result<String> {
            data.get(name)
                .and_then(|v| v.as_str())
                .map(String::from)
                .ok_or_else(|| anyhow!("error contents lack a string {name:?} field"))
        };
        let uuid = || -> anyhow::Result<Uuid> {
            Uuid::from_str(&field("id")?).context("parsing id field of error contents")
        };
        Ok(
            match data
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| anyhow!("error type is not a string"))?
            {
                "dependency-failure" => {
                    Error::DependencyFailure(field("message").unwrap_or_default())
                }
                "invalid-depth" => Error::InvalidDepth(field("depth")?),
                "invalid-sort" => Error::InvalidSortMode(field("sort")?),
                "empty-field" => Error::EmptyField(field("field")?),
                "null-byte" => Error::NullByteInString(field("string")?),
                "thread-not-found" => Error::ThreadNotFound(ThreadId(uuid()?)),
                "comment-not-found" => Error::CommentNotFound(CommentId(uuid()?)),
                "user-not-found" => Error::UserNotFound(Username(field("username")?)),
                "cycle-detected" => Error::CycleDetected(CommentId(uuid()?)),
                _ => return Err(anyhow!("error contents has unknown type")),
            },
        )
    }
}
