use std::str::FromStr;

use agora_api::{Error as ApiError, FeedDepth, SortMode};
use agora_core::Forum;
use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::request,
};

use crate::Error;

#[derive(Clone, axum::extract::FromRef)]
pub struct AppState {
    pub forum: Forum,
}

#[derive(serde::Deserialize)]
struct SortParams {
    sort: Option<String>,
}

#[derive(serde::Deserialize)]
struct DepthParams {
    depth: Option<String>,
}

/// Unparseable query strings are reported verbatim
fn raw_query(req: &request::Parts) -> String {
    req.uri.query().unwrap_or_default().to_string()
}

/// The `sort` query parameter, defaulting to storage order
pub struct Sort(pub SortMode);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Sort {
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, state: &S) -> Result<Sort, Error> {
        let params = Query::<SortParams>::from_request_parts(req, state)
            .await
            .map_err(|_| ApiError::InvalidSortMode(raw_query(req)))?
            .0
            .sort;
        Ok(Sort(SortMode::from_param(params.as_deref())?))
    }
}

/// The mandatory `depth` query parameter of feed requests
pub struct Depth(pub FeedDepth);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Depth {
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, state: &S) -> Result<Depth, Error> {
        let raw = Query::<DepthParams>::from_request_parts(req, state)
            .await
            .map_err(|_| ApiError::InvalidDepth(raw_query(req)))?
            .0
            .depth
            .unwrap_or_default();
        Ok(Depth(FeedDepth::from_str(&raw)?))
    }
}
