use std::str::FromStr;

use crate::{CommentId, Error, ThreadId, Username, VoteCounts};

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ThreadView {
    pub id: ThreadId,
    pub author: Username,
    pub title: String,
    pub content: String,
    pub counts: VoteCounts,
    pub comments: Vec<CommentNode>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentView {
    pub id: CommentId,
    pub author: Username,
    pub content: String,
    pub counts: VoteCounts,
    pub children: Vec<CommentNode>,
}

/// One position of a materialized comment tree
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum CommentNode {
    Loaded(CommentView),

    /// The reference could not be resolved, eg. it was deleted concurrently
    Missing { id: CommentId },
}

impl CommentNode {
    pub fn id(&self) -> CommentId {
        match self {
            CommentNode::Loaded(c) => c.id,
            CommentNode::Missing { id } => *id,
        }
    }

    pub fn loaded(&self) -> Option<&CommentView> {
        match self {
            CommentNode::Loaded(c) => Some(c),
            CommentNode::Missing { .. } => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct RankedView {
    pub id: ThreadId,
    pub author: Username,
    pub title: String,
    pub content: String,
    pub counts: VoteCounts,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    /// Storage order
    #[default]
    Default,

    /// Most upvoted first
    Upvotes,

    /// Highest upvotes minus downvotes first
    Rate,
}

impl SortMode {
    /// Parse the optional `sort` request parameter, absent meaning `Default`
    pub fn from_param(param: Option<&str>) -> Result<SortMode, Error> {
        param.map(SortMode::from_str).unwrap_or(Ok(SortMode::Default))
    }
}

impl FromStr for SortMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<SortMode, Error> {
        match s {
            "default" => Ok(SortMode::Default),
            "upvotes" => Ok(SortMode::Upvotes),
            "rate" => Ok(SortMode::Rate),
            _ => Err(Error::InvalidSortMode(String::from(s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_mode_param() {
        assert_eq!(SortMode::from_param(None), Ok(SortMode::Default));
        assert_eq!(SortMode::from_param(Some("rate")), Ok(SortMode::Rate));
        assert_eq!(
            SortMode::from_param(Some("upvotes")),
            Ok(SortMode::Upvotes)
        );
        assert_eq!(
            SortMode::from_param(Some("newest")),
            Err(Error::InvalidSortMode(String::from("newest")))
        );
    }

    #[test]
    fn missing_node_shape() {
        let node = CommentNode::Missing {
            id: CommentId::stub(),
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["status"], "missing");
        assert_eq!(serde_json::from_value::<CommentNode>(json).unwrap(), node);
    }
}
