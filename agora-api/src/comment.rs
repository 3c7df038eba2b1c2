use uuid::Uuid;

use crate::{validate_text, Error, Username, Votes, STUB_UUID};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub Uuid);

impl CommentId {
    pub fn stub() -> CommentId {
        CommentId(STUB_UUID)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub author: Username,
    pub content: String,

    /// Replies, in display order
    pub child_refs: Vec<CommentId>,

    #[serde(flatten)]
    pub votes: Votes,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewComment {
    pub author: Username,
    pub content: String,
}

impl NewComment {
    pub fn validate(&self) -> Result<(), Error> {
        validate_text("author", self.author.as_str())?;
        validate_text("content", &self.content)
    }

    pub fn into_comment(self, id: CommentId) -> Comment {
        Comment {
            id,
            author: self.author,
            content: self.content,
            child_refs: Vec::new(),
            votes: Votes::new(),
        }
    }
}
