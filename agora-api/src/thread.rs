use uuid::Uuid;

use crate::{validate_text, CommentId, Error, Username, Votes, STUB_UUID};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct ThreadId(pub Uuid);

impl ThreadId {
    pub fn stub() -> ThreadId {
        ThreadId(STUB_UUID)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Thread {
    pub id: ThreadId,
    pub author: Username,
    pub title: String,
    pub content: String,

    /// Top-level comments, in display order
    pub comment_refs: Vec<CommentId>,

    #[serde(flatten)]
    pub votes: Votes,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewThread {
    pub author: Username,
    pub title: String,
    pub content: String,
}

impl NewThread {
    pub fn validate(&self) -> Result<(), Error> {
        validate_text("author", self.author.as_str())?;
        validate_text("title", &self.title)?;
        validate_text("content", &self.content)
    }

    pub fn into_thread(self, id: ThreadId) -> Thread {
        Thread {
            id,
            author: self.author,
            title: self.title,
            content: self.content,
            comment_refs: Vec::new(),
            votes: Votes::new(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ContentUpdate {
    pub content: String,
}

impl ContentUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        validate_text("content", &self.content)
    }
}
