mod comment;
pub use comment::{Comment, CommentId, NewComment};

mod db;
pub use db::{CasOutcome, DocumentStore, GraphStore, Version, Versioned};

mod error;
pub use error::Error;

mod feed;
pub use feed::FeedDepth;

mod thread;
pub use thread::{ContentUpdate, NewThread, Thread, ThreadId};

mod user;
pub use user::Username;

mod view;
pub use view::{CommentNode, CommentView, RankedView, SortMode, ThreadView};

mod vote;
pub use vote::{VoteCounts, VoteDirection, VoteOutcome, VoteRequest, Votes};

pub use uuid::{uuid, Uuid};

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

/// Any entity that carries content and a vote ledger
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum EntityId {
    Thread(ThreadId),
    Comment(CommentId),
}

impl EntityId {
    /// The error to report when this entity does not exist
    pub fn not_found(&self) -> Error {
        match self {
            EntityId::Thread(t) => Error::ThreadNotFound(*t),
            EntityId::Comment(c) => Error::CommentNotFound(*c),
        }
    }
}

impl From<ThreadId> for EntityId {
    fn from(t: ThreadId) -> EntityId {
        EntityId::Thread(t)
    }
}

impl From<CommentId> for EntityId {
    fn from(c: CommentId) -> EntityId {
        EntityId::Comment(c)
    }
}

fn validate_text(field: &str, s: &str) -> Result<(), Error> {
    if s.is_empty() {
        return Err(Error::EmptyField(String::from(field)));
    }
    if s.contains('\0') {
        return Err(Error::NullByteInString(String::from(s)));
    }
    Ok(())
}
