use std::collections::HashSet;

use async_trait::async_trait;

use crate::{Comment, CommentId, EntityId, Thread, ThreadId, Username, Votes};

pub type Version = u64;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Versioned<T> {
    pub version: Version,
    pub value: T,
}

/// Result of a conditional write
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CasOutcome {
    Committed,

    /// The stored version was not the expected one, nothing was written
    Conflict,

    /// The entity does not exist (anymore)
    Missing,
}

/// Client of the store holding threads, comments and the identity registry
///
/// Errors are transport or storage failures; an absent record is reported
/// through the `Option`/`bool`/`CasOutcome` return values instead.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn user_exists(&self, user: &Username) -> anyhow::Result<bool>;

    async fn insert_thread(&self, thread: &Thread) -> anyhow::Result<()>;
    async fn fetch_thread(&self, id: ThreadId) -> anyhow::Result<Option<Thread>>;

    /// All threads, in storage order
    async fn fetch_threads(&self) -> anyhow::Result<Vec<Thread>>;

    /// All threads whose author is one of `authors`, in storage order
    async fn fetch_threads_by_authors(&self, authors: &[Username]) -> anyhow::Result<Vec<Thread>>;

    /// Insert `comment` and append its id to the references of `parent`, atomically
    ///
    /// Returns false without inserting anything if `parent` does not exist.
    async fn insert_comment(&self, parent: EntityId, comment: &Comment) -> anyhow::Result<bool>;
    async fn fetch_comment(&self, id: CommentId) -> anyhow::Result<Option<Comment>>;

    /// Returns false if the entity does not exist
    async fn set_content(&self, id: EntityId, content: &str) -> anyhow::Result<bool>;

    async fn fetch_votes(&self, id: EntityId) -> anyhow::Result<Option<Versioned<Votes>>>;

    /// Replace the votes of `id` if its version is still `expected`, bumping the version
    async fn store_votes(
        &self,
        id: EntityId,
        expected: Version,
        votes: &Votes,
    ) -> anyhow::Result<CasOutcome>;

    /// Delete `root` and `descendants` in one transaction
    ///
    /// `descendants` is ordered leaves first. Comments linked below `root`
    /// after `descendants` was resolved are deleted too, so that no reply is
    /// left without a parent. When `root` is a comment, it is also unlinked
    /// from the reference list of its parent. Returns false if `root` does
    /// not exist.
    async fn delete_tree(&self, root: EntityId, descendants: &[CommentId]) -> anyhow::Result<bool>;
}

/// Client of the store holding the friendship relation
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Every identity reachable from `seed` through 1 to `max_hops` friendship
    /// edges, not including `seed` itself
    ///
    /// Returns `None` if `seed` is not a known identity.
    async fn reachable(
        &self,
        seed: &Username,
        max_hops: u32,
    ) -> anyhow::Result<Option<HashSet<Username>>>;
}
