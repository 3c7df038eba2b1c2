use std::sync::Arc;

use anyhow::Context;

use crate::{
    api::{
        Comment, CommentId, ContentUpdate, DocumentStore, EntityId, GraphStore, NewComment,
        NewThread, RankedView, SortMode, Thread, ThreadId, ThreadView, Username, Uuid,
        VoteDirection, VoteOutcome,
    },
    descendants, feed, ledger, materialize, Error, RankExt,
};

/// The forum operations, over injected store clients
///
/// Built once at startup and cloned into every request handler; clones share
/// the same store clients.
#[derive(Clone)]
pub struct Forum {
    docs: Arc<dyn DocumentStore>,
    graph: Arc<dyn GraphStore>,
}

impl Forum {
    pub fn new(docs: Arc<dyn DocumentStore>, graph: Arc<dyn GraphStore>) -> Forum {
        Forum { docs, graph }
    }

    async fn ensure_user(&self, user: &Username) -> Result<(), Error> {
        let exists = self
            .docs
            .user_exists(user)
            .await
            .with_context(|| format!("checking whether user {user} exists"))?;
        if !exists {
            return Err(Error::user_not_found(user.clone()));
        }
        Ok(())
    }

    async fn fetch_thread(&self, id: ThreadId) -> Result<Thread, Error> {
        self.docs
            .fetch_thread(id)
            .await
            .with_context(|| format!("fetching thread {id:?}"))?
            .ok_or_else(|| Error::thread_not_found(id))
    }

    async fn fetch_comment(&self, id: CommentId) -> Result<Comment, Error> {
        self.docs
            .fetch_comment(id)
            .await
            .with_context(|| format!("fetching comment {id:?}"))?
            .ok_or_else(|| Error::comment_not_found(id))
    }

    async fn set_content(&self, id: EntityId, data: &ContentUpdate) -> Result<(), Error> {
        data.validate()?;
        let found = self
            .docs
            .set_content(id, &data.content)
            .await
            .with_context(|| format!("updating content of {id:?}"))?;
        if !found {
            return Err(id.not_found().into());
        }
        Ok(())
    }

    /// Delete `root` along with every comment in `refs`' subtrees
    async fn delete_tree(&self, root: EntityId, refs: &[CommentId]) -> Result<usize, Error> {
        let mut doomed = descendants(&*self.docs, refs).await?;
        doomed.reverse();
        let found = self
            .docs
            .delete_tree(root, &doomed)
            .await
            .with_context(|| format!("deleting {root:?} and {} comments", doomed.len()))?;
        if !found {
            return Err(root.not_found().into());
        }
        Ok(doomed.len())
    }

    pub async fn create_thread(&self, data: NewThread) -> Result<Thread, Error> {
        data.validate()?;
        self.ensure_user(&data.author).await?;
        let thread = data.into_thread(ThreadId(Uuid::new_v4()));
        self.docs
            .insert_thread(&thread)
            .await
            .with_context(|| format!("inserting thread {:?}", thread.id))?;
        tracing::info!(thread = ?thread.id, author = %thread.author, "thread created");
        Ok(thread)
    }

    pub async fn update_thread_content(
        &self,
        id: ThreadId,
        data: ContentUpdate,
    ) -> Result<Thread, Error> {
        self.set_content(EntityId::Thread(id), &data).await?;
        self.fetch_thread(id).await
    }

    /// Delete thread `id` and all its comments, returning the deleted thread
    pub async fn delete_thread(&self, id: ThreadId) -> Result<Thread, Error> {
        let thread = self.fetch_thread(id).await?;
        let deleted = self
            .delete_tree(EntityId::Thread(id), &thread.comment_refs)
            .await?;
        tracing::info!(thread = ?id, comments = deleted, "thread deleted");
        Ok(thread)
    }

    pub async fn list_threads(&self, mode: SortMode) -> Result<Vec<RankedView>, Error> {
        let threads = self.docs.fetch_threads().await.context("listing threads")?;
        Ok(mode.rank(&threads).collect())
    }

    /// Thread `id` with its whole comment tree
    pub async fn get_thread(&self, id: ThreadId) -> Result<ThreadView, Error> {
        let thread = self.fetch_thread(id).await?;
        let comments = materialize(&*self.docs, &thread.comment_refs).await?;
        Ok(ThreadView {
            id,
            counts: thread.votes.counts(),
            author: thread.author,
            title: thread.title,
            content: thread.content,
            comments,
        })
    }

    /// Add a comment under `parent`, which is either a thread or a comment
    pub async fn add_comment(&self, parent: EntityId, data: NewComment) -> Result<Comment, Error> {
        data.validate()?;
        self.ensure_user(&data.author).await?;
        let comment = data.into_comment(CommentId(Uuid::new_v4()));
        let found = self
            .docs
            .insert_comment(parent, &comment)
            .await
            .with_context(|| format!("inserting comment {:?} under {parent:?}", comment.id))?;
        if !found {
            return Err(parent.not_found().into());
        }
        tracing::info!(comment = ?comment.id, ?parent, author = %comment.author, "comment added");
        Ok(comment)
    }

    pub async fn update_comment_content(
        &self,
        id: CommentId,
        data: ContentUpdate,
    ) -> Result<Comment, Error> {
        self.set_content(EntityId::Comment(id), &data).await?;
        self.fetch_comment(id).await
    }

    /// Delete comment `id` and its replies, returning the deleted comment
    pub async fn delete_comment(&self, id: CommentId) -> Result<Comment, Error> {
        let comment = self.fetch_comment(id).await?;
        let deleted = self
            .delete_tree(EntityId::Comment(id), &comment.child_refs)
            .await?;
        tracing::info!(comment = ?id, replies = deleted, "comment deleted");
        Ok(comment)
    }

    pub async fn apply_vote(
        &self,
        id: EntityId,
        voter: &Username,
        direction: VoteDirection,
    ) -> Result<VoteOutcome, Error> {
        self.ensure_user(voter).await?;
        ledger::apply_vote(&*self.docs, id, voter, direction).await
    }

    pub async fn get_feed(&self, seed: &Username, depth: i64) -> Result<Vec<Thread>, Error> {
        feed::assemble_feed(&*self.graph, &*self.docs, seed, depth).await
    }
}
