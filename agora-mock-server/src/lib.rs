use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::atomic::{AtomicUsize, Ordering},
};

use agora_api::{
    CasOutcome, Comment, CommentId, DocumentStore, EntityId, GraphStore, Thread, ThreadId,
    Username, Version, Versioned, Votes,
};
use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;

/// In-memory document and graph store
///
/// Every trait call counts as one store round-trip in `calls()`, and fails
/// while the store is marked unreachable.
pub struct MockStore {
    inner: Mutex<Inner>,
    calls: AtomicUsize,
}

#[derive(Default)]
struct Inner {
    unreachable: bool,
    users: HashSet<Username>,
    friends: HashMap<Username, BTreeSet<Username>>,
    thread_order: Vec<ThreadId>,
    threads: HashMap<ThreadId, Versioned<Thread>>,
    comments: HashMap<CommentId, Versioned<Comment>>,
}

impl Inner {
    fn votes_of(&mut self, id: EntityId) -> Option<(&mut Version, &mut Votes)> {
        match id {
            EntityId::Thread(t) => self
                .threads
                .get_mut(&t)
                .map(|t| (&mut t.version, &mut t.value.votes)),
            EntityId::Comment(c) => self
                .comments
                .get_mut(&c)
                .map(|c| (&mut c.version, &mut c.value.votes)),
        }
    }

    fn refs_of(&mut self, id: EntityId) -> Option<&mut Vec<CommentId>> {
        match id {
            EntityId::Thread(t) => self.threads.get_mut(&t).map(|t| &mut t.value.comment_refs),
            EntityId::Comment(c) => self.comments.get_mut(&c).map(|c| &mut c.value.child_refs),
        }
    }

    /// Remove `root` and everything still linked below it
    fn remove_subtree(&mut self, root: CommentId) -> bool {
        let mut stack = match self.comments.remove(&root) {
            None => return false,
            Some(removed) => removed.value.child_refs,
        };
        while let Some(id) = stack.pop() {
            if let Some(c) = self.comments.remove(&id) {
                stack.extend(c.value.child_refs);
            }
        }
        true
    }

    fn unlink(&mut self, comment: CommentId) {
        for t in self.threads.values_mut() {
            t.value.comment_refs.retain(|c| *c != comment);
        }
        for c in self.comments.values_mut() {
            c.value.child_refs.retain(|c| *c != comment);
        }
    }
}

impl MockStore {
    pub fn new() -> MockStore {
        MockStore {
            inner: Mutex::new(Inner::default()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn add_user(&self, name: &str) {
        self.inner.lock().users.insert(Username::from(name));
    }

    /// Record a friendship between `a` and `b`, registering both users
    pub fn add_friendship(&self, a: &str, b: &str) {
        let (a, b) = (Username::from(a), Username::from(b));
        let mut inner = self.inner.lock();
        inner.users.insert(a.clone());
        inner.users.insert(b.clone());
        inner.friends.entry(a.clone()).or_default().insert(b.clone());
        inner.friends.entry(b).or_default().insert(a);
    }

    /// Store `comment` as-is without attaching it to a parent
    ///
    /// Lets tests build reference structures the public operations would never
    /// produce, like cycles.
    pub fn insert_raw_comment(&self, comment: Comment) {
        self.inner.lock().comments.insert(
            comment.id,
            Versioned {
                version: 0,
                value: comment,
            },
        );
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.lock().unreachable = unreachable;
    }

    /// Number of store round-trips issued so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn contains_comment(&self, id: CommentId) -> bool {
        self.inner.lock().comments.contains_key(&id)
    }

    pub fn num_comments(&self) -> usize {
        self.inner.lock().comments.len()
    }

    fn connect(&self) -> anyhow::Result<parking_lot::MutexGuard<'_, Inner>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.lock();
        if inner.unreachable {
            return Err(anyhow!("mock store is unreachable"));
        }
        Ok(inner)
    }
}

impl Default for MockStore {
    fn default() -> MockStore {
        MockStore::new()
    }
}

#[async_trait]
impl DocumentStore for MockStore {
    async fn user_exists(&self, user: &Username) -> anyhow::Result<bool> {
        Ok(self.connect()?.users.contains(user))
    }

    async fn insert_thread(&self, thread: &Thread) -> anyhow::Result<()> {
        let mut inner = self.connect()?;
        anyhow::ensure!(
            !inner.threads.contains_key(&thread.id),
            "thread {:?} already exists",
            thread.id
        );
        inner.thread_order.push(thread.id);
        inner.threads.insert(
            thread.id,
            Versioned {
                version: 0,
                value: thread.clone(),
            },
        );
        Ok(())
    }

    async fn fetch_thread(&self, id: ThreadId) -> anyhow::Result<Option<Thread>> {
        Ok(self.connect()?.threads.get(&id).map(|t| t.value.clone()))
    }

    async fn fetch_threads(&self) -> anyhow::Result<Vec<Thread>> {
        let inner = self.connect()?;
        Ok(inner
            .thread_order
            .iter()
            .filter_map(|id| inner.threads.get(id))
            .map(|t| t.value.clone())
            .collect())
    }

    async fn fetch_threads_by_authors(&self, authors: &[Username]) -> anyhow::Result<Vec<Thread>> {
        let inner = self.connect()?;
        Ok(inner
            .thread_order
            .iter()
            .filter_map(|id| inner.threads.get(id))
            .filter(|t| authors.contains(&t.value.author))
            .map(|t| t.value.clone())
            .collect())
    }

    async fn insert_comment(&self, parent: EntityId, comment: &Comment) -> anyhow::Result<bool> {
        let mut inner = self.connect()?;
        anyhow::ensure!(
            !inner.comments.contains_key(&comment.id),
            "comment {:?} already exists",
            comment.id
        );
        match inner.refs_of(parent) {
            None => return Ok(false),
            Some(refs) => refs.push(comment.id),
        }
        inner.comments.insert(
            comment.id,
            Versioned {
                version: 0,
                value: comment.clone(),
            },
        );
        Ok(true)
    }

    async fn fetch_comment(&self, id: CommentId) -> anyhow::Result<Option<Comment>> {
        Ok(self.connect()?.comments.get(&id).map(|c| c.value.clone()))
    }

    async fn set_content(&self, id: EntityId, content: &str) -> anyhow::Result<bool> {
        let mut inner = self.connect()?;
        let slot = match id {
            EntityId::Thread(t) => inner.threads.get_mut(&t).map(|t| &mut t.value.content),
            EntityId::Comment(c) => inner.comments.get_mut(&c).map(|c| &mut c.value.content),
        };
        Ok(match slot {
            None => false,
            Some(slot) => {
                *slot = String::from(content);
                true
            }
        })
    }

    async fn fetch_votes(&self, id: EntityId) -> anyhow::Result<Option<Versioned<Votes>>> {
        Ok(self
            .connect()?
            .votes_of(id)
            .map(|(version, votes)| Versioned {
                version: *version,
                value: votes.clone(),
            }))
    }

    async fn store_votes(
        &self,
        id: EntityId,
        expected: Version,
        votes: &Votes,
    ) -> anyhow::Result<CasOutcome> {
        let mut inner = self.connect()?;
        Ok(match inner.votes_of(id) {
            None => CasOutcome::Missing,
            Some((version, _)) if *version != expected => CasOutcome::Conflict,
            Some((version, stored)) => {
                *version += 1;
                *stored = votes.clone();
                CasOutcome::Committed
            }
        })
    }

    async fn delete_tree(&self, root: EntityId, descendants: &[CommentId]) -> anyhow::Result<bool> {
        let mut inner = self.connect()?;
        let refs = match root {
            EntityId::Thread(t) => match inner.threads.remove(&t) {
                None => return Ok(false),
                Some(thread) => {
                    inner.thread_order.retain(|id| *id != t);
                    thread.value.comment_refs
                }
            },
            EntityId::Comment(c) => match inner.comments.remove(&c) {
                None => return Ok(false),
                Some(comment) => {
                    inner.unlink(c);
                    comment.value.child_refs
                }
            },
        };
        for d in descendants {
            if !inner.remove_subtree(*d) {
                tracing::debug!(comment=?d, "descendant already gone during cascade delete");
            }
        }
        // replies linked after `descendants` was resolved
        for c in refs {
            inner.remove_subtree(c);
        }
        Ok(true)
    }
}

#[async_trait]
impl GraphStore for MockStore {
    async fn reachable(
        &self,
        seed: &Username,
        max_hops: u32,
    ) -> anyhow::Result<Option<HashSet<Username>>> {
        let inner = self.connect()?;
        if !inner.users.contains(seed) {
            return Ok(None);
        }
        let mut seen = HashSet::new();
        seen.insert(seed.clone());
        let mut frontier = vec![seed.clone()];
        for _ in 0..max_hops {
            let mut next = Vec::new();
            for u in &frontier {
                for f in inner.friends.get(u).into_iter().flatten() {
                    if seen.insert(f.clone()) {
                        next.push(f.clone());
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        seen.remove(seed);
        Ok(Some(seen))
    }
}
