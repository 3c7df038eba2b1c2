#![cfg(test)]

use std::{
    collections::{BTreeSet, HashMap},
    future::Future,
    mem::Discriminant,
    panic::AssertUnwindSafe,
    path::Path,
    sync::Arc,
};

use agora_api::{
    CasOutcome, CommentId, CommentNode, DocumentStore, EntityId, Error as ApiError, GraphStore,
    NewComment, NewThread, SortMode, ThreadId, Username, Uuid, Versioned, VoteCounts,
    VoteDirection, VoteOutcome,
};
use agora_core::descendants;
use agora_mock_server::MockStore;
use async_trait::async_trait;
use bolero::generator::TypeGenerator;

use crate::*;

fn build_pg_cluster(data: &Path) -> postgresfixture::cluster::Cluster {
    let mut runtime = None;
    let mut best_version = None;
    for r in postgresfixture::runtime::Runtime::find_on_path() {
        if let Ok(v) = r.version() {
            match (&mut runtime, &mut best_version) {
                (None, None) => {
                    runtime = Some(r);
                    best_version = Some(v);
                }
                (Some(runtime), Some(best_version)) => {
                    if *best_version < v {
                        *runtime = r;
                        *best_version = v;
                    }
                }
                _ => unreachable!(),
            }
        }
    }
    postgresfixture::cluster::Cluster::new(
        data,
        runtime.expect("postgresql seems to not be installed in path"),
    )
}

/// Run `f` against a migrated `test_db` on a throwaway cluster
fn with_test_db(f: impl FnOnce(&tokio::runtime::Runtime, sqlx::PgPool)) {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt::try_init();
    }
    let lockfile = tempfile::tempfile().expect("creating tempfile");
    let datadir = tempfile::tempdir().expect("creating tempdir");
    let datadir_path: &Path = datadir.as_ref();
    let cluster = build_pg_cluster(datadir_path);
    let datadir_path: &str = datadir_path.to_str().expect("tempdir is not valid utf8");
    let f = AssertUnwindSafe(f);
    postgresfixture::coordinate::run_and_destroy(&cluster, lockfile.into(), || {
        let f = f;
        cluster.createdb("test_db").expect("creating test_db database");
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed initializing tokio runtime");
        let pool = runtime.block_on(async move {
            let pool = create_sqlx_pool(
                &format!("postgresql://?host={}&dbname=test_db", datadir_path),
                4,
            )
            .await
            .expect("creating sqlx pool");
            MIGRATOR
                .run(&mut *pool.acquire().await.expect("getting migrator connection"))
                .await
                .expect("failed applying migrations");
            pool
        });
        (f.0)(&runtime, pool)
    })
    .expect("coordinating spinup and shutdown of the pg cluster");
}

/// Run `test`, then wipe the database even if it panicked
fn run_and_reset(
    runtime: &tokio::runtime::Runtime,
    pool: &sqlx::PgPool,
    what: &str,
    test: impl Future<Output = ()>,
) {
    let idle_before = pool.num_idle();
    let idle_after_res = std::panic::catch_unwind(AssertUnwindSafe(|| {
        runtime.block_on(async {
            test.await;
            let mut idle_after = pool.num_idle();
            let wait_release_since = std::time::Instant::now();
            while idle_after < idle_before
                && wait_release_since.elapsed() <= std::time::Duration::from_secs(1)
            {
                tokio::task::yield_now().await;
                idle_after = pool.num_idle();
            }
            idle_after
        })
    }));
    runtime.block_on(async {
        let mut conn = pool.acquire().await.expect("getting db cleanup connection");
        sqlx::query(include_str!("../reset-test-db.sql"))
            .execute(&mut *conn)
            .await
            .expect("failed cleaning up database");
    });
    match idle_after_res {
        Err(e) => std::panic::resume_unwind(e),
        Ok(idle_after) => assert!(
            idle_after >= idle_before,
            "{what} held onto pool after exiting test: before there were {idle_before} connections, and after there were {idle_after}"
        ),
    }
}

macro_rules! do_sqlx_test {
    ( $name:ident, $gen:expr, $fn:expr ) => {
        #[test]
        fn $name() {
            with_test_db(|runtime, pool| {
                let runtime = AssertUnwindSafe(runtime);
                let pool = AssertUnwindSafe(pool);
                bolero::check!()
                    .with_generator($gen)
                    .cloned()
                    .for_each(move |v| {
                        let what = format!("{} with value {v:?}", stringify!($name));
                        run_and_reset(&runtime, &pool, &what, $fn(pool.clone(), v));
                    });
            })
        }
    };
}

/// Runs one scenario against both `MockStore` and `PostgresStore`
macro_rules! store_contract {
    ( $name:ident ) => {
        mod $name {
            use super::*;

            #[tokio::test]
            async fn mock() {
                let store = Arc::new(MockStore::new());
                super::$name(Backend::new(store.clone(), store)).await;
            }

            #[test]
            fn postgres() {
                with_test_db(|runtime, pool| {
                    let backend = Backend::new(
                        Arc::new(PostgresStore::new(pool.clone())),
                        Arc::new(pool.clone()),
                    );
                    run_and_reset(runtime, &pool, stringify!($name), super::$name(backend));
                });
            }
        }
    };
}

/// Identities and friendships, which the forum itself never creates
#[async_trait]
trait Directory: Send + Sync {
    async fn register(&self, name: &str);
    async fn befriend(&self, a: &str, b: &str);
}

#[async_trait]
impl Directory for MockStore {
    async fn register(&self, name: &str) {
        self.add_user(name);
    }

    async fn befriend(&self, a: &str, b: &str) {
        self.add_friendship(a, b);
    }
}

#[async_trait]
impl Directory for sqlx::PgPool {
    async fn register(&self, name: &str) {
        sqlx::query("INSERT INTO users (name) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(name)
            .execute(self)
            .await
            .expect("inserting user");
    }

    async fn befriend(&self, a: &str, b: &str) {
        self.register(a).await;
        self.register(b).await;
        sqlx::query("INSERT INTO friendships (a, b) VALUES ($1, $2), ($2, $1)")
            .bind(a)
            .bind(b)
            .execute(self)
            .await
            .expect("inserting friendship");
    }
}

struct Backend {
    docs: Arc<dyn DocumentStore>,
    graph: Arc<dyn GraphStore>,
    directory: Arc<dyn Directory>,
    forum: Forum,
}

impl Backend {
    fn new<S>(store: Arc<S>, directory: Arc<dyn Directory>) -> Backend
    where
        S: DocumentStore + GraphStore + 'static,
    {
        Backend {
            docs: store.clone(),
            graph: store.clone(),
            directory,
            forum: Forum::new(store.clone(), store),
        }
    }
}

fn new_thread(author: &str, title: &str) -> NewThread {
    NewThread {
        author: Username::from(author),
        title: String::from(title),
        content: String::from("content"),
    }
}

fn new_comment(content: &str) -> NewComment {
    NewComment {
        author: Username::from("bob"),
        content: String::from(content),
    }
}

async fn friends_of_friends(b: Backend) {
    b.directory.befriend("carol", "bob").await;
    b.directory.befriend("bob", "dana").await;
    b.directory.register("eve").await;

    let reach = |user: &'static str, hops: u32| {
        let graph = b.graph.clone();
        async move {
            graph
                .reachable(&Username::from(user), hops)
                .await
                .expect("expanding friends")
                .map(|set| set.into_iter().map(|u| u.0).collect::<BTreeSet<_>>())
        }
    };
    let set = |names: &[&str]| Some(names.iter().map(|n| n.to_string()).collect::<BTreeSet<_>>());
    assert_eq!(reach("carol", 1).await, set(&["bob"]));
    assert_eq!(reach("carol", 2).await, set(&["bob", "dana"]));
    assert_eq!(reach("carol", u32::MAX).await, set(&["bob", "dana"]));
    assert_eq!(reach("eve", 3).await, set(&[]));
    assert_eq!(reach("ghost", 3).await, None);

    b.forum.create_thread(new_thread("dana", "T2")).await.unwrap();
    b.forum.create_thread(new_thread("carol", "own")).await.unwrap();
    let carol = Username::from("carol");
    assert!(b.forum.get_feed(&carol, 1).await.unwrap().is_empty());
    let titles = b
        .forum
        .get_feed(&carol, 2)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.title)
        .collect::<Vec<_>>();
    assert_eq!(titles, vec!["T2"]);
}
store_contract!(friends_of_friends);

async fn stale_versions_conflict(b: Backend) {
    b.directory.register("alice").await;
    let t = b.forum.create_thread(new_thread("alice", "t")).await.unwrap();
    let id = EntityId::Thread(t.id);

    let Versioned { version, value } = b.docs.fetch_votes(id).await.unwrap().unwrap();
    let mut votes = value;
    votes.apply(&Username::from("bob"), VoteDirection::Up);
    assert_eq!(
        b.docs.store_votes(id, version, &votes).await.unwrap(),
        CasOutcome::Committed
    );
    assert_eq!(
        b.docs.store_votes(id, version, &votes).await.unwrap(),
        CasOutcome::Conflict
    );
    let stored = b.docs.fetch_votes(id).await.unwrap().unwrap();
    assert_eq!(stored.version, version + 1);
    assert_eq!(stored.value, votes);

    let missing = EntityId::Comment(CommentId::stub());
    assert_eq!(
        b.docs.store_votes(missing, 0, &votes).await.unwrap(),
        CasOutcome::Missing
    );
}
store_contract!(stale_versions_conflict);

async fn deleting_a_thread_removes_its_comment_chain(b: Backend) {
    b.directory.register("alice").await;
    b.directory.register("bob").await;
    let t = b.forum.create_thread(new_thread("alice", "t")).await.unwrap();
    let c1 = b.forum.add_comment(t.id.into(), new_comment("c1")).await.unwrap();
    let c2 = b.forum.add_comment(c1.id.into(), new_comment("c2")).await.unwrap();
    let c3 = b.forum.add_comment(c2.id.into(), new_comment("c3")).await.unwrap();
    let other = b.forum.create_thread(new_thread("bob", "kept")).await.unwrap();
    let kept = b
        .forum
        .add_comment(other.id.into(), new_comment("kept"))
        .await
        .unwrap();

    assert_eq!(b.forum.delete_thread(t.id).await.unwrap().id, t.id);
    for c in [c1.id, c2.id, c3.id] {
        assert_eq!(b.docs.fetch_comment(c).await.unwrap(), None);
    }
    assert_eq!(b.docs.fetch_comment(kept.id).await.unwrap(), Some(kept));

    let err = b.forum.delete_thread(t.id).await.unwrap_err();
    assert_eq!(err.api(), Some(&ApiError::ThreadNotFound(t.id)));
}
store_contract!(deleting_a_thread_removes_its_comment_chain);

async fn deleting_a_comment_unlinks_it(b: Backend) {
    b.directory.register("alice").await;
    b.directory.register("bob").await;
    let t = b.forum.create_thread(new_thread("alice", "t")).await.unwrap();
    let c = b.forum.add_comment(t.id.into(), new_comment("c")).await.unwrap();
    let reply = b.forum.add_comment(c.id.into(), new_comment("reply")).await.unwrap();
    let sibling = b
        .forum
        .add_comment(t.id.into(), new_comment("sibling"))
        .await
        .unwrap();

    b.forum.delete_comment(c.id).await.unwrap();
    assert_eq!(b.docs.fetch_comment(reply.id).await.unwrap(), None);
    let stored = b.docs.fetch_thread(t.id).await.unwrap().unwrap();
    assert_eq!(stored.comment_refs, vec![sibling.id]);
}
store_contract!(deleting_a_comment_unlinks_it);

async fn replies_linked_during_a_delete_go_with_it(b: Backend) {
    b.directory.register("alice").await;
    b.directory.register("bob").await;

    let t = b.forum.create_thread(new_thread("alice", "t")).await.unwrap();
    let c1 = b.forum.add_comment(t.id.into(), new_comment("c1")).await.unwrap();
    let doomed = descendants(&*b.docs, &[c1.id]).await.unwrap();
    let late = b.forum.add_comment(c1.id.into(), new_comment("late")).await.unwrap();
    let late_top = b.forum.add_comment(t.id.into(), new_comment("late top")).await.unwrap();
    assert!(b.docs.delete_tree(EntityId::Thread(t.id), &doomed).await.unwrap());
    for c in [c1.id, late.id, late_top.id] {
        assert_eq!(b.docs.fetch_comment(c).await.unwrap(), None);
    }

    let t = b.forum.create_thread(new_thread("alice", "t2")).await.unwrap();
    let root = b.forum.add_comment(t.id.into(), new_comment("root")).await.unwrap();
    let doomed = descendants(&*b.docs, &root.child_refs).await.unwrap();
    assert!(doomed.is_empty());
    let late = b.forum.add_comment(root.id.into(), new_comment("late")).await.unwrap();
    assert!(b
        .docs
        .delete_tree(EntityId::Comment(root.id), &doomed)
        .await
        .unwrap());
    assert_eq!(b.docs.fetch_comment(late.id).await.unwrap(), None);
    let stored = b.docs.fetch_thread(t.id).await.unwrap().unwrap();
    assert!(stored.comment_refs.is_empty());
}
store_contract!(replies_linked_during_a_delete_go_with_it);

async fn missing_parents_are_refused(b: Backend) {
    b.directory.register("bob").await;
    let orphan = new_comment("orphan").into_comment(CommentId(Uuid::new_v4()));
    for parent in [
        EntityId::Thread(ThreadId::stub()),
        EntityId::Comment(CommentId::stub()),
    ] {
        assert!(!b.docs.insert_comment(parent, &orphan).await.unwrap());
        assert!(!b.docs.delete_tree(parent, &[]).await.unwrap());
    }
    assert_eq!(b.docs.fetch_comment(orphan.id).await.unwrap(), None);
}
store_contract!(missing_parents_are_refused);

/// `ghost` is never registered, so everything done in their name is refused
const USERS: [&str; 6] = ["alice", "bob", "carol", "dana", "eve", "ghost"];

fn user(i: u8) -> Username {
    Username::from(USERS[usize::from(i) % USERS.len()])
}

#[derive(Clone, Debug, TypeGenerator)]
enum ForumOp {
    CreateThread { author: u8 },
    Comment { parent: u8, on_comment: bool, author: u8 },
    Vote { target: u8, on_comment: bool, voter: u8, up: bool },
    DeleteThread { thread: u8 },
    DeleteComment { comment: u8 },
    List { sort: u8 },
    Show { thread: u8 },
    Feed { seed: u8, depth: u8 },
}

/// Ids are random, so results are compared through the names given at creation
#[derive(Default)]
struct Names {
    threads: Vec<ThreadId>,
    comments: Vec<CommentId>,
    names: HashMap<Uuid, String>,
}

impl Names {
    fn thread(&self, i: u8) -> ThreadId {
        match self.threads.len() {
            0 => ThreadId::stub(),
            n => self.threads[usize::from(i) % n],
        }
    }

    fn comment(&self, i: u8) -> CommentId {
        match self.comments.len() {
            0 => CommentId::stub(),
            n => self.comments[usize::from(i) % n],
        }
    }

    fn name(&self, id: Uuid) -> String {
        self.names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| String::from("unknown"))
    }

    fn render(&self, nodes: &[CommentNode]) -> String {
        nodes
            .iter()
            .map(|n| match n {
                CommentNode::Loaded(c) => {
                    format!("{}{:?}[{}]", c.content, c.counts, self.render(&c.children))
                }
                CommentNode::Missing { id } => format!("missing {}", self.name(id.0)),
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, PartialEq)]
enum Seen {
    Name(String),
    Vote(VoteOutcome),
    Ranking(Vec<(String, VoteCounts)>),
    Tree(String),
    Feed(Vec<String>),
    Failed(Discriminant<ApiError>),
}

fn failed(err: agora_core::Error) -> Seen {
    match err.api() {
        Some(api) => Seen::Failed(std::mem::discriminant(api)),
        None => panic!("store failed: {err:?}"),
    }
}

async fn apply(b: &Backend, names: &mut Names, step: usize, op: &ForumOp) -> Seen {
    match *op {
        ForumOp::CreateThread { author } => {
            let data = NewThread {
                author: user(author),
                title: format!("t{step}"),
                content: String::from("content"),
            };
            match b.forum.create_thread(data).await {
                Ok(t) => {
                    names.threads.push(t.id);
                    names.names.insert(t.id.0, t.title.clone());
                    Seen::Name(t.title)
                }
                Err(e) => failed(e),
            }
        }
        ForumOp::Comment {
            parent,
            on_comment,
            author,
        } => {
            let parent = match on_comment {
                true => EntityId::Comment(names.comment(parent)),
                false => EntityId::Thread(names.thread(parent)),
            };
            let data = NewComment {
                author: user(author),
                content: format!("c{step}"),
            };
            match b.forum.add_comment(parent, data).await {
                Ok(c) => {
                    names.comments.push(c.id);
                    names.names.insert(c.id.0, c.content.clone());
                    Seen::Name(c.content)
                }
                Err(e) => failed(e),
            }
        }
        ForumOp::Vote {
            target,
            on_comment,
            voter,
            up,
        } => {
            let target = match on_comment {
                true => EntityId::Comment(names.comment(target)),
                false => EntityId::Thread(names.thread(target)),
            };
            let direction = match up {
                true => VoteDirection::Up,
                false => VoteDirection::Down,
            };
            match b.forum.apply_vote(target, &user(voter), direction).await {
                Ok(outcome) => Seen::Vote(outcome),
                Err(e) => failed(e),
            }
        }
        ForumOp::DeleteThread { thread } => match b.forum.delete_thread(names.thread(thread)).await
        {
            Ok(t) => Seen::Name(t.title),
            Err(e) => failed(e),
        },
        ForumOp::DeleteComment { comment } => {
            match b.forum.delete_comment(names.comment(comment)).await {
                Ok(c) => Seen::Name(c.content),
                Err(e) => failed(e),
            }
        }
        ForumOp::List { sort } => {
            let modes = [SortMode::Default, SortMode::Upvotes, SortMode::Rate];
            match b.forum.list_threads(modes[usize::from(sort) % 3]).await {
                Ok(ranked) => {
                    Seen::Ranking(ranked.into_iter().map(|r| (r.title, r.counts)).collect())
                }
                Err(e) => failed(e),
            }
        }
        ForumOp::Show { thread } => match b.forum.get_thread(names.thread(thread)).await {
            Ok(view) => Seen::Tree(format!("{}: {}", view.title, names.render(&view.comments))),
            Err(e) => failed(e),
        },
        ForumOp::Feed { seed, depth } => {
            match b.forum.get_feed(&user(seed), i64::from(depth % 4)).await {
                Ok(threads) => Seen::Feed(threads.into_iter().map(|t| t.title).collect()),
                Err(e) => failed(e),
            }
        }
    }
}

async fn populate(directory: &dyn Directory) {
    for (a, b) in [("alice", "bob"), ("bob", "carol"), ("carol", "dana")] {
        directory.befriend(a, b).await;
    }
    directory.register("eve").await;
}

do_sqlx_test!(
    postgres_matches_mock,
    bolero::generator::gen_with::<Vec<ForumOp>>().len(1..24usize),
    |pool: sqlx::PgPool, ops: Vec<ForumOp>| async move {
        let mock = Arc::new(MockStore::new());
        let mock = Backend::new(mock.clone(), mock);
        let pg = Backend::new(Arc::new(PostgresStore::new(pool.clone())), Arc::new(pool));
        populate(&*mock.directory).await;
        populate(&*pg.directory).await;

        let (mut mock_names, mut pg_names) = (Names::default(), Names::default());
        for (step, op) in ops.iter().enumerate() {
            let expected = apply(&mock, &mut mock_names, step, op).await;
            let got = apply(&pg, &mut pg_names, step, op).await;
            assert_eq!(got, expected, "diverged on step {step}: {op:?}");
        }
    }
);
