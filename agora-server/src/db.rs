use std::collections::{BTreeSet, HashSet};

use agora_api::{
    CasOutcome, Comment, CommentId, DocumentStore, EntityId, GraphStore, Thread, ThreadId,
    Username, Uuid, Version, Versioned, Votes,
};
use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgRow, Row};

/// PostgreSQL-backed document and graph store
#[derive(Clone)]
pub struct PostgresStore {
    pool: sqlx::PgPool,
}

impl PostgresStore {
    pub fn new(pool: sqlx::PgPool) -> PostgresStore {
        PostgresStore { pool }
    }
}

/// Table, reference-list column and key of `id`
fn location(id: EntityId) -> (&'static str, &'static str, Uuid) {
    match id {
        EntityId::Thread(ThreadId(t)) => ("threads", "comment_refs", t),
        EntityId::Comment(CommentId(c)) => ("comments", "child_refs", c),
    }
}

fn voters(set: &BTreeSet<Username>) -> Vec<String> {
    set.iter().map(|u| u.0.clone()).collect()
}

fn votes_from_row(row: &PgRow) -> anyhow::Result<Votes> {
    let set = |column: &str| -> anyhow::Result<BTreeSet<Username>> {
        Ok(row
            .try_get::<Vec<String>, _>(column)
            .with_context(|| format!("retrieving the {column} field"))?
            .into_iter()
            .map(Username)
            .collect())
    };
    Votes::from_sets(set("upvotes")?, set("downvotes")?)
}

fn refs_from_row(row: &PgRow, column: &str) -> anyhow::Result<Vec<CommentId>> {
    Ok(row
        .try_get::<Vec<Uuid>, _>(column)
        .with_context(|| format!("retrieving the {column} field"))?
        .into_iter()
        .map(CommentId)
        .collect())
}

fn thread_from_row(row: PgRow) -> anyhow::Result<Thread> {
    Ok(Thread {
        id: ThreadId(row.try_get("id").context("retrieving the id field")?),
        author: Username(row.try_get("author").context("retrieving the author field")?),
        title: row.try_get("title").context("retrieving the title field")?,
        content: row
            .try_get("content")
            .context("retrieving the content field")?,
        comment_refs: refs_from_row(&row, "comment_refs")?,
        votes: votes_from_row(&row)?,
    })
}

fn comment_from_row(row: PgRow) -> anyhow::Result<Comment> {
    Ok(Comment {
        id: CommentId(row.try_get("id").context("retrieving the id field")?),
        author: Username(row.try_get("author").context("retrieving the author field")?),
        content: row
            .try_get("content")
            .context("retrieving the content field")?,
        child_refs: refs_from_row(&row, "child_refs")?,
        votes: votes_from_row(&row)?,
    })
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn user_exists(&self, user: &Username) -> anyhow::Result<bool> {
        sqlx::query("SELECT EXISTS (SELECT 1 FROM users WHERE name = $1)")
            .bind(&user.0)
            .fetch_one(&self.pool)
            .await
            .context("querying users table")?
            .try_get(0)
            .context("retrieving existence flag")
    }

    async fn insert_thread(&self, thread: &Thread) -> anyhow::Result<()> {
        sqlx::query(
            "
                INSERT INTO threads (id, author, title, content, comment_refs, upvotes, downvotes)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(thread.id.0)
        .bind(&thread.author.0)
        .bind(&thread.title)
        .bind(&thread.content)
        .bind(thread.comment_refs.iter().map(|c| c.0).collect::<Vec<_>>())
        .bind(voters(thread.votes.upvoters()))
        .bind(voters(thread.votes.downvoters()))
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting thread {:?}", thread.id))?;
        Ok(())
    }

    async fn fetch_thread(&self, id: ThreadId) -> anyhow::Result<Option<Thread>> {
        sqlx::query(
            "
                SELECT id, author, title, content, comment_refs, upvotes, downvotes
                    FROM threads
                WHERE id = $1
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .context("querying threads table")?
        .map(thread_from_row)
        .transpose()
    }

    async fn fetch_threads(&self) -> anyhow::Result<Vec<Thread>> {
        sqlx::query(
            "
                SELECT id, author, title, content, comment_refs, upvotes, downvotes
                    FROM threads
                ORDER BY seq
            ",
        )
        .fetch_all(&self.pool)
        .await
        .context("querying threads table")?
        .into_iter()
        .map(thread_from_row)
        .collect()
    }

    async fn fetch_threads_by_authors(&self, authors: &[Username]) -> anyhow::Result<Vec<Thread>> {
        sqlx::query(
            "
                SELECT id, author, title, content, comment_refs, upvotes, downvotes
                    FROM threads
                WHERE author = ANY($1)
                ORDER BY seq
            ",
        )
        .bind(authors.iter().map(|a| a.0.clone()).collect::<Vec<_>>())
        .fetch_all(&self.pool)
        .await
        .context("querying threads table by author")?
        .into_iter()
        .map(thread_from_row)
        .collect()
    }

    async fn insert_comment(&self, parent: EntityId, comment: &Comment) -> anyhow::Result<bool> {
        let (table, refs, parent_id) = location(parent);
        let mut tx = self.pool.begin().await.context("starting transaction")?;
        let linked = sqlx::query(&format!(
            "UPDATE {table} SET {refs} = array_append({refs}, $2) WHERE id = $1"
        ))
        .bind(parent_id)
        .bind(comment.id.0)
        .execute(&mut tx)
        .await
        .with_context(|| format!("linking comment {:?} into {parent:?}", comment.id))?
        .rows_affected();
        if linked == 0 {
            tx.rollback().await.context("rolling back transaction")?;
            return Ok(false);
        }
        sqlx::query(
            "
                INSERT INTO comments (id, author, content, child_refs, upvotes, downvotes)
                VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(comment.id.0)
        .bind(&comment.author.0)
        .bind(&comment.content)
        .bind(comment.child_refs.iter().map(|c| c.0).collect::<Vec<_>>())
        .bind(voters(comment.votes.upvoters()))
        .bind(voters(comment.votes.downvoters()))
        .execute(&mut tx)
        .await
        .with_context(|| format!("inserting comment {:?}", comment.id))?;
        tx.commit().await.context("committing transaction")?;
        Ok(true)
    }

    async fn fetch_comment(&self, id: CommentId) -> anyhow::Result<Option<Comment>> {
        sqlx::query(
            "
                SELECT id, author, content, child_refs, upvotes, downvotes
                    FROM comments
                WHERE id = $1
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .context("querying comments table")?
        .map(comment_from_row)
        .transpose()
    }

    async fn set_content(&self, id: EntityId, content: &str) -> anyhow::Result<bool> {
        let (table, _, key) = location(id);
        let res = sqlx::query(&format!("UPDATE {table} SET content = $2 WHERE id = $1"))
            .bind(key)
            .bind(content)
            .execute(&self.pool)
            .await
            .with_context(|| format!("updating content of {id:?}"))?;
        Ok(res.rows_affected() > 0)
    }

    async fn fetch_votes(&self, id: EntityId) -> anyhow::Result<Option<Versioned<Votes>>> {
        let (table, _, key) = location(id);
        let row = sqlx::query(&format!(
            "SELECT version, upvotes, downvotes FROM {table} WHERE id = $1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("querying votes of {id:?}"))?;
        let row = match row {
            None => return Ok(None),
            Some(row) => row,
        };
        let version = row
            .try_get::<i64, _>("version")
            .context("retrieving the version field")?;
        Ok(Some(Versioned {
            version: Version::try_from(version).context("negative version in database")?,
            value: votes_from_row(&row)?,
        }))
    }

    async fn store_votes(
        &self,
        id: EntityId,
        expected: Version,
        votes: &Votes,
    ) -> anyhow::Result<CasOutcome> {
        let (table, _, key) = location(id);
        let expected = i64::try_from(expected).context("version does not fit in a BIGINT")?;
        let res = sqlx::query(&format!(
            "
                UPDATE {table}
                    SET upvotes = $3, downvotes = $4, version = version + 1
                WHERE id = $1
                AND version = $2
            "
        ))
        .bind(key)
        .bind(expected)
        .bind(voters(votes.upvoters()))
        .bind(voters(votes.downvoters()))
        .execute(&self.pool)
        .await
        .with_context(|| format!("storing votes of {id:?}"))?;
        if res.rows_affected() > 0 {
            return Ok(CasOutcome::Committed);
        }
        let exists: bool = sqlx::query(&format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE id = $1)"))
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("checking whether {id:?} exists"))?
            .try_get(0)
            .context("retrieving existence flag")?;
        Ok(match exists {
            true => CasOutcome::Conflict,
            false => CasOutcome::Missing,
        })
    }

    async fn delete_tree(&self, root: EntityId, descendants: &[CommentId]) -> anyhow::Result<bool> {
        let (table, refs, key) = location(root);
        let mut tx = self.pool.begin().await.context("starting transaction")?;
        let row = sqlx::query(&format!("SELECT {refs} FROM {table} WHERE id = $1 FOR UPDATE"))
            .bind(key)
            .fetch_optional(&mut tx)
            .await
            .with_context(|| format!("locking {root:?}"))?;
        let top = match row {
            None => {
                tx.rollback().await.context("rolling back transaction")?;
                return Ok(false);
            }
            Some(row) => refs_from_row(&row, refs)?
                .into_iter()
                .map(|c| c.0)
                .collect::<Vec<_>>(),
        };

        // Replies may have been linked since `descendants` was resolved. Lock
        // the subtree until it stops growing, after which nothing can be
        // linked below it before commit.
        let mut locked = HashSet::from([key]);
        loop {
            let subtree = sqlx::query(
                "
                    WITH RECURSIVE subtree (id) AS (
                            SELECT unnest($1::UUID[])
                        UNION
                            SELECT child.id
                                FROM subtree
                            JOIN comments c ON c.id = subtree.id
                            CROSS JOIN LATERAL unnest(c.child_refs) AS child (id)
                    )
                    SELECT id FROM subtree
                ",
            )
            .bind(&top)
            .fetch_all(&mut tx)
            .await
            .with_context(|| format!("resolving the subtree of {root:?}"))?;
            let mut fresh = Vec::new();
            for row in subtree {
                let id: Uuid = row.try_get("id").context("retrieving the id field")?;
                if !locked.contains(&id) {
                    fresh.push(id);
                }
            }
            if fresh.is_empty() {
                break;
            }
            sqlx::query("SELECT id FROM comments WHERE id = ANY($1) FOR UPDATE")
                .bind(&fresh)
                .fetch_all(&mut tx)
                .await
                .with_context(|| format!("locking {} comments below {root:?}", fresh.len()))?;
            locked.extend(fresh);
        }

        sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
            .bind(key)
            .execute(&mut tx)
            .await
            .with_context(|| format!("deleting {root:?}"))?;
        if let EntityId::Comment(_) = root {
            for (table, refs) in [("threads", "comment_refs"), ("comments", "child_refs")] {
                sqlx::query(&format!(
                    "UPDATE {table} SET {refs} = array_remove({refs}, $1) WHERE $1 = ANY({refs})"
                ))
                .bind(key)
                .execute(&mut tx)
                .await
                .with_context(|| format!("unlinking {root:?} from {table}"))?;
            }
        }
        let doomed = locked
            .into_iter()
            .chain(descendants.iter().map(|c| c.0))
            .collect::<Vec<_>>();
        sqlx::query("DELETE FROM comments WHERE id = ANY($1)")
            .bind(&doomed)
            .execute(&mut tx)
            .await
            .with_context(|| format!("deleting the {} descendants of {root:?}", doomed.len()))?;
        tx.commit().await.context("committing transaction")?;
        Ok(true)
    }
}

#[async_trait]
impl GraphStore for PostgresStore {
    async fn reachable(
        &self,
        seed: &Username,
        max_hops: u32,
    ) -> anyhow::Result<Option<HashSet<Username>>> {
        // Each step expands the whole frontier at once and only keeps names
        // not seen yet, so the recursion stops as soon as the component is
        // exhausted even for very large hop limits.
        let row = sqlx::query(
            "
                WITH RECURSIVE reach (frontier, seen, hops) AS (
                        SELECT ARRAY[$1::VARCHAR], ARRAY[$1::VARCHAR], 0::BIGINT
                    UNION ALL
                        SELECT next.names, reach.seen || next.names, reach.hops + 1
                            FROM reach
                        CROSS JOIN LATERAL (
                            SELECT array_agg(DISTINCT f.b) AS names
                                FROM friendships f
                            WHERE f.a = ANY(reach.frontier)
                            AND NOT f.b = ANY(reach.seen)
                        ) next
                        WHERE reach.hops < $2
                        AND next.names IS NOT NULL
                )
                SELECT
                    EXISTS (SELECT 1 FROM users WHERE name = $1) AS known,
                    (SELECT seen FROM reach ORDER BY hops DESC LIMIT 1) AS seen
            ",
        )
        .bind(&seed.0)
        .bind(i64::from(max_hops))
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("traversing friendships of {seed}"))?;

        let known: bool = row.try_get("known").context("retrieving the known field")?;
        if !known {
            return Ok(None);
        }
        let seen: Option<Vec<String>> = row.try_get("seen").context("retrieving the seen field")?;
        Ok(Some(
            seen.into_iter()
                .flatten()
                .map(Username)
                .filter(|u| u != seed)
                .collect(),
        ))
    }
}
