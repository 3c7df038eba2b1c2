use std::collections::HashSet;

use anyhow::Context;
use futures::{stream, StreamExt, TryStreamExt};

use crate::{
    api::{CommentId, DocumentStore},
    Error,
};

const FETCH_CONCURRENCY: usize = 16;

/// Every stored comment reachable from `refs`, `refs` included, parents before children
///
/// Unlike materialization this tolerates ids seen twice, so that a corrupted
/// tree can still be deleted.
pub async fn descendants(
    docs: &dyn DocumentStore,
    refs: &[CommentId],
) -> Result<Vec<CommentId>, Error> {
    let mut seen = HashSet::new();
    let mut res = Vec::new();
    let mut frontier = Vec::new();
    for id in refs {
        if seen.insert(*id) {
            frontier.push(*id);
        }
    }

    while !frontier.is_empty() {
        let fetched: Vec<_> = stream::iter(frontier.iter().copied())
            .map(|id| async move {
                docs.fetch_comment(id)
                    .await
                    .with_context(|| format!("fetching comment {id:?} to delete"))
            })
            .buffered(FETCH_CONCURRENCY)
            .try_collect()
            .await?;

        let mut next = Vec::new();
        for comment in fetched.into_iter().flatten() {
            res.push(comment.id);
            for child in comment.child_refs {
                if seen.insert(child) {
                    next.push(child);
                } else {
                    tracing::warn!(comment = ?child, "comment referenced twice, deleting it once");
                }
            }
        }
        frontier = next;
    }
    Ok(res)
}
