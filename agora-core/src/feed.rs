use anyhow::Context;

use crate::{
    api::{DocumentStore, FeedDepth, GraphStore, Thread, Username},
    Error,
};

/// Threads authored by anyone within `depth` friendship hops of `seed`
///
/// `depth` is checked before any store is contacted. The graph store is asked
/// for the whole reachable set at once, then the document store for the
/// threads of that set in a single query. No ordering is applied beyond the
/// document store's.
pub async fn assemble_feed(
    graph: &dyn GraphStore,
    docs: &dyn DocumentStore,
    seed: &Username,
    depth: i64,
) -> Result<Vec<Thread>, Error> {
    let depth = FeedDepth::new(depth)?;

    let mut reachable = graph
        .reachable(seed, depth.hops())
        .await
        .with_context(|| format!("expanding friends of {seed} up to {} hops", depth.hops()))?
        .ok_or_else(|| Error::user_not_found(seed.clone()))?;
    // a user's own threads are never part of their feed, even through a cycle
    reachable.remove(seed);
    if reachable.is_empty() {
        tracing::debug!(%seed, hops = depth.hops(), "no friends in range, feed is empty");
        return Ok(Vec::new());
    }

    let mut authors = reachable.into_iter().collect::<Vec<_>>();
    authors.sort();
    let threads = docs
        .fetch_threads_by_authors(&authors)
        .await
        .with_context(|| format!("fetching threads of the {} friends of {seed}", authors.len()))?;
    tracing::debug!(
        %seed,
        hops = depth.hops(),
        authors = authors.len(),
        threads = threads.len(),
        "assembled feed"
    );
    Ok(threads)
}
