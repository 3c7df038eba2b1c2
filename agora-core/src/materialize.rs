use std::collections::HashSet;

use anyhow::Context;
use futures::{stream, StreamExt, TryStreamExt};

use crate::{
    api::{Comment, CommentId, CommentNode, CommentView, DocumentStore},
    Error,
};

/// Maximum number of comment fetches in flight while materializing one level
const FETCH_CONCURRENCY: usize = 16;

/// Resolve a forest of comment references into fully populated trees
///
/// The forest is walked level by level: all references of one depth are
/// fetched concurrently, then the next level is made of their children in
/// order. The output keeps the order of `roots` and of every child list.
///
/// A reference whose comment does not exist becomes `CommentNode::Missing`.
/// Any id met twice during one call fails the whole call with
/// `CycleDetected`, as storage does not guarantee the references form a forest.
pub async fn materialize(
    docs: &dyn DocumentStore,
    roots: &[CommentId],
) -> Result<Vec<CommentNode>, Error> {
    let mut visited = HashSet::new();
    let mut levels: Vec<Vec<(CommentId, Option<Comment>)>> = Vec::new();
    let mut frontier = roots.to_vec();

    while !frontier.is_empty() {
        for id in &frontier {
            if !visited.insert(*id) {
                tracing::error!(
                    comment = ?id,
                    "comment referenced twice while materializing, stored comments do not form a forest"
                );
                return Err(Error::cycle_detected(*id));
            }
        }

        let fetched: Vec<Option<Comment>> = stream::iter(frontier.iter().copied())
            .map(|id| async move {
                docs.fetch_comment(id)
                    .await
                    .with_context(|| format!("fetching comment {id:?}"))
            })
            .buffered(FETCH_CONCURRENCY)
            .try_collect()
            .await?;

        let next = fetched
            .iter()
            .flatten()
            .flat_map(|c| c.child_refs.iter().copied())
            .collect();
        levels.push(frontier.into_iter().zip(fetched).collect());
        frontier = next;
    }

    // Assemble bottom-up: the nodes of the level below are, in order, the
    // children of the loaded comments of the current level.
    let mut below: Vec<CommentNode> = Vec::new();
    for level in levels.into_iter().rev() {
        let mut children = below.into_iter();
        below = level
            .into_iter()
            .map(|(id, comment)| match comment {
                None => {
                    tracing::warn!(comment = ?id, "dangling comment reference");
                    CommentNode::Missing { id }
                }
                Some(c) => CommentNode::Loaded(CommentView {
                    id,
                    counts: c.votes.counts(),
                    children: children.by_ref().take(c.child_refs.len()).collect(),
                    author: c.author,
                    content: c.content,
                }),
            })
            .collect();
    }
    Ok(below)
}

#[cfg(test)]
mod tests {
    use agora_mock_server::MockStore;

    use super::*;
    use crate::api::{Error as ApiError, Username, Uuid, Votes};

    fn comment(store: &MockStore, content: &str, children: &[CommentId]) -> CommentId {
        let id = CommentId(Uuid::new_v4());
        store.insert_raw_comment(Comment {
            id,
            author: Username::from("alice"),
            content: String::from(content),
            child_refs: children.to_vec(),
            votes: Votes::new(),
        });
        id
    }

    /// (content, children) skeleton of a materialized forest
    #[derive(Debug, PartialEq)]
    enum Shape {
        Node(String, Vec<Shape>),
        Missing,
    }

    fn shape(nodes: &[CommentNode]) -> Vec<Shape> {
        nodes
            .iter()
            .map(|n| match n {
                CommentNode::Loaded(c) => Shape::Node(c.content.clone(), shape(&c.children)),
                CommentNode::Missing { .. } => Shape::Missing,
            })
            .collect()
    }

    fn node(content: &str, children: Vec<Shape>) -> Shape {
        Shape::Node(String::from(content), children)
    }

    #[tokio::test]
    async fn acyclic_forest_is_isomorphic_to_storage() {
        let store = MockStore::new();
        let a1 = comment(&store, "a1", &[]);
        let a2 = comment(&store, "a2", &[]);
        let a3 = comment(&store, "a3", &[]);
        let a = comment(&store, "a", &[a1, a2, a3]);
        let b2 = comment(&store, "b2", &[]);
        let b1 = comment(&store, "b1", &[b2]);
        let b = comment(&store, "b", &[b1]);
        let c = comment(&store, "c", &[]);

        let forest = materialize(&store, &[a, b, c]).await.unwrap();
        assert_eq!(
            shape(&forest),
            vec![
                node("a", vec![node("a1", vec![]), node("a2", vec![]), node("a3", vec![])]),
                node("b", vec![node("b1", vec![node("b2", vec![])])]),
                node("c", vec![]),
            ]
        );
        assert_eq!(forest[0].id(), a);
        assert_eq!(
            forest[1].loaded().unwrap().children[0].loaded().unwrap().author,
            Username::from("alice")
        );
    }

    #[tokio::test]
    async fn empty_forest() {
        let store = MockStore::new();
        assert_eq!(materialize(&store, &[]).await.unwrap(), Vec::new());
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn dangling_reference_becomes_placeholder() {
        let store = MockStore::new();
        let gone = CommentId(Uuid::new_v4());
        let leaf = comment(&store, "leaf", &[]);
        let root = comment(&store, "root", &[gone, leaf]);

        let forest = materialize(&store, &[root]).await.unwrap();
        assert_eq!(
            shape(&forest),
            vec![node("root", vec![Shape::Missing, node("leaf", vec![])])]
        );
        let root = forest[0].loaded().unwrap();
        assert_eq!(root.children[0], CommentNode::Missing { id: gone });
    }

    #[tokio::test]
    async fn cycle_is_reported() {
        let store = MockStore::new();
        let a = CommentId(Uuid::new_v4());
        let b = comment(&store, "b", &[a]);
        store.insert_raw_comment(Comment {
            id: a,
            author: Username::from("alice"),
            content: String::from("a"),
            child_refs: vec![b],
            votes: Votes::new(),
        });

        let err = materialize(&store, &[a]).await.unwrap_err();
        assert_eq!(err.api(), Some(&ApiError::CycleDetected(a)));
    }

    #[tokio::test]
    async fn self_reference_is_reported() {
        let store = MockStore::new();
        let a = CommentId(Uuid::new_v4());
        store.insert_raw_comment(Comment {
            id: a,
            author: Username::from("alice"),
            content: String::from("a"),
            child_refs: vec![a],
            votes: Votes::new(),
        });
        let err = materialize(&store, &[a]).await.unwrap_err();
        assert_eq!(err.api(), Some(&ApiError::CycleDetected(a)));
    }

    #[tokio::test]
    async fn shared_child_is_reported() {
        let store = MockStore::new();
        let shared = comment(&store, "shared", &[]);
        let a = comment(&store, "a", &[shared]);
        let b = comment(&store, "b", &[shared]);
        let err = materialize(&store, &[a, b]).await.unwrap_err();
        assert_eq!(err.api(), Some(&ApiError::CycleDetected(shared)));
    }

    #[tokio::test]
    async fn store_failure_fails_the_call() {
        let store = MockStore::new();
        let a = comment(&store, "a", &[]);
        store.set_unreachable(true);
        let err = materialize(&store, &[a]).await.unwrap_err();
        assert!(err.is_dependency_failure());
    }
}
