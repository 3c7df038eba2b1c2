#![cfg(test)]

use std::{sync::Arc, time::Duration};

use agora_api::{
    Comment, Error as ApiError, RankedView, Thread, ThreadId, ThreadView, Username,
    VoteOutcome,
};
use agora_mock_server::MockStore;
use axum::{
    body::Body,
    http::{self, request},
};
use serde_json::json;
use tower::ServiceExt;

use crate::*;

fn test_app() -> (Arc<MockStore>, Router) {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt::try_init();
    }
    let store = Arc::new(MockStore::new());
    store.add_user("alice");
    store.add_user("bob");
    let forum = Forum::new(store.clone(), store.clone());
    (store, app(forum, Duration::from_secs(10)))
}

async fn call<Resp>(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> Result<Resp, ApiError>
where
    Resp: for<'de> serde::Deserialize<'de>,
{
    let body = match body {
        None => Body::empty(),
        Some(b) => Body::from(serde_json::to_vec(&b).expect("serializing request body")),
    };
    let req = request::Builder::new()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body)
        .expect("building request");
    let resp = app.clone().oneshot(req).await.expect("running request");
    let status = resp.status();
    let body = hyper::body::to_bytes(resp.into_body())
        .await
        .expect("recovering resp bytes");
    if status == http::StatusCode::OK {
        return Ok(serde_json::from_slice(&body).unwrap_or_else(|err| {
            panic!("failed parsing resp body of {method} {uri}: {err}, body is {body:?}")
        }));
    }
    let err = ApiError::parse(&body)
        .unwrap_or_else(|err| panic!("parsing error response body {err}, body is {body:?}"));
    assert_eq!(status, err.status_code(), "status of {err:?}");
    Err(err)
}

async fn create_thread(app: &Router, author: &str, title: &str) -> Thread {
    call(
        app,
        "POST",
        "/api/threads",
        Some(json!({ "author": author, "title": title, "content": "hello" })),
    )
    .await
    .expect("creating thread")
}

async fn comment(app: &Router, uri: &str, content: &str) -> Comment {
    call(
        app,
        "POST",
        uri,
        Some(json!({ "author": "bob", "content": content })),
    )
    .await
    .expect("adding comment")
}

#[tokio::test]
async fn thread_lifecycle() {
    let (store, app) = test_app();
    let t = create_thread(&app, "alice", "first").await;
    assert_eq!(t.author, Username::from("alice"));

    let c1 = comment(&app, &format!("/api/threads/{}/comments", t.id.0), "c1").await;
    let c2 = comment(&app, &format!("/api/comments/{}/comments", c1.id.0), "c2").await;
    comment(&app, &format!("/api/comments/{}/comments", c2.id.0), "c3").await;

    let view: ThreadView = call(&app, "GET", &format!("/api/threads/{}", t.id.0), None)
        .await
        .unwrap();
    let c1_view = view.comments[0].loaded().unwrap();
    assert_eq!(c1_view.content, "c1");
    let c2_view = c1_view.children[0].loaded().unwrap();
    assert_eq!(c2_view.children[0].loaded().unwrap().content, "c3");

    let edited: Thread = call(
        &app,
        "PUT",
        &format!("/api/threads/{}", t.id.0),
        Some(json!({ "content": "edited" })),
    )
    .await
    .unwrap();
    assert_eq!(edited.content, "edited");

    let deleted: Thread = call(&app, "DELETE", &format!("/api/threads/{}", t.id.0), None)
        .await
        .unwrap();
    assert_eq!(deleted.id, t.id);
    assert_eq!(store.num_comments(), 0);

    let err = call::<ThreadView>(&app, "GET", &format!("/api/threads/{}", t.id.0), None)
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::ThreadNotFound(t.id));
    let err = call::<Thread>(&app, "DELETE", &format!("/api/threads/{}", t.id.0), None)
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::ThreadNotFound(t.id));
}

#[tokio::test]
async fn comment_edit_and_delete() {
    let (_store, app) = test_app();
    let t = create_thread(&app, "alice", "t").await;
    let c = comment(&app, &format!("/api/threads/{}/comments", t.id.0), "c").await;

    let edited: Comment = call(
        &app,
        "PUT",
        &format!("/api/comments/{}", c.id.0),
        Some(json!({ "content": "better" })),
    )
    .await
    .unwrap();
    assert_eq!(edited.content, "better");

    let _: Comment = call(&app, "DELETE", &format!("/api/comments/{}", c.id.0), None)
        .await
        .unwrap();
    let view: ThreadView = call(&app, "GET", &format!("/api/threads/{}", t.id.0), None)
        .await
        .unwrap();
    assert!(view.comments.is_empty());

    let err = call::<Comment>(
        &app,
        "PUT",
        &format!("/api/comments/{}", c.id.0),
        Some(json!({ "content": "again" })),
    )
    .await
    .unwrap_err();
    assert_eq!(err, ApiError::CommentNotFound(c.id));
}

#[tokio::test]
async fn votes_and_ranking() {
    let (_store, app) = test_app();
    let quiet = create_thread(&app, "alice", "quiet").await;
    let loved = create_thread(&app, "alice", "loved").await;

    let uri = format!("/api/threads/{}/upvote", loved.id.0);
    let bob = Some(json!({ "username": "bob" }));
    let first: VoteOutcome = call(&app, "POST", &uri, bob.clone()).await.unwrap();
    assert_eq!(first, VoteOutcome::Applied);
    let again: VoteOutcome = call(&app, "POST", &uri, bob.clone()).await.unwrap();
    assert_eq!(again, VoteOutcome::AlreadyVoted);

    let downvote = format!("/api/threads/{}/downvote", quiet.id.0);
    let _: VoteOutcome = call(&app, "POST", &downvote, bob).await.unwrap();

    let ranked: Vec<RankedView> = call(&app, "GET", "/api/threads?sort=rate", None)
        .await
        .unwrap();
    assert_eq!(
        ranked.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![loved.id, quiet.id]
    );
    assert_eq!(ranked[1].counts.rate, -1);

    let unsorted: Vec<RankedView> = call(&app, "GET", "/api/threads", None).await.unwrap();
    assert_eq!(unsorted[0].id, quiet.id);

    let err = call::<Vec<RankedView>>(&app, "GET", "/api/threads?sort=hot", None)
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::InvalidSortMode(String::from("hot")));

    let err = call::<Vec<RankedView>>(&app, "GET", "/api/threads?sort=rate&sort=hot", None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ApiError::InvalidSortMode(String::from("sort=rate&sort=hot"))
    );

    let err = call::<VoteOutcome>(
        &app,
        "POST",
        &uri,
        Some(json!({ "username": "mallory" })),
    )
    .await
    .unwrap_err();
    assert_eq!(err, ApiError::UserNotFound(Username::from("mallory")));
}

#[tokio::test]
async fn comment_votes() {
    let (_store, app) = test_app();
    let t = create_thread(&app, "alice", "t").await;
    let c = comment(&app, &format!("/api/threads/{}/comments", t.id.0), "c").await;
    let _: VoteOutcome = call(
        &app,
        "POST",
        &format!("/api/comments/{}/downvote", c.id.0),
        Some(json!({ "username": "alice" })),
    )
    .await
    .unwrap();
    let view: ThreadView = call(&app, "GET", &format!("/api/threads/{}", t.id.0), None)
        .await
        .unwrap();
    assert_eq!(view.comments[0].loaded().unwrap().counts.downvotes, 1);
}

#[tokio::test]
async fn feed_by_depth() {
    let (store, app) = test_app();
    store.add_friendship("carol", "bob");
    store.add_friendship("bob", "dana");
    create_thread(&app, "bob", "T1").await;
    create_thread(&app, "dana", "T2").await;

    let one: Vec<Thread> = call(&app, "GET", "/api/feed/carol?depth=1", None)
        .await
        .unwrap();
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].title, "T1");
    let two: Vec<Thread> = call(&app, "GET", "/api/feed/carol?depth=2", None)
        .await
        .unwrap();
    assert_eq!(two.len(), 2);

    let calls = store.calls();
    for (query, raw) in [("depth=0", "0"), ("depth=-1", "-1"), ("depth=two", "two"), ("", "")] {
        let err = call::<Vec<Thread>>(&app, "GET", &format!("/api/feed/carol?{query}"), None)
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::InvalidDepth(String::from(raw)));
    }
    let err = call::<Vec<Thread>>(&app, "GET", "/api/feed/carol?depth=1&depth=2", None)
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::InvalidDepth(String::from("depth=1&depth=2")));
    assert_eq!(store.calls(), calls);

    let err = call::<Vec<Thread>>(&app, "GET", "/api/feed/ghost?depth=1", None)
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::UserNotFound(Username::from("ghost")));
}

#[tokio::test]
async fn validation_errors() {
    let (store, app) = test_app();
    let err = call::<Thread>(
        &app,
        "POST",
        "/api/threads",
        Some(json!({ "author": "alice", "title": "", "content": "x" })),
    )
    .await
    .unwrap_err();
    assert_eq!(err, ApiError::EmptyField(String::from("title")));

    let err = call::<Comment>(
        &app,
        "POST",
        &format!("/api/threads/{}/comments", ThreadId::stub().0),
        Some(json!({ "author": "bob", "content": "a\0b" })),
    )
    .await
    .unwrap_err();
    assert_eq!(err, ApiError::NullByteInString(String::from("a\0b")));
    assert_eq!(store.num_comments(), 0);
}

#[tokio::test]
async fn unreachable_store_is_503() {
    let (store, app) = test_app();
    let t = create_thread(&app, "alice", "t").await;
    store.set_unreachable(true);
    let err = call::<ThreadView>(&app, "GET", &format!("/api/threads/{}", t.id.0), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::DependencyFailure(_)), "got {err:?}");
}

#[tokio::test]
async fn cyclic_storage_is_500() {
    let (store, app) = test_app();
    let t = create_thread(&app, "alice", "t").await;
    let c = comment(&app, &format!("/api/threads/{}/comments", t.id.0), "c").await;
    store.insert_raw_comment(Comment {
        child_refs: vec![c.id],
        ..c.clone()
    });
    let err = call::<ThreadView>(&app, "GET", &format!("/api/threads/{}", t.id.0), None)
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::CycleDetected(c.id));
    // deletion still goes through
    let _: Thread = call(&app, "DELETE", &format!("/api/threads/{}", t.id.0), None)
        .await
        .unwrap();
    assert!(!store.contains_comment(c.id));
}
