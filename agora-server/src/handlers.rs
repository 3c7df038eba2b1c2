use agora_api::{
    Comment, CommentId, ContentUpdate, NewComment, NewThread, RankedView, Thread, ThreadId,
    ThreadView, Username, Uuid, VoteDirection, VoteOutcome, VoteRequest,
};
use agora_core::Forum;
use axum::{
    extract::{Path, State},
    Json,
};

use crate::{extractors::*, Error};

pub async fn create_thread(
    State(forum): State<Forum>,
    Json(data): Json<NewThread>,
) -> Result<Json<Thread>, Error> {
    Ok(Json(forum.create_thread(data).await?))
}

pub async fn list_threads(
    State(forum): State<Forum>,
    Sort(mode): Sort,
) -> Result<Json<Vec<RankedView>>, Error> {
    Ok(Json(forum.list_threads(mode).await?))
}

pub async fn get_thread(
    State(forum): State<Forum>,
    Path(id): Path<Uuid>,
) -> Result<Json<ThreadView>, Error> {
    Ok(Json(forum.get_thread(ThreadId(id)).await?))
}

pub async fn update_thread(
    State(forum): State<Forum>,
    Path(id): Path<Uuid>,
    Json(data): Json<ContentUpdate>,
) -> Result<Json<Thread>, Error> {
    Ok(Json(forum.update_thread_content(ThreadId(id), data).await?))
}

pub async fn delete_thread(
    State(forum): State<Forum>,
    Path(id): Path<Uuid>,
) -> Result<Json<Thread>, Error> {
    Ok(Json(forum.delete_thread(ThreadId(id)).await?))
}

pub async fn comment_thread(
    State(forum): State<Forum>,
    Path(id): Path<Uuid>,
    Json(data): Json<NewComment>,
) -> Result<Json<Comment>, Error> {
    Ok(Json(forum.add_comment(ThreadId(id).into(), data).await?))
}

pub async fn reply_comment(
    State(forum): State<Forum>,
    Path(id): Path<Uuid>,
    Json(data): Json<NewComment>,
) -> Result<Json<Comment>, Error> {
    Ok(Json(forum.add_comment(CommentId(id).into(), data).await?))
}

pub async fn update_comment(
    State(forum): State<Forum>,
    Path(id): Path<Uuid>,
    Json(data): Json<ContentUpdate>,
) -> Result<Json<Comment>, Error> {
    Ok(Json(forum.update_comment_content(CommentId(id), data).await?))
}

pub async fn delete_comment(
    State(forum): State<Forum>,
    Path(id): Path<Uuid>,
) -> Result<Json<Comment>, Error> {
    Ok(Json(forum.delete_comment(CommentId(id)).await?))
}

async fn vote(
    forum: &Forum,
    id: agora_api::EntityId,
    data: VoteRequest,
    direction: VoteDirection,
) -> Result<Json<VoteOutcome>, Error> {
    data.validate()?;
    Ok(Json(forum.apply_vote(id, &data.username, direction).await?))
}

pub async fn upvote_thread(
    State(forum): State<Forum>,
    Path(id): Path<Uuid>,
    Json(data): Json<VoteRequest>,
) -> Result<Json<VoteOutcome>, Error> {
    vote(&forum, ThreadId(id).into(), data, VoteDirection::Up).await
}

pub async fn downvote_thread(
    State(forum): State<Forum>,
    Path(id): Path<Uuid>,
    Json(data): Json<VoteRequest>,
) -> Result<Json<VoteOutcome>, Error> {
    vote(&forum, ThreadId(id).into(), data, VoteDirection::Down).await
}

pub async fn upvote_comment(
    State(forum): State<Forum>,
    Path(id): Path<Uuid>,
    Json(data): Json<VoteRequest>,
) -> Result<Json<VoteOutcome>, Error> {
    vote(&forum, CommentId(id).into(), data, VoteDirection::Up).await
}

pub async fn downvote_comment(
    State(forum): State<Forum>,
    Path(id): Path<Uuid>,
    Json(data): Json<VoteRequest>,
) -> Result<Json<VoteOutcome>, Error> {
    vote(&forum, CommentId(id).into(), data, VoteDirection::Down).await
}

pub async fn feed(
    State(forum): State<Forum>,
    Path(seed): Path<String>,
    Depth(depth): Depth,
) -> Result<Json<Vec<Thread>>, Error> {
    Ok(Json(
        forum
            .get_feed(&Username(seed), depth.hops().into())
            .await?,
    ))
}
