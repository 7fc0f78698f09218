use crate::server::{
    Result, ServerError, ServerRouter,
    extract::{Json, Query},
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use postboard_common::model::{
    Id,
    comment::{Comment, CommentMarker, CreateComment},
    page::Page,
};
use postboard_service::CommentService;
use serde::Deserialize;
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(list_comments)
        .typed_post(create_comment)
        .typed_get(get_replies)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/comments", rejection(ServerError))]
struct CommentsPath();

async fn list_comments(
    CommentsPath(): CommentsPath,
    State(comments): State<Arc<CommentService>>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Comment>>> {
    let comments = comments.list_comments(page).await?;

    Ok(Json(comments))
}

async fn create_comment(
    CommentsPath(): CommentsPath,
    State(comments): State<Arc<CommentService>>,
    Json(comment): Json<CreateComment>,
) -> Result<Json<Comment>> {
    let comment = comments.create_comment(comment).await?;

    Ok(Json(comment))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/comments/{id}/replies", rejection(ServerError))]
struct RepliesPath {
    id: Id<CommentMarker>,
}

async fn get_replies(
    RepliesPath { id }: RepliesPath,
    State(comments): State<Arc<CommentService>>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Comment>>> {
    let replies = comments.get_replies(id, page).await?;

    Ok(Json(replies))
}
