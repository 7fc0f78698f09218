use crate::server::{
    Result, ServerError, ServerRouter,
    extract::{Json, Query},
};
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use axum_extra::routing::{RouterExt, TypedPath};
use futures::{Stream, StreamExt};
use postboard_common::model::{
    Id,
    page::Page,
    post::{CreatePost, Post, PostMarker},
};
use postboard_service::{CommentService, PostService};
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(list_posts)
        .typed_post(create_post)
        .typed_get(get_post)
        .typed_get(subscribe_comments)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts", rejection(ServerError))]
struct PostsPath();

async fn list_posts(
    PostsPath(): PostsPath,
    State(posts): State<Arc<PostService>>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Post>>> {
    let posts = posts.list_posts(page).await?;

    Ok(Json(posts))
}

async fn create_post(
    PostsPath(): PostsPath,
    State(posts): State<Arc<PostService>>,
    Json(post): Json<CreatePost>,
) -> Result<Json<Post>> {
    let post = posts.create_post(post).await?;

    Ok(Json(post))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}", rejection(ServerError))]
struct GetPostPath {
    id: Id<PostMarker>,
}

async fn get_post(
    GetPostPath { id }: GetPostPath,
    State(posts): State<Arc<PostService>>,
) -> Result<Json<Post>> {
    let post = posts.get_post(id).await?;

    Ok(Json(post))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/comments/subscribe", rejection(ServerError))]
struct SubscribeCommentsPath {
    id: Id<PostMarker>,
}

/// Server-sent `comment` events until the client leaves or the server shuts down.
async fn subscribe_comments(
    SubscribeCommentsPath { id }: SubscribeCommentsPath,
    State(comments): State<Arc<CommentService>>,
    State(shutdown): State<CancellationToken>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let events = comments
        .subscribe_comments(id)
        .take_until(shutdown.cancelled_owned())
        .map(|comment| Event::default().event("comment").json_data(&comment));

    Sse::new(events).keep_alive(KeepAlive::default())
}
