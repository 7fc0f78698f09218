use async_trait::async_trait;
use postboard_common::model::{
    Id, ModelValidationError,
    comment::{CommentMarker, FlatComment, NewComment},
    page::Page,
    post::{CreatePost, Post, PostMarker},
    user::UserMarker,
};
use thiserror::Error;

pub type Result<T, E = StorageError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("User with id {0} was not found.")]
    UserNotFound(Id<UserMarker>),
    #[error("Post with id {0} was not found.")]
    PostNotFound(Id<PostMarker>),
    #[error("Comment with id {0} was not found.")]
    CommentNotFound(Id<CommentMarker>),
    #[error("Comment with id {comment} to reply to was not found in post {post}.")]
    ReplyTargetNotFound {
        comment: Id<CommentMarker>,
        post: Id<PostMarker>,
    },
    #[error("Comments are disabled for post {0}.")]
    CommentsDisabled(Id<PostMarker>),
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Persistence operations shared by the in-memory and the PostgreSQL backend.
///
/// Listings are ordered newest first, ties broken by the higher id, before the
/// page is applied.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Stores a post with a fresh id. Fails if the author does not exist.
    async fn create_post(&self, post: &CreatePost) -> Result<Post>;

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>>;

    async fn fetch_posts(&self, page: Page) -> Result<Vec<Post>>;

    /// Stores a comment with a fresh id after checking the author, the post, its
    /// comment flag and the reply target. Nothing is written if a check fails.
    async fn create_comment(&self, comment: &NewComment) -> Result<FlatComment>;

    async fn fetch_comments(&self, page: Page) -> Result<Vec<FlatComment>>;

    /// Every comment of a post, replies included, in no particular order.
    async fn fetch_post_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<FlatComment>>;

    /// Direct replies to a comment, or `None` if the comment does not exist.
    async fn fetch_replies(
        &self,
        comment_id: Id<CommentMarker>,
        page: Page,
    ) -> Result<Option<Vec<FlatComment>>>;
}
