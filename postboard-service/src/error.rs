use postboard_common::model::{
    Id,
    comment::{CommentMarker, CommentTooLongError},
    post::PostMarker,
    user::UserMarker,
};
use postboard_db::StorageError;
use thiserror::Error;

pub type Result<T, E = ServiceError> = std::result::Result<T, E>;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    NotAllowed,
    StorageUnavailable,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    CommentTooLong(#[from] CommentTooLongError),
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
    #[error("Storage is unavailable: {0}")]
    StorageUnavailable(#[source] StorageError),
}

impl ServiceError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::CommentTooLong(_) => ErrorKind::Validation,
            ServiceError::UserNotFound(_)
            | ServiceError::PostNotFound(_)
            | ServiceError::CommentNotFound(_)
            | ServiceError::ReplyTargetNotFound { .. } => ErrorKind::NotFound,
            ServiceError::CommentsDisabled(_) => ErrorKind::NotAllowed,
            ServiceError::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::UserNotFound(id) => ServiceError::UserNotFound(id),
            StorageError::PostNotFound(id) => ServiceError::PostNotFound(id),
            StorageError::CommentNotFound(id) => ServiceError::CommentNotFound(id),
            StorageError::ReplyTargetNotFound { comment, post } => {
                ServiceError::ReplyTargetNotFound { comment, post }
            }
            StorageError::CommentsDisabled(id) => ServiceError::CommentsDisabled(id),
            err @ (StorageError::Data(_) | StorageError::Sqlx(_)) => {
                ServiceError::StorageUnavailable(err)
            }
        }
    }
}
