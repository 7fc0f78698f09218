use postboard_common::model::{
    Id, ModelValidationError,
    comment::{CommentText, FlatComment},
    post::Post,
    user::User,
};
use sqlx::FromRow;
use time::OffsetDateTime;

/// A post joined with its author.
#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct FullPostRecord {
    pub post_id: i64,
    pub title: String,
    pub content: String,
    pub created_at: OffsetDateTime,
    pub allow_comments: bool,
    pub user_id: i64,
    pub user_name: String,
}

/// A comment joined with its author.
#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct FullCommentRecord {
    pub comment_id: i64,
    pub post_id: i64,
    pub text: String,
    pub reply_to: Option<i64>,
    pub created_at: OffsetDateTime,
    pub user_id: i64,
    pub user_name: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct UserRecord {
    pub user_id: i64,
    pub user_name: String,
}

impl TryFrom<UserRecord> for User {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.user_id.try_into()?,
            name: value.user_name,
        })
    }
}

impl TryFrom<FullPostRecord> for Post {
    type Error = ModelValidationError;

    fn try_from(value: FullPostRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.post_id.try_into()?,
            title: value.title,
            content: value.content,
            author: User {
                id: value.user_id.try_into()?,
                name: value.user_name,
            },
            created_at: value.created_at,
            allow_comments: value.allow_comments,
            comments: Vec::new(),
        })
    }
}

impl TryFrom<FullCommentRecord> for FlatComment {
    type Error = ModelValidationError;

    fn try_from(value: FullCommentRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.comment_id.try_into()?,
            post_id: value.post_id.try_into()?,
            text: CommentText::new(value.text)?,
            author: User {
                id: value.user_id.try_into()?,
                name: value.user_name,
            },
            reply_to: value.reply_to.map(Id::try_from).transpose()?,
            created_at: value.created_at,
        })
    }
}
