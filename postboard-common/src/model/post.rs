use crate::model::{
    Id,
    comment::Comment,
    user::{User, UserMarker},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub title: String,
    pub content: String,
    pub author: User,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub allow_comments: bool,
    /// Root comments of the thread. Only filled in when a single post is read.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Comment>,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct CreatePost {
    pub title: String,
    pub content: String,
    pub author: Id<UserMarker>,
    #[serde(default = "allow_comments_default")]
    pub allow_comments: bool,
}

fn allow_comments_default() -> bool {
    true
}
