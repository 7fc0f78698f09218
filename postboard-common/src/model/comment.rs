use crate::model::{
    Id,
    post::PostMarker,
    user::{User, UserMarker},
};
use serde::{Deserialize, Deserializer, Serialize, de::Error};
use thiserror::Error;
use time::OffsetDateTime;

pub const COMMENT_TEXT_MAX_LEN: usize = 2000;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct CommentMarker;

/// Comment body, at most [`COMMENT_TEXT_MAX_LEN`] characters.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct CommentText(String);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Comment text has {0} characters, at most {COMMENT_TEXT_MAX_LEN} are allowed")]
pub struct CommentTooLongError(pub usize);

impl CommentText {
    pub fn new(text: String) -> Result<Self, CommentTooLongError> {
        let len = text.chars().count();
        if len <= COMMENT_TEXT_MAX_LEN {
            Ok(CommentText(text))
        } else {
            Err(CommentTooLongError(len))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<'de> Deserialize<'de> for CommentText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        CommentText::new(inner).map_err(|err| {
            Error::invalid_length(err.0, &"at most 2000 characters of comment text")
        })
    }
}

/// Parent of a reply as seen from one read result.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Deserialize, Serialize)]
#[serde(tag = "state", content = "id", rename_all = "snake_case")]
pub enum ParentRef {
    /// The parent is part of the same result and holds this comment in its replies.
    Loaded(Id<CommentMarker>),
    /// The parent exists but was not loaded alongside this comment.
    Stub(Id<CommentMarker>),
}

impl ParentRef {
    #[must_use]
    pub fn id(self) -> Id<CommentMarker> {
        match self {
            ParentRef::Loaded(id) | ParentRef::Stub(id) => id,
        }
    }

    #[must_use]
    pub fn is_stub(self) -> bool {
        matches!(self, ParentRef::Stub(_))
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Comment {
    pub id: Id<CommentMarker>,
    pub post_id: Id<PostMarker>,
    pub text: CommentText,
    pub author: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ParentRef>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<Comment>,
}

impl Drop for Comment {
    /// Unlinks the reply tree onto a heap stack so deep threads drop without
    /// recursing.
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.replies);
        while let Some(mut reply) = pending.pop() {
            pending.append(&mut reply.replies);
        }
    }
}

/// A stored comment row, replies not attached.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct FlatComment {
    pub id: Id<CommentMarker>,
    pub post_id: Id<PostMarker>,
    pub text: CommentText,
    pub author: User,
    pub reply_to: Option<Id<CommentMarker>>,
    pub created_at: OffsetDateTime,
}

impl From<FlatComment> for Comment {
    /// Standalone read: the parent, if any, is a stub.
    fn from(value: FlatComment) -> Self {
        Self {
            id: value.id,
            post_id: value.post_id,
            text: value.text,
            author: value.author,
            reply_to: value.reply_to.map(ParentRef::Stub),
            created_at: value.created_at,
            replies: Vec::new(),
        }
    }
}

/// Comment request as received from a caller, text not yet validated.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct CreateComment {
    pub text: String,
    pub author: Id<UserMarker>,
    pub post: Id<PostMarker>,
    #[serde(default)]
    pub reply_to: Option<Id<CommentMarker>>,
}

/// Validated comment ready to be stored.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct NewComment {
    pub text: CommentText,
    pub author: Id<UserMarker>,
    pub post: Id<PostMarker>,
    pub reply_to: Option<Id<CommentMarker>>,
}

impl TryFrom<CreateComment> for NewComment {
    type Error = CommentTooLongError;

    fn try_from(value: CreateComment) -> Result<Self, Self::Error> {
        Ok(Self {
            text: CommentText::new(value.text)?,
            author: value.author,
            post: value.post,
            reply_to: value.reply_to,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::model::comment::{COMMENT_TEXT_MAX_LEN, CommentText, CommentTooLongError, ParentRef};
    use crate::model::Id;

    #[test]
    fn text_length_counts_characters() {
        let at_limit = "ж".repeat(COMMENT_TEXT_MAX_LEN);
        assert!(at_limit.len() > COMMENT_TEXT_MAX_LEN);
        assert!(CommentText::new(at_limit).is_ok());

        let over_limit = "a".repeat(COMMENT_TEXT_MAX_LEN + 1);
        assert_eq!(
            CommentText::new(over_limit),
            Err(CommentTooLongError(COMMENT_TEXT_MAX_LEN + 1))
        );
    }

    #[test]
    fn text_deserialization_is_validated() {
        let too_long = format!("\"{}\"", "a".repeat(COMMENT_TEXT_MAX_LEN + 1));
        assert!(serde_json::from_str::<CommentText>(&too_long).is_err());
        assert_eq!(
            serde_json::from_str::<CommentText>("\"hello\"").unwrap().get(),
            "hello"
        );
    }

    #[test]
    fn parent_ref_serialization() {
        let stub = ParentRef::Stub(Id::new(4));
        assert_eq!(
            serde_json::to_string(&stub).unwrap(),
            r#"{"state":"stub","id":4}"#
        );
        assert!(stub.is_stub());
        assert_eq!(stub.id(), Id::new(4));
    }
}
