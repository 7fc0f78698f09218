//! Volatile storage backend.
//!
//! Each entity kind lives in its own [`Table`] behind its own reader/writer lock.
//! Operations needing more than one table take the locks in the fixed order
//! users, posts, comments, and release a lock used only for validation before
//! taking the next one. No lock is held across an `.await`.

use crate::storage::{Result, Storage, StorageError};
use async_trait::async_trait;
use parking_lot::RwLock;
use postboard_common::model::{
    Id, newest_first,
    comment::{CommentMarker, FlatComment, NewComment},
    page::Page,
    post::{CreatePost, Post, PostMarker},
    user::{User, UserMarker},
};
use std::collections::HashMap;
use time::OffsetDateTime;
use tracing::debug;

/// Rows of one entity kind together with the counter issuing their ids.
#[derive(Debug)]
struct Table<Marker, Row> {
    rows: HashMap<Id<Marker>, Row>,
    last_id: Id<Marker>,
}

impl<Marker, Row> Default for Table<Marker, Row> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
            last_id: Id::new(0),
        }
    }
}

impl<Marker, Row> Table<Marker, Row> {
    fn get(&self, id: Id<Marker>) -> Option<&Row> {
        self.rows.get(&id)
    }

    /// Allocates the next id and stores the row built for it. Needs the write lock.
    fn insert_next(&mut self, build: impl FnOnce(Id<Marker>) -> Row) -> &Row {
        self.last_id = self.last_id.next();
        let id = self.last_id;
        self.rows.entry(id).or_insert_with(|| build(id))
    }

    fn insert(&mut self, id: Id<Marker>, row: Row) {
        self.last_id = self.last_id.max(id);
        self.rows.insert(id, row);
    }
}

#[derive(Debug)]
pub struct MemoryStore {
    users: RwLock<Table<UserMarker, User>>,
    posts: RwLock<Table<PostMarker, Post>>,
    comments: RwLock<Table<CommentMarker, FlatComment>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_users([
            User::new(1, "alice"),
            User::new(2, "bob"),
            User::new(3, "carol"),
        ])
    }
}

impl MemoryStore {
    /// Empty store knowing only `users`.
    #[must_use]
    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let mut user_table = Table::default();
        for user in users {
            user_table.insert(user.id, user);
        }

        Self {
            users: RwLock::new(user_table),
            posts: RwLock::default(),
            comments: RwLock::default(),
        }
    }

    fn user(&self, user_id: Id<UserMarker>) -> Result<User> {
        self.users
            .read()
            .get(user_id)
            .cloned()
            .ok_or(StorageError::UserNotFound(user_id))
    }

    fn insert_post(&self, post: &CreatePost) -> Result<Post> {
        let author = self.user(post.author)?;

        let mut posts = self.posts.write();
        let stored = posts.insert_next(|id| Post {
            id,
            title: post.title.clone(),
            content: post.content.clone(),
            author,
            created_at: OffsetDateTime::now_utc(),
            allow_comments: post.allow_comments,
            comments: Vec::new(),
        });

        debug!(post_id = %stored.id, "Stored post");
        Ok(stored.clone())
    }

    fn insert_comment(&self, comment: &NewComment) -> Result<FlatComment> {
        let author = self.user(comment.author)?;

        let allow_comments = self
            .posts
            .read()
            .get(comment.post)
            .map(|post| post.allow_comments)
            .ok_or(StorageError::PostNotFound(comment.post))?;
        if !allow_comments {
            return Err(StorageError::CommentsDisabled(comment.post));
        }

        let mut comments = self.comments.write();
        if let Some(parent_id) = comment.reply_to {
            let parent_in_post = comments
                .get(parent_id)
                .is_some_and(|parent| parent.post_id == comment.post);
            if !parent_in_post {
                return Err(StorageError::ReplyTargetNotFound {
                    comment: parent_id,
                    post: comment.post,
                });
            }
        }

        let stored = comments.insert_next(|id| FlatComment {
            id,
            post_id: comment.post,
            text: comment.text.clone(),
            author,
            reply_to: comment.reply_to,
            created_at: OffsetDateTime::now_utc(),
        });

        debug!(comment_id = %stored.id, post_id = %stored.post_id, "Stored comment");
        Ok(stored.clone())
    }

    fn collect_comments(&self, filter: impl Fn(&FlatComment) -> bool) -> Vec<FlatComment> {
        let mut comments: Vec<FlatComment> = self
            .comments
            .read()
            .rows
            .values()
            .filter(|comment| filter(comment))
            .cloned()
            .collect();
        comments.sort_by_key(|comment| newest_first(comment.created_at, comment.id));
        comments
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn create_post(&self, post: &CreatePost) -> Result<Post> {
        self.insert_post(post)
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        Ok(self.posts.read().get(post_id).cloned())
    }

    async fn fetch_posts(&self, page: Page) -> Result<Vec<Post>> {
        let mut posts: Vec<Post> = self.posts.read().rows.values().cloned().collect();
        posts.sort_by_key(|post| newest_first(post.created_at, post.id));

        Ok(page.apply(posts))
    }

    async fn create_comment(&self, comment: &NewComment) -> Result<FlatComment> {
        self.insert_comment(comment)
    }

    async fn fetch_comments(&self, page: Page) -> Result<Vec<FlatComment>> {
        Ok(page.apply(self.collect_comments(|_| true)))
    }

    async fn fetch_post_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<FlatComment>> {
        Ok(self.collect_comments(|comment| comment.post_id == post_id))
    }

    async fn fetch_replies(
        &self,
        comment_id: Id<CommentMarker>,
        page: Page,
    ) -> Result<Option<Vec<FlatComment>>> {
        if self.comments.read().get(comment_id).is_none() {
            return Ok(None);
        }

        let replies = self.collect_comments(|comment| comment.reply_to == Some(comment_id));
        Ok(Some(page.apply(replies)))
    }
}
