use crate::{
    record::{FullCommentRecord, FullPostRecord, UserRecord},
    storage::{Result, Storage, StorageError},
};
use async_trait::async_trait;
use postboard_common::model::{
    Id,
    comment::{CommentMarker, FlatComment, NewComment},
    page::Page,
    post::{CreatePost, Post, PostMarker},
    user::{User, UserMarker},
};
use sqlx::{
    PgExecutor, PgPool,
    postgres::PgPoolOptions,
    query_as, query_scalar,
};
use time::OffsetDateTime;
use tracing::{debug, info};

pub const MAX_CONNECTIONS: u32 = 10;

/// Durable backend on PostgreSQL. Concurrency control is left to the database.
#[derive(Clone, Debug)]
pub struct DbClient {
    pool: PgPool,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(database_url)
            .await?;

        info!("Connected to database");
        Ok(Self::new(pool))
    }

    /// Applies the migrations embedded from `migrations/`.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(sqlx::Error::from)?;

        Ok(())
    }

    async fn fetch_user<'e>(
        executor: impl PgExecutor<'e>,
        user_id: Id<UserMarker>,
    ) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT
                users.id AS user_id,
                users.name AS user_name
            FROM
                users
            WHERE
                users.id = $1
            ",
        )
        .bind(user_id.get().cast_signed())
        .fetch_optional(executor)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }
}

fn into_comments(records: Vec<FullCommentRecord>) -> Result<Vec<FlatComment>> {
    let comments = records
        .into_iter()
        .map(FlatComment::try_from)
        .collect::<Result<_, _>>()?;
    Ok(comments)
}

#[async_trait]
impl Storage for DbClient {
    async fn create_post(&self, post: &CreatePost) -> Result<Post> {
        let author = Self::fetch_user(&self.pool, post.author)
            .await?
            .ok_or(StorageError::UserNotFound(post.author))?;

        let (post_id, created_at) = query_as::<_, (i64, OffsetDateTime)>(
            "
            INSERT INTO posts (title, content, allow_comments, author_id)
            VALUES ($1, $2, $3, $4)
            RETURNING posts.id, posts.created_at
            ",
        )
        .bind(&post.title)
        .bind(&post.content)
        .bind(post.allow_comments)
        .bind(post.author.get().cast_signed())
        .fetch_one(&self.pool)
        .await?;

        debug!(post_id, "Inserted post");
        Ok(Post {
            id: Id::try_from(post_id)?,
            title: post.title.clone(),
            content: post.content.clone(),
            author,
            created_at,
            allow_comments: post.allow_comments,
            comments: Vec::new(),
        })
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let record = query_as::<_, FullPostRecord>(
            "
            SELECT
                posts.id AS post_id,
                posts.title,
                posts.content,
                posts.created_at,
                posts.allow_comments,
                users.id AS user_id,
                users.name AS user_name
            FROM
                posts JOIN users ON posts.author_id = users.id
            WHERE
                posts.id = $1
            ",
        )
        .bind(post_id.get().cast_signed())
        .fetch_optional(&self.pool)
        .await?;

        let post = record.map(Post::try_from).transpose()?;
        Ok(post)
    }

    async fn fetch_posts(&self, page: Page) -> Result<Vec<Post>> {
        let (limit, offset) = page.as_sql();
        let records = query_as::<_, FullPostRecord>(
            "
            SELECT
                posts.id AS post_id,
                posts.title,
                posts.content,
                posts.created_at,
                posts.allow_comments,
                users.id AS user_id,
                users.name AS user_name
            FROM
                posts JOIN users ON posts.author_id = users.id
            ORDER BY
                posts.created_at DESC,
                posts.id DESC
            LIMIT $1 OFFSET $2
            ",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let posts = records
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<_, _>>()?;
        Ok(posts)
    }

    async fn create_comment(&self, comment: &NewComment) -> Result<FlatComment> {
        let post_id = comment.post.get().cast_signed();
        let mut transaction = self.pool.begin().await?;

        let author = Self::fetch_user(&mut *transaction, comment.author)
            .await?
            .ok_or(StorageError::UserNotFound(comment.author))?;

        let allow_comments = query_scalar::<_, bool>(
            "
            SELECT
                posts.allow_comments
            FROM
                posts
            WHERE
                posts.id = $1
            FOR SHARE
            ",
        )
        .bind(post_id)
        .fetch_optional(&mut *transaction)
        .await?
        .ok_or(StorageError::PostNotFound(comment.post))?;
        if !allow_comments {
            return Err(StorageError::CommentsDisabled(comment.post));
        }

        if let Some(parent_id) = comment.reply_to {
            let parent_post = query_scalar::<_, i64>(
                "
                SELECT
                    comments.post_id
                FROM
                    comments
                WHERE
                    comments.id = $1
                ",
            )
            .bind(parent_id.get().cast_signed())
            .fetch_optional(&mut *transaction)
            .await?;

            if parent_post != Some(post_id) {
                return Err(StorageError::ReplyTargetNotFound {
                    comment: parent_id,
                    post: comment.post,
                });
            }
        }

        let (comment_id, created_at) = query_as::<_, (i64, OffsetDateTime)>(
            "
            INSERT INTO comments (post_id, text, author_id, reply_to)
            VALUES ($1, $2, $3, $4)
            RETURNING comments.id, comments.created_at
            ",
        )
        .bind(post_id)
        .bind(comment.text.get())
        .bind(comment.author.get().cast_signed())
        .bind(comment.reply_to.map(|parent| parent.get().cast_signed()))
        .fetch_one(&mut *transaction)
        .await?;

        transaction.commit().await?;

        debug!(comment_id, post_id, "Inserted comment");
        Ok(FlatComment {
            id: Id::try_from(comment_id)?,
            post_id: comment.post,
            text: comment.text.clone(),
            author,
            reply_to: comment.reply_to,
            created_at,
        })
    }

    async fn fetch_comments(&self, page: Page) -> Result<Vec<FlatComment>> {
        let (limit, offset) = page.as_sql();
        let records = query_as::<_, FullCommentRecord>(
            "
            SELECT
                comments.id AS comment_id,
                comments.post_id,
                comments.text,
                comments.reply_to,
                comments.created_at,
                users.id AS user_id,
                users.name AS user_name
            FROM
                comments JOIN users ON comments.author_id = users.id
            ORDER BY
                comments.created_at DESC,
                comments.id DESC
            LIMIT $1 OFFSET $2
            ",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        into_comments(records)
    }

    async fn fetch_post_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<FlatComment>> {
        let records = query_as::<_, FullCommentRecord>(
            "
            SELECT
                comments.id AS comment_id,
                comments.post_id,
                comments.text,
                comments.reply_to,
                comments.created_at,
                users.id AS user_id,
                users.name AS user_name
            FROM
                comments JOIN users ON comments.author_id = users.id
            WHERE
                comments.post_id = $1
            ",
        )
        .bind(post_id.get().cast_signed())
        .fetch_all(&self.pool)
        .await?;

        into_comments(records)
    }

    async fn fetch_replies(
        &self,
        comment_id: Id<CommentMarker>,
        page: Page,
    ) -> Result<Option<Vec<FlatComment>>> {
        let comment_id = comment_id.get().cast_signed();
        let exists = query_scalar::<_, bool>(
            "
            SELECT EXISTS (
                SELECT 1 FROM comments WHERE comments.id = $1
            )
            ",
        )
        .bind(comment_id)
        .fetch_one(&self.pool)
        .await?;
        if !exists {
            return Ok(None);
        }

        let (limit, offset) = page.as_sql();
        let records = query_as::<_, FullCommentRecord>(
            "
            SELECT
                comments.id AS comment_id,
                comments.post_id,
                comments.text,
                comments.reply_to,
                comments.created_at,
                users.id AS user_id,
                users.name AS user_name
            FROM
                comments JOIN users ON comments.author_id = users.id
            WHERE
                comments.reply_to = $1
            ORDER BY
                comments.created_at DESC,
                comments.id DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(comment_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        into_comments(records).map(Some)
    }
}
