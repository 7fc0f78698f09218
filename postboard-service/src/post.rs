use crate::error::{Result, ServiceError};
use postboard_common::{
    model::{
        Id, newest_first,
        page::Page,
        post::{CreatePost, Post, PostMarker},
    },
    thread::{MAX_THREAD_DEPTH, build_forest, cut_at_depth},
};
use postboard_db::Storage;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct PostService {
    storage: Arc<dyn Storage>,
}

impl PostService {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn create_post(&self, input: CreatePost) -> Result<Post> {
        let post = self.storage.create_post(&input).await?;
        debug!(post_id = %post.id, author = %post.author.id, "Created post");
        Ok(post)
    }

    /// Posts newest first, without their comments.
    pub async fn list_posts(&self, page: Page) -> Result<Vec<Post>> {
        Ok(self.storage.fetch_posts(page).await?)
    }

    /// A post with its thread: root comments newest first, replies nested below
    /// them in the same order. Replies deeper than [`MAX_THREAD_DEPTH`] are left
    /// out and can be read with `CommentService::get_replies`.
    pub async fn get_post(&self, post_id: Id<PostMarker>) -> Result<Post> {
        let mut post = self
            .storage
            .fetch_post(post_id)
            .await?
            .ok_or(ServiceError::PostNotFound(post_id))?;

        let mut rows = self.storage.fetch_post_comments(post_id).await?;
        rows.sort_by_key(|row| newest_first(row.created_at, row.id));

        let forest = build_forest(rows);
        if !forest.detached.is_empty() {
            warn!(
                %post_id,
                detached = forest.detached.len(),
                "Thread has comments without a reachable parent"
            );
        }

        let mut roots = forest.roots;
        let cut = cut_at_depth(&mut roots, MAX_THREAD_DEPTH);
        if cut > 0 {
            debug!(%post_id, cut, "Cut thread at maximum depth");
        }

        post.comments = roots;
        Ok(post)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        comment::CommentService,
        error::{ErrorKind, ServiceError},
        post::PostService,
        registry::SubscriptionRegistry,
    };
    use postboard_common::{
        model::{
            Id,
            comment::{Comment, CreateComment, ParentRef},
            page::Page,
            post::CreatePost,
        },
        thread::MAX_THREAD_DEPTH,
    };
    use postboard_db::MemoryStore;
    use std::sync::Arc;

    fn services() -> (PostService, CommentService) {
        let store = Arc::new(MemoryStore::default());
        let registry = Arc::new(SubscriptionRegistry::new());
        (
            PostService::new(store.clone()),
            CommentService::new(store, registry),
        )
    }

    fn create_post(title: &str) -> CreatePost {
        CreatePost {
            title: title.to_owned(),
            content: "Content".to_owned(),
            author: Id::new(2),
            allow_comments: true,
        }
    }

    #[tokio::test]
    async fn create_and_list_posts() {
        let (posts, _) = services();
        for title in ["first", "second", "third"] {
            posts.create_post(create_post(title)).await.unwrap();
        }

        let titles: Vec<String> = posts
            .list_posts(Page::new(2, 0))
            .await
            .unwrap()
            .into_iter()
            .map(|post| post.title)
            .collect();
        assert_eq!(titles, ["third", "second"]);

        assert!(posts.list_posts(Page::new(2, 3)).await.unwrap().is_empty());
        assert!(posts.list_posts(Page::new(2, 30)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_author_is_not_found() {
        let (posts, _) = services();
        let mut input = create_post("post");
        input.author = Id::new(50);

        let err = posts.create_post(input).await.unwrap_err();

        assert!(matches!(err, ServiceError::UserNotFound(id) if id == Id::new(50)));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn get_post_attaches_thread() {
        let (posts, comments) = services();
        let post = posts.create_post(create_post("post")).await.unwrap();
        let other = posts.create_post(create_post("other")).await.unwrap();

        let comment = |text: &str, post_id, reply_to| CreateComment {
            text: text.to_owned(),
            author: Id::new(1),
            post: post_id,
            reply_to,
        };
        let first = comments
            .create_comment(comment("first", post.id, None))
            .await
            .unwrap();
        let second = comments
            .create_comment(comment("second", post.id, None))
            .await
            .unwrap();
        let reply = comments
            .create_comment(comment("reply", post.id, Some(first.id)))
            .await
            .unwrap();
        let nested = comments
            .create_comment(comment("nested", post.id, Some(reply.id)))
            .await
            .unwrap();
        comments
            .create_comment(comment("elsewhere", other.id, None))
            .await
            .unwrap();

        let fetched = posts.get_post(post.id).await.unwrap();

        let roots: Vec<_> = fetched.comments.iter().map(|root| root.id).collect();
        assert_eq!(roots, [second.id, first.id]);
        let first_thread = &fetched.comments[1];
        assert_eq!(first_thread.replies.len(), 1);
        assert_eq!(first_thread.replies[0].id, reply.id);
        assert_eq!(
            first_thread.replies[0].reply_to,
            Some(ParentRef::Loaded(first.id))
        );
        assert_eq!(first_thread.replies[0].replies[0].id, nested.id);

        assert_eq!(posts.get_post(other.id).await.unwrap().comments.len(), 1);
    }

    #[tokio::test]
    async fn missing_post_is_not_found() {
        let (posts, _) = services();

        let err = posts.get_post(Id::new(1)).await.unwrap_err();

        assert!(matches!(err, ServiceError::PostNotFound(_)));
    }

    #[tokio::test]
    async fn deep_reply_chain_is_served_to_the_depth_limit() {
        let (posts, comments) = services();
        let post = posts.create_post(create_post("deep")).await.unwrap();

        let mut reply_to = None;
        let mut chain = Vec::new();
        for index in 0..5_000 {
            let comment = comments
                .create_comment(CreateComment {
                    text: format!("reply {index}"),
                    author: Id::new(3),
                    post: post.id,
                    reply_to,
                })
                .await
                .unwrap();
            reply_to = Some(comment.id);
            chain.push(comment.id);
        }

        let fetched = posts.get_post(post.id).await.unwrap();
        let json = serde_json::to_vec(&fetched).unwrap();
        assert!(!json.is_empty());

        let mut depth = 1;
        let mut node: &Comment = &fetched.comments[0];
        while let Some(reply) = node.replies.first() {
            node = reply;
            depth += 1;
        }
        assert_eq!(depth, MAX_THREAD_DEPTH);
        assert_eq!(node.id, chain[MAX_THREAD_DEPTH - 1]);

        let below = comments.get_replies(node.id, Page::default()).await.unwrap();
        assert_eq!(below.len(), 1);
        assert_eq!(below[0].id, chain[MAX_THREAD_DEPTH]);

        drop(fetched);
    }
}
