use crate::{
    error::{Result, ServiceError},
    registry::SubscriptionRegistry,
};
use futures::Stream;
use postboard_common::model::{
    Id,
    comment::{Comment, CommentMarker, CreateComment, NewComment},
    page::Page,
    post::PostMarker,
};
use postboard_db::Storage;
use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tracing::debug;

pub const DEFAULT_SUBSCRIPTION_BUFFER: usize = 16;

pub struct CommentService {
    storage: Arc<dyn Storage>,
    registry: Arc<SubscriptionRegistry>,
    subscription_buffer: usize,
}

impl CommentService {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, registry: Arc<SubscriptionRegistry>) -> Self {
        Self {
            storage,
            registry,
            subscription_buffer: DEFAULT_SUBSCRIPTION_BUFFER,
        }
    }

    /// Capacity of each subscriber's queue. Zero is raised to one.
    #[must_use]
    pub fn with_subscription_buffer(mut self, capacity: usize) -> Self {
        self.subscription_buffer = capacity.max(1);
        self
    }

    /// Validates and stores a comment, then offers it to the post's subscribers.
    pub async fn create_comment(&self, input: CreateComment) -> Result<Comment> {
        let comment = NewComment::try_from(input)?;
        let stored = self.storage.create_comment(&comment).await?;

        let comment = Comment::from(stored);
        let delivered = self.registry.publish(comment.post_id, &comment);
        debug!(comment_id = %comment.id, post_id = %comment.post_id, delivered, "Created comment");

        Ok(comment)
    }

    pub async fn list_comments(&self, page: Page) -> Result<Vec<Comment>> {
        let comments = self.storage.fetch_comments(page).await?;
        Ok(comments.into_iter().map(Comment::from).collect())
    }

    pub async fn get_replies(
        &self,
        comment_id: Id<CommentMarker>,
        page: Page,
    ) -> Result<Vec<Comment>> {
        let replies = self
            .storage
            .fetch_replies(comment_id, page)
            .await?
            .ok_or(ServiceError::CommentNotFound(comment_id))?;

        Ok(replies.into_iter().map(Comment::from).collect())
    }

    /// Starts receiving comments created on `post_id` from now on.
    #[must_use]
    pub fn subscribe_comments(&self, post_id: Id<PostMarker>) -> CommentSubscription {
        let (sink, receiver) = mpsc::channel(self.subscription_buffer);
        self.registry.subscribe(post_id, sink.clone());

        CommentSubscription {
            post_id,
            sink,
            receiver,
            registry: Arc::clone(&self.registry),
        }
    }

    /// Ends a subscription. Dropping it has the same effect.
    pub fn unsubscribe_comments(&self, subscription: CommentSubscription) {
        drop(subscription);
    }
}

/// Live feed of comments on one post. Unsubscribes when dropped.
#[derive(Debug)]
pub struct CommentSubscription {
    post_id: Id<PostMarker>,
    sink: Sender<Comment>,
    receiver: Receiver<Comment>,
    registry: Arc<SubscriptionRegistry>,
}

impl CommentSubscription {
    #[must_use]
    pub fn post_id(&self) -> Id<PostMarker> {
        self.post_id
    }

    /// Waits for the next comment.
    pub async fn recv(&mut self) -> Option<Comment> {
        self.receiver.recv().await
    }

    /// Next comment if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Comment> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for CommentSubscription {
    type Item = Comment;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for CommentSubscription {
    fn drop(&mut self) {
        self.registry.unsubscribe(self.post_id, &self.sink);
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        comment::CommentService,
        error::{ErrorKind, ServiceError},
        registry::SubscriptionRegistry,
    };
    use async_trait::async_trait;
    use futures::StreamExt;
    use postboard_common::model::{
        Id, ModelValidationError,
        comment::{COMMENT_TEXT_MAX_LEN, CommentMarker, CreateComment, FlatComment, NewComment},
        page::Page,
        post::{CreatePost, Post, PostMarker},
    };
    use postboard_db::{MemoryStore, Storage, StorageError};
    use std::{sync::Arc, time::Duration};

    const ALL: Page = Page {
        limit: usize::MAX,
        offset: 0,
    };

    struct Setup {
        store: Arc<MemoryStore>,
        registry: Arc<SubscriptionRegistry>,
        service: CommentService,
        open_post: Id<PostMarker>,
        closed_post: Id<PostMarker>,
    }

    async fn setup() -> Setup {
        let store = Arc::new(MemoryStore::default());
        let registry = Arc::new(SubscriptionRegistry::new());
        let service = CommentService::new(store.clone(), Arc::clone(&registry));

        let mut post = CreatePost {
            title: "Title".to_owned(),
            content: "Content".to_owned(),
            author: Id::new(1),
            allow_comments: true,
        };
        let open_post = store.create_post(&post).await.unwrap().id;
        post.allow_comments = false;
        let closed_post = store.create_post(&post).await.unwrap().id;

        Setup {
            store,
            registry,
            service,
            open_post,
            closed_post,
        }
    }

    fn create_comment(post: Id<PostMarker>, text: String) -> CreateComment {
        CreateComment {
            text,
            author: Id::new(3),
            post,
            reply_to: None,
        }
    }

    #[tokio::test]
    async fn text_length_boundary() {
        let setup = setup().await;

        let at_limit = "é".repeat(COMMENT_TEXT_MAX_LEN);
        let comment = setup
            .service
            .create_comment(create_comment(setup.open_post, at_limit))
            .await
            .unwrap();
        assert_eq!(comment.text.get().chars().count(), COMMENT_TEXT_MAX_LEN);

        let over_limit = "é".repeat(COMMENT_TEXT_MAX_LEN + 1);
        let err = setup
            .service
            .create_comment(create_comment(setup.open_post, over_limit))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(setup.store.fetch_comments(ALL).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn disabled_comments_are_not_allowed() {
        let setup = setup().await;
        let mut subscription = setup.service.subscribe_comments(setup.closed_post);

        let err = setup
            .service
            .create_comment(create_comment(setup.closed_post, "hi".to_owned()))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::CommentsDisabled(id) if id == setup.closed_post));
        assert_eq!(err.kind(), ErrorKind::NotAllowed);
        assert!(setup.store.fetch_comments(ALL).await.unwrap().is_empty());
        assert!(subscription.try_recv().is_none());
    }

    #[tokio::test]
    async fn missing_entities_are_not_found() {
        let setup = setup().await;

        let mut unknown_author = create_comment(setup.open_post, "hi".to_owned());
        unknown_author.author = Id::new(99);
        let mut unknown_parent = create_comment(setup.open_post, "hi".to_owned());
        unknown_parent.reply_to = Some(Id::new(99));

        for input in [
            unknown_author,
            create_comment(Id::new(99), "hi".to_owned()),
            unknown_parent,
        ] {
            let err = setup.service.create_comment(input).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotFound, "{err}");
        }

        let err = setup
            .service
            .get_replies(Id::new(99), ALL)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::CommentNotFound(_)));
    }

    #[tokio::test]
    async fn replies_are_listed_newest_first() {
        let setup = setup().await;
        let root = setup
            .service
            .create_comment(create_comment(setup.open_post, "root".to_owned()))
            .await
            .unwrap();

        let mut reply_ids = Vec::new();
        for text in ["a", "b", "c"] {
            let mut input = create_comment(setup.open_post, text.to_owned());
            input.reply_to = Some(root.id);
            let reply = setup.service.create_comment(input).await.unwrap();
            assert_eq!(reply.reply_to.map(|parent| parent.id()), Some(root.id));
            reply_ids.push(reply.id);
        }
        reply_ids.reverse();

        let replies = setup.service.get_replies(root.id, ALL).await.unwrap();
        let ids: Vec<_> = replies.iter().map(|reply| reply.id).collect();
        assert_eq!(ids, reply_ids);

        let page = setup.service.get_replies(root.id, Page::new(1, 1)).await.unwrap();
        assert_eq!(page[0].id, reply_ids[1]);
        assert!(
            setup
                .service
                .get_replies(root.id, Page::new(5, 3))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn listing_is_stable_and_newest_first() {
        let setup = setup().await;
        for index in 0..6 {
            setup
                .service
                .create_comment(create_comment(setup.open_post, format!("comment {index}")))
                .await
                .unwrap();
        }

        let first = setup.service.list_comments(Page::new(4, 1)).await.unwrap();
        let second = setup.service.list_comments(Page::new(4, 1)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
        assert!(
            first
                .windows(2)
                .all(|pair| (pair[0].created_at, pair[0].id) > (pair[1].created_at, pair[1].id))
        );
        assert!(setup.service.list_comments(Page::new(4, 6)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn subscriber_receives_each_comment_once() {
        let setup = setup().await;
        let mut subscription = setup.service.subscribe_comments(setup.open_post);
        let mut other_post = setup.service.subscribe_comments(setup.closed_post);

        let created = setup
            .service
            .create_comment(create_comment(setup.open_post, "hello".to_owned()))
            .await
            .unwrap();

        let received = tokio::time::timeout(Duration::from_secs(1), subscription.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, created);
        assert!(subscription.try_recv().is_none());
        assert!(other_post.try_recv().is_none());
    }

    #[tokio::test]
    async fn unsubscribed_listener_receives_nothing() {
        let setup = setup().await;
        let subscription = setup.service.subscribe_comments(setup.open_post);
        assert_eq!(setup.registry.subscriber_count(setup.open_post), 1);

        setup.service.unsubscribe_comments(subscription);
        assert_eq!(setup.registry.topic_count(), 0);

        let kept = setup.service.subscribe_comments(setup.open_post);
        drop(kept);
        assert_eq!(setup.registry.topic_count(), 0);

        setup
            .service
            .create_comment(create_comment(setup.open_post, "late".to_owned()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn slow_subscriber_does_not_block_creation() {
        let setup = setup().await;
        let service = setup.service.with_subscription_buffer(1);
        let mut subscription = service.subscribe_comments(setup.open_post);

        let first = service
            .create_comment(create_comment(setup.open_post, "first".to_owned()))
            .await
            .unwrap();
        service
            .create_comment(create_comment(setup.open_post, "second".to_owned()))
            .await
            .unwrap();

        assert_eq!(subscription.try_recv(), Some(first));
        assert!(subscription.try_recv().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_comments_get_contiguous_ids() {
        let setup = setup().await;
        let service = Arc::new(setup.service);

        let tasks: Vec<_> = (0..100)
            .map(|index| {
                let service = Arc::clone(&service);
                let input = create_comment(setup.open_post, format!("comment {index}"));
                tokio::spawn(async move { service.create_comment(input).await.unwrap().id.get() })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap());
        }
        ids.sort_unstable();

        assert_eq!(ids, (1..=100).collect::<Vec<u64>>());
        assert_eq!(setup.store.fetch_comments(ALL).await.unwrap().len(), 100);
    }

    struct UnavailableStorage;

    #[async_trait]
    impl Storage for UnavailableStorage {
        async fn create_post(&self, _: &CreatePost) -> postboard_db::Result<Post> {
            Err(ModelValidationError::IdOutOfRange(-1).into())
        }

        async fn fetch_post(&self, _: Id<PostMarker>) -> postboard_db::Result<Option<Post>> {
            Err(ModelValidationError::IdOutOfRange(-1).into())
        }

        async fn fetch_posts(&self, _: Page) -> postboard_db::Result<Vec<Post>> {
            Err(ModelValidationError::IdOutOfRange(-1).into())
        }

        async fn create_comment(&self, _: &NewComment) -> postboard_db::Result<FlatComment> {
            Err(ModelValidationError::IdOutOfRange(-1).into())
        }

        async fn fetch_comments(&self, _: Page) -> postboard_db::Result<Vec<FlatComment>> {
            Err(ModelValidationError::IdOutOfRange(-1).into())
        }

        async fn fetch_post_comments(
            &self,
            _: Id<PostMarker>,
        ) -> postboard_db::Result<Vec<FlatComment>> {
            Err(ModelValidationError::IdOutOfRange(-1).into())
        }

        async fn fetch_replies(
            &self,
            _: Id<CommentMarker>,
            _: Page,
        ) -> postboard_db::Result<Option<Vec<FlatComment>>> {
            Err(ModelValidationError::IdOutOfRange(-1).into())
        }
    }

    #[tokio::test]
    async fn storage_failures_surface_and_publish_nothing() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let service = CommentService::new(Arc::new(UnavailableStorage), Arc::clone(&registry));
        let mut subscription = service.subscribe_comments(Id::new(1));

        let err = service
            .create_comment(create_comment(Id::new(1), "hi".to_owned()))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
        assert!(matches!(
            err,
            ServiceError::StorageUnavailable(StorageError::Data(_))
        ));
        assert!(subscription.try_recv().is_none());
    }
}
