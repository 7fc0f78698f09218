pub mod comment;
pub mod error;
pub mod post;
pub mod registry;

pub use comment::{CommentService, CommentSubscription};
pub use error::{ErrorKind, Result, ServiceError};
pub use post::PostService;
pub use registry::SubscriptionRegistry;
