pub mod comment;
pub mod page;
pub mod post;
pub mod user;

use crate::model::comment::CommentTooLongError;
use derive_where::derive_where;
use serde::{Deserialize, Serialize};
use std::{cmp::Reverse, fmt::Display, marker::PhantomData};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    CommentText(#[from] CommentTooLongError),
    #[error("Identifier {0} is out of range")]
    IdOutOfRange(i64),
}

/// Per-entity counter value. The marker keeps ids of different entity kinds apart.
#[derive_where(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Debug,
    Default,
    Hash,
    Serialize,
    Deserialize
)]
#[serde(transparent)]
pub struct Id<Marker>(u64, #[serde(skip)] PhantomData<Marker>);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(value: u64) -> Self {
        Self(value, PhantomData)
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    /// Next id in the counter sequence.
    #[must_use]
    pub fn next(self) -> Self {
        Self::new(self.0 + 1)
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> From<u64> for Id<Marker> {
    fn from(value: u64) -> Self {
        Id::new(value)
    }
}

impl<Marker> From<Id<Marker>> for u64 {
    fn from(value: Id<Marker>) -> Self {
        value.get()
    }
}

impl<Marker> TryFrom<i64> for Id<Marker> {
    type Error = ModelValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u64::try_from(value)
            .map(Id::new)
            .map_err(|_| ModelValidationError::IdOutOfRange(value))
    }
}

/// Sort key placing the newest entity first, ties broken by the higher id.
#[must_use]
pub fn newest_first<Marker>(
    created_at: OffsetDateTime,
    id: Id<Marker>,
) -> Reverse<(OffsetDateTime, Id<Marker>)> {
    Reverse((created_at, id))
}
