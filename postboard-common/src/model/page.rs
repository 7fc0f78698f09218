use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_LIMIT: usize = 10;

/// Window into a listing sorted newest first.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(default)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

impl Page {
    #[must_use]
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }

    /// Keeps `[offset, offset + limit)` of `items`, clamped to its length.
    #[must_use]
    pub fn apply<T>(self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset)
            .take(self.limit)
            .collect()
    }

    /// `limit` and `offset` as SQL bind values.
    #[must_use]
    pub fn as_sql(self) -> (i64, i64) {
        (
            i64::try_from(self.limit).unwrap_or(i64::MAX),
            i64::try_from(self.offset).unwrap_or(i64::MAX),
        )
    }
}
