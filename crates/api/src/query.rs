//! Shared query parameter types for API handlers.

use serde::Deserialize;
use shanty_db::repositories::track_request_repo::{DEFAULT_LIMIT, MAX_LIMIT};

/// Generic pagination parameters (`?limit=&offset=`).
#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PaginationParams {
    /// `(limit, offset)` with the limit clamped to `1..=MAX_LIMIT` and the
    /// offset to non-negative values.
    pub fn resolve(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

/// Default look-ahead for `?n=`.
pub const DEFAULT_PEEK: i64 = 10;

/// Look-ahead parameters (`?n=`).
#[derive(Debug, Deserialize)]
pub struct PeekParams {
    pub n: Option<i64>,
}

impl PeekParams {
    pub fn resolve(&self) -> i64 {
        self.n.unwrap_or(DEFAULT_PEEK).clamp(1, MAX_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_clamps() {
        let p = PaginationParams {
            limit: None,
            offset: None,
        };
        assert_eq!(p.resolve(), (DEFAULT_LIMIT, 0));

        let p = PaginationParams {
            limit: Some(10_000),
            offset: Some(-5),
        };
        assert_eq!(p.resolve(), (MAX_LIMIT, 0));
    }

    #[test]
    fn peek_defaults_to_ten() {
        assert_eq!(PeekParams { n: None }.resolve(), 10);
        assert_eq!(PeekParams { n: Some(0) }.resolve(), 1);
    }
}
