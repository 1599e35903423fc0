use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

/// Common `?page=&limit=` query parameters for list endpoints.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageParams {
    /// Clamp to sane bounds: page >= 1, 1 <= limit <= 100.
    pub fn clamped(&self) -> (i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        (page, limit)
    }

    pub fn offset(&self) -> i64 {
        let (page, limit) = self.clamped();
        (page - 1) * limit
    }
}

/// Standard list response body.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, params: &PageParams) -> Self {
        let (page, limit) = params.clamped();
        Self {
            items,
            total,
            page,
            limit,
        }
    }
}

/// Pick a sort column from a whitelist; anything else falls back to the
/// default. Sort directions other than "asc" sort descending.
pub fn sort_clause(requested: &str, allowed: &[&str], default: &str, order: &str) -> String {
    let column = if allowed.contains(&requested) {
        requested
    } else {
        default
    };
    let direction = if order.eq_ignore_ascii_case("asc") {
        "ASC"
    } else {
        "DESC"
    };
    format!("{} {}", column, direction)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_page_and_limit() {
        let params = PageParams {
            page: Some(0),
            limit: Some(5000),
        };
        assert_eq!(params.clamped(), (1, MAX_LIMIT));
        assert_eq!(params.offset(), 0);

        let params = PageParams {
            page: Some(3),
            limit: Some(25),
        };
        assert_eq!(params.clamped(), (3, 25));
        assert_eq!(params.offset(), 50);
    }

    #[test]
    fn defaults_apply_when_absent() {
        let params = PageParams {
            page: None,
            limit: None,
        };
        assert_eq!(params.clamped(), (1, DEFAULT_LIMIT));
    }

    #[test]
    fn sort_clause_rejects_unlisted_columns() {
        let allowed = &["created_at", "email", "last_login"];
        assert_eq!(
            sort_clause("email", allowed, "created_at", "asc"),
            "email ASC"
        );
        // Unknown columns (including injection attempts) fall back.
        assert_eq!(
            sort_clause("email; DROP TABLE users", allowed, "created_at", "desc"),
            "created_at DESC"
        );
        assert_eq!(
            sort_clause("created_at", allowed, "created_at", "sideways"),
            "created_at DESC"
        );
    }
}
