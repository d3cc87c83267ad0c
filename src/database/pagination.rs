use crate::{MAX_RECIPE_COUNT_PER_PAGE, RECIPE_COUNT_PER_PAGE};

/// 1-based page request. Out of range values are clamped rather than
/// rejected: page < 1 reads page 1, page_size is kept within
/// 1..=MAX_RECIPE_COUNT_PER_PAGE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub page_size: i64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: RECIPE_COUNT_PER_PAGE,
        }
    }
}

impl PageRequest {
    pub fn new(page: Option<i64>, page_size: Option<i64>) -> Self {
        let default = Self::default();

        Self {
            page: page.unwrap_or(default.page).max(1),
            page_size: page_size
                .unwrap_or(default.page_size)
                .clamp(1, MAX_RECIPE_COUNT_PER_PAGE),
        }
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}
