//! Review types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use marketstall_core::{ProductId, ReviewId, UserId};

/// A product review.
#[derive(Debug, Clone, Serialize)]
pub struct Review {
    pub id: ReviewId,
    pub product_id: ProductId,
    pub user_id: UserId,
    pub author_name: String,
    pub rating: i16,
    pub title: String,
    pub body: String,
    pub verified_purchase: bool,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /api/products/{slug}/reviews`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewReview {
    pub rating: i16,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

impl NewReview {
    /// Whether the rating is within 1..=5.
    #[must_use]
    pub const fn has_valid_rating(&self) -> bool {
        self.rating >= 1 && self.rating <= 5
    }
}
