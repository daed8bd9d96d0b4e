//! Review Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub product_id: Uuid,
    pub rating: u8,
    pub comment: String,
    pub status: ReviewStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus { Pending, #[default] Approved, Rejected }

impl Review {
    pub fn write(user_id: Uuid, user_name: String, product_id: Uuid, rating: u8, comment: String, moderated: bool) -> Result<Self, ReviewError> {
        check_rating(rating)?;
        let now = Utc::now();
        let status = if moderated { ReviewStatus::Pending } else { ReviewStatus::Approved };
        Ok(Self { id: Uuid::now_v7(), user_id, user_name, product_id, rating, comment: comment.trim().to_string(), status, created_at: now, updated_at: now })
    }

    /// Edits put a moderated review back into the queue.
    pub fn edit(&mut self, rating: u8, comment: String, moderated: bool) -> Result<(), ReviewError> {
        check_rating(rating)?;
        self.rating = rating;
        self.comment = comment.trim().to_string();
        if moderated { self.status = ReviewStatus::Pending; }
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn moderate(&mut self, status: ReviewStatus) { self.status = status; self.updated_at = Utc::now(); }
    pub fn is_approved(&self) -> bool { self.status == ReviewStatus::Approved }
}

fn check_rating(rating: u8) -> Result<(), ReviewError> {
    if (1..=5).contains(&rating) { Ok(()) } else { Err(ReviewError::InvalidRating) }
}

/// Average rating (one decimal) and count over approved reviews.
pub fn rating_summary<'a>(reviews: impl IntoIterator<Item = &'a Review>) -> (f64, u32) {
    let (sum, count) = reviews.into_iter().filter(|r| r.is_approved()).fold((0u32, 0u32), |(s, c), r| (s + r.rating as u32, c + 1));
    if count == 0 { return (0.0, 0); }
    ((sum as f64 / count as f64 * 10.0).round() / 10.0, count)
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum ReviewError { InvalidRating, AlreadyReviewed }
impl std::error::Error for ReviewError {}
impl std::fmt::Display for ReviewError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRating => write!(f, "Rating must be between 1 and 5"),
            Self::AlreadyReviewed => write!(f, "You have already reviewed this product"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_bounds() {
        assert_eq!(Review::write(Uuid::now_v7(), "A".into(), Uuid::now_v7(), 0, String::new(), false).unwrap_err(), ReviewError::InvalidRating);
        assert_eq!(Review::write(Uuid::now_v7(), "A".into(), Uuid::now_v7(), 6, String::new(), false).unwrap_err(), ReviewError::InvalidRating);
    }

    #[test]
    fn test_summary_counts_only_approved() {
        let product = Uuid::now_v7();
        let mut reviews: Vec<Review> = [5, 4, 4].iter().map(|r| Review::write(Uuid::now_v7(), "A".into(), product, *r, "ok".into(), false).unwrap()).collect();
        reviews.push(Review::write(Uuid::now_v7(), "B".into(), product, 1, "bad".into(), true).unwrap());
        assert_eq!(rating_summary(&reviews), (4.3, 3));
        reviews[0].moderate(ReviewStatus::Rejected);
        assert_eq!(rating_summary(&reviews), (4.0, 2));
        assert_eq!(rating_summary(&[]), (0.0, 0));
    }
}
