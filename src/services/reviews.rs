//! Product reviews and the derived product rating.

use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{EventPublisher, Repos};
use crate::domain::aggregates::review::rating_summary;
use crate::domain::aggregates::{Review, ReviewError, ReviewStatus};
use crate::domain::events::{DomainEvent, ReviewEvent};
use crate::store::StoreError;
use crate::{EcommerceError, Result};

#[derive(Clone)]
pub struct Reviews {
    repos: Repos,
    events: EventPublisher,
    moderated: bool,
}

impl Reviews {
    pub fn new(repos: Repos, events: EventPublisher, moderated: bool) -> Self { Self { repos, events, moderated } }

    /// Approved reviews of a product, newest first.
    pub async fn for_product(&self, product_id: Uuid) -> Result<Vec<Review>> {
        let mut reviews = self.repos.reviews.find(json!({ "productId": product_id, "status": "approved" })).await?;
        reviews.reverse();
        Ok(reviews)
    }

    pub async fn for_user(&self, user_id: Uuid) -> Result<Vec<Review>> {
        let mut reviews = self.repos.reviews.find(json!({ "userId": user_id })).await?;
        reviews.reverse();
        Ok(reviews)
    }

    async fn owned(&self, user_id: Uuid, review_id: Uuid) -> Result<Review> {
        self.repos.reviews.get(review_id).await?.filter(|r| r.user_id == user_id).ok_or(EcommerceError::NotFound("Review"))
    }

    /// Recomputes the product's rating over its approved reviews.
    async fn refresh_rating(&self, product_id: Uuid) -> Result<()> {
        let Some(mut product) = self.repos.products.get(product_id).await? else { return Ok(()) };
        let reviews = self.repos.reviews.find(json!({ "productId": product_id })).await?;
        let (rating, count) = rating_summary(&reviews);
        product.apply_rating(rating, count);
        self.repos.products.save(&product).await?;
        self.events.publish(product.take_events()).await;
        Ok(())
    }

    async fn changed(&self, review: &Review, action: &'static str) -> Result<()> {
        self.refresh_rating(review.product_id).await?;
        self.events.publish(vec![DomainEvent::Review(ReviewEvent { review_id: review.id, product_id: review.product_id, action })]).await;
        Ok(())
    }

    #[instrument(skip(self, comment))]
    pub async fn create(&self, user_id: Uuid, product_id: Uuid, rating: u8, comment: String) -> Result<Review> {
        if self.repos.products.get(product_id).await?.is_none() { return Err(EcommerceError::NotFound("Product")); }
        let user = self.repos.users.get(user_id).await?.ok_or(EcommerceError::NotFound("User"))?;
        if self.repos.reviews.find_one(json!({ "userId": user_id, "productId": product_id })).await?.is_some() {
            return Err(ReviewError::AlreadyReviewed.into());
        }
        let review = Review::write(user_id, user.name, product_id, rating, comment, self.moderated)?;
        match self.repos.reviews.insert(&review).await {
            Err(StoreError::Duplicate(_)) => return Err(ReviewError::AlreadyReviewed.into()),
            other => other?,
        }
        info!(review_id = %review.id, status = ?review.status, "Review created");
        self.changed(&review, "created").await?;
        Ok(review)
    }

    pub async fn update(&self, user_id: Uuid, review_id: Uuid, rating: u8, comment: String) -> Result<Review> {
        let mut review = self.owned(user_id, review_id).await?;
        review.edit(rating, comment, self.moderated)?;
        self.repos.reviews.save(&review).await?;
        self.changed(&review, "updated").await?;
        Ok(review)
    }

    pub async fn delete(&self, user_id: Uuid, review_id: Uuid) -> Result<()> {
        let review = self.owned(user_id, review_id).await?;
        self.repos.reviews.delete(review.id).await?;
        self.changed(&review, "deleted").await
    }

    #[instrument(skip(self))]
    pub async fn moderate(&self, review_id: Uuid, status: ReviewStatus) -> Result<Review> {
        let mut review = self.repos.reviews.get(review_id).await?.ok_or(EcommerceError::NotFound("Review"))?;
        review.moderate(status);
        self.repos.reviews.save(&review).await?;
        self.changed(&review, "moderated").await?;
        Ok(review)
    }
}
