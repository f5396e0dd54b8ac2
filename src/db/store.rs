use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        Blog, CountryCount, InteractionUpdate, Package, Reason, Recommendation,
        RecommendationType, Target, TargetEntity, UserProfile, UserRole,
    },
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlogOrder {
    /// Most recently published first
    #[default]
    Newest,
    /// Views, then likes, descending
    Popularity,
}

/// Filter over published blogs
#[derive(Debug, Clone, Default)]
pub struct BlogQuery {
    /// Geotag must be one of these countries
    pub countries: Option<Vec<String>>,
    /// Author must be one of these users
    pub authors: Option<Vec<Uuid>>,
    pub exclude_author: Option<Uuid>,
    pub created_after: Option<DateTime<Utc>>,
    pub order: BlogOrder,
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PackageOrder {
    #[default]
    Newest,
    Bookings,
}

#[derive(Debug, Clone, Default)]
pub struct PackageQuery {
    /// Inclusive price bounds
    pub price_range: Option<(f64, f64)>,
    pub countries: Option<Vec<String>>,
    pub created_after: Option<DateTime<Utc>>,
    pub exclude_owner: Option<Uuid>,
    pub order: PackageOrder,
    pub limit: usize,
}

#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    /// Users must prefer at least one of these countries
    pub sharing_destinations: Option<Vec<String>>,
    pub role: Option<UserRole>,
    pub exclude: Vec<Uuid>,
    pub limit: usize,
}

/// Filter over stored recommendations; expired rows are never returned
#[derive(Debug, Clone)]
pub struct RecommendationQuery {
    pub user_id: Option<Uuid>,
    pub kind: Option<RecommendationType>,
    pub reason: Option<Reason>,
    pub now: DateTime<Utc>,
    pub offset: usize,
    pub limit: usize,
}

/// Abstract document store holding candidate entities and recommendations
///
/// Candidate queries are read-only. Recommendations are the only collection
/// this crate writes.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_user(&self, id: Uuid) -> AppResult<Option<UserProfile>>;

    async fn find_published_blogs(&self, query: &BlogQuery) -> AppResult<Vec<Blog>>;

    async fn find_packages(&self, query: &PackageQuery) -> AppResult<Vec<Package>>;

    async fn find_users(&self, query: &UserQuery) -> AppResult<Vec<UserProfile>>;

    /// Countries most often used as the geotag of published blogs
    async fn top_blog_countries(
        &self,
        exclude: &[String],
        limit: usize,
    ) -> AppResult<Vec<CountryCount>>;

    async fn resolve_target(&self, target: &Target) -> AppResult<Option<TargetEntity>>;

    async fn get_recommendation(&self, id: Uuid) -> AppResult<Option<Recommendation>>;

    /// Applies an interaction change to a stored recommendation as one atomic
    /// read-modify-write and returns the updated row
    async fn update_interaction(
        &self,
        id: Uuid,
        update: &InteractionUpdate,
        at: DateTime<Utc>,
    ) -> AppResult<Recommendation>;

    /// Inserts recommendations, replacing score, metadata, context and expiry
    /// of any existing row with the same user, target and reason. Interaction
    /// state, id and creation time of existing rows are kept.
    async fn upsert_recommendations(
        &self,
        recommendations: Vec<Recommendation>,
    ) -> AppResult<Vec<Recommendation>>;

    async fn delete_expired_recommendations(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<u64>;

    async fn delete_recommendations_created_before(
        &self,
        user_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> AppResult<u64>;

    /// Returns one page ordered by score, then recency, plus the total count
    async fn list_recommendations(
        &self,
        query: &RecommendationQuery,
    ) -> AppResult<(Vec<Recommendation>, u64)>;

    async fn recommendations_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Recommendation>>;
}

/// Score descending, then newest first
pub fn rank_order(a: &Recommendation, b: &Recommendation) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.created_at.cmp(&a.created_at))
}
