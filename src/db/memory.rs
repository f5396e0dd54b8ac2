use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    cmp::Reverse,
    collections::HashMap,
    sync::Arc,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::store::{
    rank_order, BlogOrder, BlogQuery, DocumentStore, PackageOrder, PackageQuery,
    RecommendationQuery, UserQuery,
};
use crate::{
    error::{AppError, AppResult},
    models::{
        Blog, CountryCount, Destination, InteractionUpdate, Package, Recommendation, Target,
        TargetEntity, TravelerSummary, TripPlan, UserProfile,
    },
};

#[derive(Default)]
struct Collections {
    users: HashMap<Uuid, UserProfile>,
    blogs: HashMap<Uuid, Blog>,
    packages: HashMap<Uuid, Package>,
    destinations: HashMap<String, Destination>,
    trip_plans: HashMap<Uuid, TripPlan>,
    recommendations: HashMap<Uuid, Recommendation>,
}

/// Document store kept in process memory
///
/// Used for local runs without Postgres and as the store behind tests.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Collections>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: UserProfile) {
        self.inner.write().await.users.insert(user.id, user);
    }

    pub async fn insert_blog(&self, blog: Blog) {
        self.inner.write().await.blogs.insert(blog.id, blog);
    }

    pub async fn insert_package(&self, package: Package) {
        self.inner.write().await.packages.insert(package.id, package);
    }

    pub async fn insert_destination(&self, destination: Destination) {
        self.inner
            .write()
            .await
            .destinations
            .insert(destination.code.clone(), destination);
    }

    pub async fn insert_trip_plan(&self, plan: TripPlan) {
        self.inner.write().await.trip_plans.insert(plan.id, plan);
    }

    /// Stores a recommendation as is, bypassing upsert semantics
    pub async fn insert_recommendation(&self, recommendation: Recommendation) {
        self.inner
            .write()
            .await
            .recommendations
            .insert(recommendation.id, recommendation);
    }

    pub async fn recommendation_count(&self) -> usize {
        self.inner.read().await.recommendations.len()
    }
}

fn destination_or_code(destinations: &HashMap<String, Destination>, code: &str) -> Destination {
    destinations.get(code).cloned().unwrap_or_else(|| Destination {
        code: code.to_string(),
        name: code.to_string(),
    })
}

fn matches_recommendation(rec: &Recommendation, query: &RecommendationQuery) -> bool {
    !rec.is_expired(query.now)
        && query.user_id.map_or(true, |user| rec.user_id == user)
        && query.kind.map_or(true, |kind| rec.kind() == kind)
        && query.reason.map_or(true, |reason| rec.reason == reason)
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get_user(&self, id: Uuid) -> AppResult<Option<UserProfile>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn find_published_blogs(&self, query: &BlogQuery) -> AppResult<Vec<Blog>> {
        let data = self.inner.read().await;
        let mut blogs: Vec<Blog> = data
            .blogs
            .values()
            .filter(|blog| blog.published)
            .filter(|blog| match &query.countries {
                Some(countries) => blog
                    .country
                    .as_ref()
                    .map_or(false, |country| countries.contains(country)),
                None => true,
            })
            .filter(|blog| {
                query
                    .authors
                    .as_ref()
                    .map_or(true, |authors| authors.contains(&blog.author_id))
            })
            .filter(|blog| query.exclude_author != Some(blog.author_id))
            .filter(|blog| query.created_after.map_or(true, |after| blog.created_at >= after))
            .cloned()
            .collect();

        match query.order {
            BlogOrder::Newest => blogs.sort_by_key(|blog| Reverse(blog.published_on())),
            BlogOrder::Popularity => {
                blogs.sort_by_key(|blog| Reverse((blog.views, blog.likes, blog.created_at)))
            }
        }
        blogs.truncate(query.limit);
        Ok(blogs)
    }

    async fn find_packages(&self, query: &PackageQuery) -> AppResult<Vec<Package>> {
        let data = self.inner.read().await;
        let mut packages: Vec<Package> = data
            .packages
            .values()
            .filter(|package| {
                query
                    .price_range
                    .map_or(true, |(min, max)| package.price >= min && package.price <= max)
            })
            .filter(|package| {
                query
                    .countries
                    .as_ref()
                    .map_or(true, |countries| countries.contains(&package.country))
            })
            .filter(|package| {
                query
                    .created_after
                    .map_or(true, |after| package.created_at >= after)
            })
            .filter(|package| query.exclude_owner != Some(package.owner_id))
            .cloned()
            .collect();

        match query.order {
            PackageOrder::Newest => packages.sort_by_key(|package| Reverse(package.created_at)),
            PackageOrder::Bookings => packages
                .sort_by_key(|package| Reverse((package.booking_count, package.created_at))),
        }
        packages.truncate(query.limit);
        Ok(packages)
    }

    async fn find_users(&self, query: &UserQuery) -> AppResult<Vec<UserProfile>> {
        let data = self.inner.read().await;
        let mut users: Vec<UserProfile> = data
            .users
            .values()
            .filter(|user| !query.exclude.contains(&user.id))
            .filter(|user| query.role.map_or(true, |role| user.role == role))
            .filter(|user| match &query.sharing_destinations {
                Some(countries) => countries.iter().any(|country| user.prefers(country)),
                None => true,
            })
            .cloned()
            .collect();

        users.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        users.truncate(query.limit);
        Ok(users)
    }

    async fn top_blog_countries(
        &self,
        exclude: &[String],
        limit: usize,
    ) -> AppResult<Vec<CountryCount>> {
        let data = self.inner.read().await;
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for country in data
            .blogs
            .values()
            .filter(|blog| blog.published)
            .filter_map(|blog| blog.country.as_deref())
            .filter(|country| !exclude.iter().any(|excluded| excluded.as_str() == *country))
        {
            *counts.entry(country).or_default() += 1;
        }

        let mut counts: Vec<CountryCount> = counts
            .into_iter()
            .map(|(country, blog_count)| CountryCount {
                country: country.to_string(),
                blog_count,
            })
            .collect();
        counts.sort_by(|a, b| {
            b.blog_count
                .cmp(&a.blog_count)
                .then_with(|| a.country.cmp(&b.country))
        });
        counts.truncate(limit);
        Ok(counts)
    }

    async fn resolve_target(&self, target: &Target) -> AppResult<Option<TargetEntity>> {
        let data = self.inner.read().await;
        let entity = match target {
            Target::Blog(id) => data.blogs.get(id).cloned().map(TargetEntity::Blog),
            Target::Package(id) => data.packages.get(id).cloned().map(TargetEntity::Package),
            Target::Country(code) => Some(TargetEntity::Country(destination_or_code(
                &data.destinations,
                code,
            ))),
            Target::User(id) => data
                .users
                .get(id)
                .map(|user| TargetEntity::User(TravelerSummary::from(user))),
            Target::TripPlan(id) => data.trip_plans.get(id).cloned().map(TargetEntity::TripPlan),
        };
        Ok(entity)
    }

    async fn get_recommendation(&self, id: Uuid) -> AppResult<Option<Recommendation>> {
        Ok(self.inner.read().await.recommendations.get(&id).cloned())
    }

    async fn update_interaction(
        &self,
        id: Uuid,
        update: &InteractionUpdate,
        at: DateTime<Utc>,
    ) -> AppResult<Recommendation> {
        let mut data = self.inner.write().await;
        let stored = data
            .recommendations
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Recommendation {} not found", id)))?;

        stored.apply_update(update, at);
        Ok(stored.clone())
    }

    async fn upsert_recommendations(
        &self,
        recommendations: Vec<Recommendation>,
    ) -> AppResult<Vec<Recommendation>> {
        let mut data = self.inner.write().await;
        let mut persisted = Vec::with_capacity(recommendations.len());

        for rec in recommendations {
            let existing = data
                .recommendations
                .values()
                .find(|stored| {
                    stored.user_id == rec.user_id
                        && stored.target == rec.target
                        && stored.reason == rec.reason
                })
                .map(|stored| stored.id);

            match existing.and_then(|id| data.recommendations.get_mut(&id)) {
                Some(stored) => {
                    stored.score = rec.score;
                    stored.metadata = rec.metadata;
                    stored.contextual_info = rec.contextual_info;
                    stored.expires_at = rec.expires_at;
                    stored.updated_at = rec.updated_at;
                    persisted.push(stored.clone());
                }
                None => {
                    data.recommendations.insert(rec.id, rec.clone());
                    persisted.push(rec);
                }
            }
        }

        Ok(persisted)
    }

    async fn delete_expired_recommendations(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut data = self.inner.write().await;
        let before = data.recommendations.len();
        data.recommendations
            .retain(|_, rec| rec.user_id != user_id || !rec.is_expired(now));
        Ok((before - data.recommendations.len()) as u64)
    }

    async fn delete_recommendations_created_before(
        &self,
        user_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut data = self.inner.write().await;
        let before = data.recommendations.len();
        data.recommendations
            .retain(|_, rec| rec.user_id != user_id || rec.created_at >= cutoff);
        Ok((before - data.recommendations.len()) as u64)
    }

    async fn list_recommendations(
        &self,
        query: &RecommendationQuery,
    ) -> AppResult<(Vec<Recommendation>, u64)> {
        let data = self.inner.read().await;
        let mut matching: Vec<&Recommendation> = data
            .recommendations
            .values()
            .filter(|rec| matches_recommendation(rec, query))
            .collect();
        matching.sort_by(|a, b| rank_order(a, b).then_with(|| a.id.cmp(&b.id)));

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn recommendations_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Recommendation>> {
        let data = self.inner.read().await;
        Ok(data
            .recommendations
            .values()
            .filter(|rec| rec.user_id == user_id && !rec.is_expired(now))
            .cloned()
            .collect())
    }
}
