use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::{
    db::store::{BlogOrder, BlogQuery, DocumentStore, PackageOrder, PackageQuery, UserQuery},
    error::AppResult,
    models::{Reason, Target, UserProfile, UserRole},
    services::scoring::{self, Scored, ScoringWeights},
};

const DEFAULT_CAP: usize = 10;
const SMALL_CAP: usize = 5;
const TRENDING_BLOG_WINDOW_DAYS: i64 = 30;
const POPULAR_PACKAGE_WINDOW_DAYS: i64 = 90;

const FOLLOWED_AUTHOR_SCORE: f64 = 0.85;
const ACTIVE_AUTHOR_SCORE: f64 = 0.7;
const TRENDING_DESTINATION_SCORE: f64 = 0.6;

/// A proposed recommendation before it is persisted
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub target: Target,
    pub reason: Reason,
    pub scored: Scored,
    /// Human-readable explanation shown next to the recommendation
    pub personalized_reason: String,
}

/// Produces a bounded list of candidates of one entity type for one reason
///
/// Collectors are read-only against the store and independent of each other,
/// so the generator runs them concurrently.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Collector: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    async fn collect(
        &self,
        store: Arc<dyn DocumentStore>,
        profile: Arc<UserProfile>,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Candidate>>;
}

/// The full set of collectors used for generation
pub fn default_collectors(weights: ScoringWeights) -> Vec<Arc<dyn Collector>> {
    vec![
        Arc::new(LocationBlogs { weights }),
        Arc::new(TrendingBlogs { weights }),
        Arc::new(FollowedAuthorBlogs),
        Arc::new(BudgetPackages { weights }),
        Arc::new(PopularPackages { weights }),
        Arc::new(SimilarTravelers),
        Arc::new(ActiveAuthors),
        Arc::new(TrendingDestinations),
    ]
}

fn preferred(profile: &UserProfile) -> Vec<String> {
    profile.preferred_destinations.iter().cloned().collect()
}

/// Published blogs geotagged in one of the user's preferred destinations
pub struct LocationBlogs {
    pub weights: ScoringWeights,
}

#[async_trait]
impl Collector for LocationBlogs {
    fn name(&self) -> &'static str {
        "location_blogs"
    }

    async fn collect(
        &self,
        store: Arc<dyn DocumentStore>,
        profile: Arc<UserProfile>,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Candidate>> {
        if profile.preferred_destinations.is_empty() {
            return Ok(Vec::new());
        }

        let blogs = store
            .find_published_blogs(&BlogQuery {
                countries: Some(preferred(&profile)),
                exclude_author: Some(profile.id),
                order: BlogOrder::Newest,
                limit: DEFAULT_CAP,
                ..Default::default()
            })
            .await?;

        Ok(blogs
            .into_iter()
            .map(|blog| {
                let reason = Reason::LocationBased;
                let country = blog.country.clone().unwrap_or_default();
                Candidate {
                    scored: scoring::score_blog(&blog, &profile, reason, &self.weights, now),
                    target: Target::Blog(blog.id),
                    reason,
                    personalized_reason: format!("Because you want to visit {}", country),
                }
            })
            .collect())
    }
}

/// Most viewed blogs of the last 30 days
pub struct TrendingBlogs {
    pub weights: ScoringWeights,
}

#[async_trait]
impl Collector for TrendingBlogs {
    fn name(&self) -> &'static str {
        "trending_blogs"
    }

    async fn collect(
        &self,
        store: Arc<dyn DocumentStore>,
        profile: Arc<UserProfile>,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Candidate>> {
        let blogs = store
            .find_published_blogs(&BlogQuery {
                exclude_author: Some(profile.id),
                created_after: Some(now - Duration::days(TRENDING_BLOG_WINDOW_DAYS)),
                order: BlogOrder::Popularity,
                limit: DEFAULT_CAP,
                ..Default::default()
            })
            .await?;

        Ok(blogs
            .into_iter()
            .map(|blog| {
                let reason = Reason::Trending;
                Candidate {
                    scored: scoring::score_blog(&blog, &profile, reason, &self.weights, now),
                    target: Target::Blog(blog.id),
                    reason,
                    personalized_reason: format!(
                        "Trending with {} views this month",
                        blog.views
                    ),
                }
            })
            .collect())
    }
}

/// Latest posts from authors the user follows
pub struct FollowedAuthorBlogs;

#[async_trait]
impl Collector for FollowedAuthorBlogs {
    fn name(&self) -> &'static str {
        "followed_author_blogs"
    }

    async fn collect(
        &self,
        store: Arc<dyn DocumentStore>,
        profile: Arc<UserProfile>,
        _now: DateTime<Utc>,
    ) -> AppResult<Vec<Candidate>> {
        if profile.following.is_empty() {
            return Ok(Vec::new());
        }

        let blogs = store
            .find_published_blogs(&BlogQuery {
                authors: Some(profile.following.iter().copied().collect()),
                exclude_author: Some(profile.id),
                order: BlogOrder::Newest,
                limit: DEFAULT_CAP,
                ..Default::default()
            })
            .await?;

        Ok(blogs
            .into_iter()
            .map(|blog| Candidate {
                target: Target::Blog(blog.id),
                reason: Reason::FriendsActivity,
                scored: Scored::fixed(FOLLOWED_AUTHOR_SCORE, "followed_author"),
                personalized_reason: format!("New from {}, who you follow", blog.author_name),
            })
            .collect())
    }
}

/// Packages priced inside the user's budget tier in a preferred destination
pub struct BudgetPackages {
    pub weights: ScoringWeights,
}

#[async_trait]
impl Collector for BudgetPackages {
    fn name(&self) -> &'static str {
        "budget_packages"
    }

    async fn collect(
        &self,
        store: Arc<dyn DocumentStore>,
        profile: Arc<UserProfile>,
        _now: DateTime<Utc>,
    ) -> AppResult<Vec<Candidate>> {
        let Some(tier) = profile.budget_tier else {
            return Ok(Vec::new());
        };
        if profile.preferred_destinations.is_empty() {
            return Ok(Vec::new());
        }

        let packages = store
            .find_packages(&PackageQuery {
                price_range: Some(tier.price_range()),
                countries: Some(preferred(&profile)),
                exclude_owner: Some(profile.id),
                order: PackageOrder::Newest,
                limit: DEFAULT_CAP,
                ..Default::default()
            })
            .await?;

        Ok(packages
            .into_iter()
            .map(|package| {
                let reason = Reason::PriceRange;
                Candidate {
                    scored: scoring::score_package(&package, &profile, reason, &self.weights),
                    target: Target::Package(package.id),
                    reason,
                    personalized_reason: format!("Fits your {} budget", tier.label()),
                }
            })
            .collect())
    }
}

/// Packages with the most bookings in the last 90 days
pub struct PopularPackages {
    pub weights: ScoringWeights,
}

#[async_trait]
impl Collector for PopularPackages {
    fn name(&self) -> &'static str {
        "popular_packages"
    }

    async fn collect(
        &self,
        store: Arc<dyn DocumentStore>,
        profile: Arc<UserProfile>,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Candidate>> {
        let packages = store
            .find_packages(&PackageQuery {
                created_after: Some(now - Duration::days(POPULAR_PACKAGE_WINDOW_DAYS)),
                exclude_owner: Some(profile.id),
                order: PackageOrder::Bookings,
                limit: DEFAULT_CAP,
                ..Default::default()
            })
            .await?;

        Ok(packages
            .into_iter()
            .map(|package| {
                let reason = Reason::PopularAmongSimilarUsers;
                Candidate {
                    scored: scoring::score_package(&package, &profile, reason, &self.weights),
                    target: Target::Package(package.id),
                    reason,
                    personalized_reason: format!(
                        "Booked {} times by fellow travelers",
                        package.booking_count
                    ),
                }
            })
            .collect())
    }
}

/// Other travelers sharing at least one preferred destination
pub struct SimilarTravelers;

#[async_trait]
impl Collector for SimilarTravelers {
    fn name(&self) -> &'static str {
        "similar_travelers"
    }

    async fn collect(
        &self,
        store: Arc<dyn DocumentStore>,
        profile: Arc<UserProfile>,
        _now: DateTime<Utc>,
    ) -> AppResult<Vec<Candidate>> {
        if profile.preferred_destinations.is_empty() {
            return Ok(Vec::new());
        }

        let mut exclude: Vec<_> = profile.following.iter().copied().collect();
        exclude.push(profile.id);

        let users = store
            .find_users(&UserQuery {
                sharing_destinations: Some(preferred(&profile)),
                exclude,
                limit: DEFAULT_CAP,
                ..Default::default()
            })
            .await?;

        Ok(users
            .into_iter()
            .map(|user| {
                let shared = user
                    .preferred_destinations
                    .intersection(&profile.preferred_destinations)
                    .count();
                Candidate {
                    scored: scoring::score_user(&user, &profile, Reason::SimilarInterests),
                    target: Target::User(user.id),
                    reason: Reason::SimilarInterests,
                    personalized_reason: format!(
                        "{} shares {} of your dream destinations",
                        user.name, shared
                    ),
                }
            })
            .collect())
    }
}

/// Authors the user does not follow yet
pub struct ActiveAuthors;

#[async_trait]
impl Collector for ActiveAuthors {
    fn name(&self) -> &'static str {
        "active_authors"
    }

    async fn collect(
        &self,
        store: Arc<dyn DocumentStore>,
        profile: Arc<UserProfile>,
        _now: DateTime<Utc>,
    ) -> AppResult<Vec<Candidate>> {
        let mut exclude: Vec<_> = profile.following.iter().copied().collect();
        exclude.push(profile.id);

        let authors = store
            .find_users(&UserQuery {
                role: Some(UserRole::Author),
                exclude,
                limit: SMALL_CAP,
                ..Default::default()
            })
            .await?;

        Ok(authors
            .into_iter()
            .map(|author| Candidate {
                target: Target::User(author.id),
                reason: Reason::Trending,
                scored: Scored::fixed(ACTIVE_AUTHOR_SCORE, "active_author"),
                personalized_reason: format!("{} is an active travel writer", author.name),
            })
            .collect())
    }
}

/// Countries with the most published blogs, minus the user's favorites
pub struct TrendingDestinations;

#[async_trait]
impl Collector for TrendingDestinations {
    fn name(&self) -> &'static str {
        "trending_destinations"
    }

    async fn collect(
        &self,
        store: Arc<dyn DocumentStore>,
        profile: Arc<UserProfile>,
        _now: DateTime<Utc>,
    ) -> AppResult<Vec<Candidate>> {
        let favorites: Vec<String> = profile.favorite_countries.iter().cloned().collect();
        let countries = store.top_blog_countries(&favorites, SMALL_CAP).await?;

        Ok(countries
            .into_iter()
            .map(|entry| Candidate {
                personalized_reason: format!(
                    "{} travel stories were shared about {}",
                    entry.blog_count, entry.country
                ),
                target: Target::Country(entry.country),
                reason: Reason::Trending,
                scored: Scored::fixed(TRENDING_DESTINATION_SCORE, "trending_destination"),
            })
            .collect())
    }
}
