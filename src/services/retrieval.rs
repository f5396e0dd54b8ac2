//! Read paths over stored recommendations.
//!
//! Listing and stats are scoped to one user. Trending is public and returns
//! the recommended entities themselves rather than the recommendation rows.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

use crate::{
    clock::Clock,
    db::{
        redis::{Cache, CacheKey},
        store::{DocumentStore, RecommendationQuery},
    },
    error::{AppError, AppResult},
    models::{Reason, Recommendation, RecommendationType, TargetEntity},
};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;
pub const DEFAULT_TRENDING_LIMIT: i64 = 10;
pub const MAX_TRENDING_LIMIT: i64 = 50;

/// Rows fetched per store round trip while collecting trending targets
const TRENDING_SCAN_BATCH: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub kind: Option<RecommendationType>,
    pub page: i64,
    pub limit: i64,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            kind: None,
            page: DEFAULT_PAGE,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Validated page window of a [`ListQuery`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PageWindow {
    page: usize,
    limit: usize,
    offset: usize,
}

impl ListQuery {
    fn validate(&self) -> AppResult<PageWindow> {
        if self.page < 1 {
            return Err(AppError::InvalidInput("page must be at least 1".to_string()));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.limit) {
            return Err(AppError::InvalidInput(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        // Offsets are bound as BIGINT, so they must fit in an i64
        let offset = (self.page - 1)
            .checked_mul(self.limit)
            .and_then(|offset| usize::try_from(offset).ok())
            .ok_or_else(|| AppError::InvalidInput("page is out of range".to_string()))?;

        Ok(PageWindow {
            page: self.page as usize,
            limit: self.limit as usize,
            offset,
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: usize,
    pub total_pages: usize,
    /// Items on this page
    pub count: usize,
    pub total_items: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

/// One page of a user's live recommendations, best first
#[tracing::instrument(skip(store, clock))]
pub async fn list_recommendations(
    store: &dyn DocumentStore,
    clock: &dyn Clock,
    user_id: Uuid,
    query: ListQuery,
) -> AppResult<Page<Recommendation>> {
    let window = query.validate()?;

    let (items, total) = store
        .list_recommendations(&RecommendationQuery {
            user_id: Some(user_id),
            kind: query.kind,
            reason: None,
            now: clock.now(),
            offset: window.offset,
            limit: window.limit,
        })
        .await?;

    let total_pages = (total as usize).div_ceil(window.limit);
    tracing::debug!(count = items.len(), total, "Listed recommendations");

    Ok(Page {
        pagination: Pagination {
            current_page: window.page,
            total_pages,
            count: items.len(),
            total_items: total,
        },
        items,
    })
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
    pub total: usize,
    pub average_score: f64,
    pub viewed: usize,
    pub clicked: usize,
    pub liked: usize,
    pub dismissed: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypeStats {
    #[serde(rename = "type")]
    pub kind: RecommendationType,
    pub count: usize,
    pub average_score: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationStats {
    pub overall: OverallStats,
    pub by_type: Vec<TypeStats>,
}

fn average(sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Aggregates a user's live recommendations overall and per type
#[tracing::instrument(skip(store, clock))]
pub async fn recommendation_stats(
    store: &dyn DocumentStore,
    clock: &dyn Clock,
    user_id: Uuid,
) -> AppResult<RecommendationStats> {
    let recommendations = store.recommendations_for_user(user_id, clock.now()).await?;

    let mut overall = OverallStats::default();
    let mut score_sum = 0.0;
    let mut per_type: BTreeMap<RecommendationType, (usize, f64)> = BTreeMap::new();

    for rec in &recommendations {
        let interaction = &rec.user_interaction;
        overall.total += 1;
        score_sum += rec.score;
        overall.viewed += usize::from(interaction.viewed);
        overall.clicked += usize::from(interaction.clicked);
        overall.liked += usize::from(interaction.liked);
        overall.dismissed += usize::from(interaction.dismissed);

        let entry = per_type.entry(rec.kind()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += rec.score;
    }
    overall.average_score = average(score_sum, overall.total);

    Ok(RecommendationStats {
        overall,
        by_type: per_type
            .into_iter()
            .map(|(kind, (count, sum))| TypeStats {
                kind,
                count,
                average_score: average(sum, count),
            })
            .collect(),
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrendingQuery {
    pub kind: Option<RecommendationType>,
    pub limit: Option<i64>,
}

impl TrendingQuery {
    fn validated_limit(&self) -> AppResult<usize> {
        let limit = self.limit.unwrap_or(DEFAULT_TRENDING_LIMIT);
        if !(1..=MAX_TRENDING_LIMIT).contains(&limit) {
            return Err(AppError::InvalidInput(format!(
                "limit must be between 1 and {}",
                MAX_TRENDING_LIMIT
            )));
        }
        Ok(limit as usize)
    }
}

/// Distinct entities currently recommended as trending, across all users
///
/// Served from Redis when a cache is configured.
#[tracing::instrument(skip(store, cache, clock))]
pub async fn trending(
    store: &dyn DocumentStore,
    cache: Option<&Cache>,
    clock: &dyn Clock,
    query: TrendingQuery,
) -> AppResult<Vec<TargetEntity>> {
    let limit = query.validated_limit()?;
    let now = clock.now();

    match cache {
        Some(cache) => {
            let key = CacheKey::Trending {
                kind: query.kind,
                limit,
            };
            crate::cached!(cache, key, load_trending(store, query.kind, limit, now))
        }
        None => load_trending(store, query.kind, limit, now).await,
    }
}

async fn load_trending(
    store: &dyn DocumentStore,
    kind: Option<RecommendationType>,
    limit: usize,
    now: DateTime<Utc>,
) -> AppResult<Vec<TargetEntity>> {
    let mut seen = HashSet::new();
    let mut entities = Vec::new();
    let mut offset = 0;

    while entities.len() < limit {
        let (batch, _) = store
            .list_recommendations(&RecommendationQuery {
                user_id: None,
                kind,
                reason: Some(Reason::Trending),
                now,
                offset,
                limit: TRENDING_SCAN_BATCH,
            })
            .await?;
        if batch.is_empty() {
            break;
        }
        offset += batch.len();

        for rec in batch {
            if entities.len() == limit {
                break;
            }
            if !seen.insert(rec.target.clone()) {
                continue;
            }
            match store.resolve_target(&rec.target).await? {
                Some(entity) => entities.push(entity),
                None => {
                    tracing::debug!(target_id = %rec.target, "Skipping unresolvable trending target")
                }
            }
        }
    }

    tracing::debug!(count = entities.len(), "Trending targets loaded");
    Ok(entities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        db::InMemoryStore,
        models::{
            Blog, ContextualInfo, InteractionType, RecommendationMetadata, Target,
            UserInteraction, UserProfile,
        },
    };
    use chrono::Duration;

    fn rec(user_id: Uuid, target: Target, reason: Reason, score: f64, now: DateTime<Utc>) -> Recommendation {
        Recommendation {
            id: Uuid::new_v4(),
            user_id,
            target,
            reason,
            score,
            metadata: RecommendationMetadata {
                confidence: 0.6,
                factors: Vec::new(),
                generated_at: now,
            },
            user_interaction: UserInteraction::default(),
            contextual_info: ContextualInfo::default(),
            created_at: now,
            updated_at: now,
            expires_at: now + Duration::days(7),
        }
    }

    #[tokio::test]
    async fn test_list_pagination_fields() {
        let store = InMemoryStore::new();
        let clock = ManualClock::new(Utc::now());
        let user = Uuid::new_v4();
        for score in [0.9, 0.7, 0.5] {
            store
                .insert_recommendation(rec(user, Target::Blog(Uuid::new_v4()), Reason::Trending, score, clock.now()))
                .await;
        }
        store
            .insert_recommendation(rec(Uuid::new_v4(), Target::Blog(Uuid::new_v4()), Reason::Trending, 1.0, clock.now()))
            .await;

        let page = list_recommendations(
            &store,
            &clock,
            user,
            ListQuery {
                kind: None,
                page: 2,
                limit: 2,
            },
        )
        .await
        .unwrap();

        assert_eq!(
            page.pagination,
            Pagination {
                current_page: 2,
                total_pages: 2,
                count: 1,
                total_items: 3,
            }
        );
        assert_eq!(page.items[0].score, 0.5);
    }

    #[tokio::test]
    async fn test_list_filters_type_and_expiry() {
        let store = InMemoryStore::new();
        let clock = ManualClock::new(Utc::now());
        let user = Uuid::new_v4();
        let now = clock.now();
        store
            .insert_recommendation(rec(user, Target::Country("JP".into()), Reason::Trending, 0.6, now))
            .await;
        store
            .insert_recommendation(rec(user, Target::Blog(Uuid::new_v4()), Reason::Trending, 0.8, now))
            .await;
        let mut expired = rec(user, Target::Country("TH".into()), Reason::Trending, 0.9, now);
        expired.expires_at = now;
        store.insert_recommendation(expired).await;

        let page = list_recommendations(
            &store,
            &clock,
            user,
            ListQuery {
                kind: Some(RecommendationType::Destination),
                ..ListQuery::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].target, Target::Country("JP".into()));
        assert_eq!(page.pagination.total_pages, 1);
    }

    #[tokio::test]
    async fn test_list_rejects_bad_pagination() {
        let store = InMemoryStore::new();
        let clock = ManualClock::new(Utc::now());
        let user = Uuid::new_v4();

        for (page, limit) in [(0, 10), (1, 0), (1, 101), (-3, 10)] {
            let err = list_recommendations(
                &store,
                &clock,
                user,
                ListQuery {
                    kind: None,
                    page,
                    limit,
                },
            )
            .await
            .unwrap_err();
            assert!(matches!(err, AppError::InvalidInput(_)), "page={} limit={}", page, limit);
        }

        let err = list_recommendations(
            &store,
            &clock,
            user,
            ListQuery {
                kind: None,
                page: i64::MAX,
                limit: MAX_PAGE_SIZE,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let empty = list_recommendations(&store, &clock, user, ListQuery::default())
            .await
            .unwrap();
        assert_eq!(empty.pagination.total_pages, 0);
    }

    #[test]
    fn test_page_window_offset() {
        let window = ListQuery {
            kind: None,
            page: 3,
            limit: 25,
        }
        .validate()
        .unwrap();
        assert_eq!(
            window,
            PageWindow {
                page: 3,
                limit: 25,
                offset: 50,
            }
        );

        let last = ListQuery {
            kind: None,
            page: i64::MAX / MAX_PAGE_SIZE,
            limit: MAX_PAGE_SIZE,
        }
        .validate()
        .unwrap();
        assert!(i64::try_from(last.offset).is_ok());
    }

    #[tokio::test]
    async fn test_stats_overall_and_by_type() {
        let store = InMemoryStore::new();
        let clock = ManualClock::new(Utc::now());
        let user = Uuid::new_v4();
        let now = clock.now();

        let mut liked = rec(user, Target::User(Uuid::new_v4()), Reason::SimilarInterests, 0.4, now);
        liked.apply_interaction(InteractionType::Liked, now);
        liked.apply_interaction(InteractionType::Viewed, now);
        store.insert_recommendation(liked).await;
        store
            .insert_recommendation(rec(user, Target::Blog(Uuid::new_v4()), Reason::Trending, 0.8, now))
            .await;
        store
            .insert_recommendation(rec(user, Target::Blog(Uuid::new_v4()), Reason::Trending, 0.6, now))
            .await;

        let stats = recommendation_stats(&store, &clock, user).await.unwrap();

        assert_eq!(stats.overall.total, 3);
        assert!((stats.overall.average_score - 0.6).abs() < 1e-9);
        assert_eq!(stats.overall.liked, 1);
        assert_eq!(stats.overall.viewed, 1);
        assert_eq!(stats.overall.clicked, 0);

        let kinds: Vec<_> = stats.by_type.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![RecommendationType::Blog, RecommendationType::User]);
        assert_eq!(stats.by_type[0].count, 2);
        assert!((stats.by_type[0].average_score - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_stats_empty_user() {
        let store = InMemoryStore::new();
        let clock = ManualClock::new(Utc::now());
        let stats = recommendation_stats(&store, &clock, Uuid::new_v4()).await.unwrap();
        assert_eq!(stats.overall, OverallStats::default());
        assert!(stats.by_type.is_empty());
    }

    #[tokio::test]
    async fn test_trending_returns_distinct_targets() {
        let store = InMemoryStore::new();
        let clock = ManualClock::new(Utc::now());
        let now = clock.now();
        let blog = Blog::new(&UserProfile::new("Ren"), "Hanoi street food", now).in_country("VN");
        store.insert_blog(blog.clone()).await;

        for score in [0.9, 0.8, 0.7] {
            store
                .insert_recommendation(rec(Uuid::new_v4(), Target::Blog(blog.id), Reason::Trending, score, now))
                .await;
        }
        store
            .insert_recommendation(rec(Uuid::new_v4(), Target::Blog(Uuid::new_v4()), Reason::Trending, 0.95, now))
            .await;
        store
            .insert_recommendation(rec(Uuid::new_v4(), Target::Country("PE".into()), Reason::LocationBased, 1.0, now))
            .await;

        let entities = trending(&store, None, &clock, TrendingQuery::default())
            .await
            .unwrap();

        assert_eq!(entities, vec![TargetEntity::Blog(blog)]);
    }

    #[tokio::test]
    async fn test_trending_type_filter_and_limit() {
        let store = InMemoryStore::new();
        let clock = ManualClock::new(Utc::now());
        let now = clock.now();
        for (code, score) in [("JP", 0.9), ("TH", 0.8), ("VN", 0.7)] {
            store
                .insert_recommendation(rec(Uuid::new_v4(), Target::Country(code.into()), Reason::Trending, score, now))
                .await;
        }
        store
            .insert_recommendation(rec(Uuid::new_v4(), Target::User(Uuid::new_v4()), Reason::Trending, 0.99, now))
            .await;

        let entities = trending(
            &store,
            None,
            &clock,
            TrendingQuery {
                kind: Some(RecommendationType::Destination),
                limit: Some(2),
            },
        )
        .await
        .unwrap();

        let codes: Vec<_> = entities
            .iter()
            .map(|entity| match entity {
                TargetEntity::Country(destination) => destination.code.clone(),
                other => panic!("unexpected entity {:?}", other),
            })
            .collect();
        assert_eq!(codes, vec!["JP".to_string(), "TH".to_string()]);

        let err = trending(
            &store,
            None,
            &clock,
            TrendingQuery {
                kind: None,
                limit: Some(51),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_trending_served_from_store_when_cache_unreachable() {
        let store = InMemoryStore::new();
        let clock = ManualClock::new(Utc::now());
        store
            .insert_recommendation(rec(Uuid::new_v4(), Target::Country("JP".into()), Reason::Trending, 0.9, clock.now()))
            .await;

        // Nothing listens on port 1, so every cache read fails to connect
        let client = crate::db::redis::create_redis_client("redis://127.0.0.1:1").unwrap();
        let (cache, writer) = Cache::new(client, 60);

        let entities = trending(&store, Some(&cache), &clock, TrendingQuery::default())
            .await
            .unwrap();
        writer.shutdown().await;

        assert_eq!(entities.len(), 1);
        assert!(matches!(&entities[0], TargetEntity::Country(destination) if destination.code == "JP"));
    }
}
