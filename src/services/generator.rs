use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    collections::{hash_map::Entry, HashMap},
    sync::{Arc, Mutex as StdMutex, PoisonError},
    time::Duration,
};
use tokio::{sync::Mutex, task::JoinSet};
use uuid::Uuid;

use crate::{
    clock::Clock,
    db::store::{rank_order, DocumentStore},
    error::{AppError, AppResult},
    models::{
        ContextualInfo, Reason, Recommendation, RecommendationMetadata, Target, UserInteraction,
        UserProfile,
    },
    services::{
        collectors::{default_collectors, Candidate, Collector},
        scoring::{self, ScoringWeights},
    },
};

/// Number of recommendations echoed back by a refresh
const REFRESH_PREVIEW: usize = 10;

/// Tunables of a generation run
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub weights: ScoringWeights,
    /// Lifetime of a generated recommendation
    pub recommendation_ttl: chrono::Duration,
    /// Recommendations older than this are purged by a refresh
    pub refresh_max_age: chrono::Duration,
    pub generation_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            recommendation_ttl: chrono::Duration::days(7),
            refresh_max_age: chrono::Duration::hours(24),
            generation_timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome of a manual refresh
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSummary {
    pub generated: usize,
    pub recommendations: Vec<Recommendation>,
}

/// Runs the collectors for a user and persists the scored results
pub struct RecommendationEngine {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    collectors: Vec<Arc<dyn Collector>>,
    config: EngineConfig,
    user_locks: UserLocks,
}

type UserLocks = StdMutex<HashMap<Uuid, Arc<Mutex<()>>>>;

/// Claim on a user's generation lock; the map entry is removed once the last
/// claim for that user is dropped
struct UserLockSlot<'a> {
    locks: &'a UserLocks,
    user_id: Uuid,
    lock: Arc<Mutex<()>>,
}

impl<'a> UserLockSlot<'a> {
    fn claim(locks: &'a UserLocks, user_id: Uuid) -> Self {
        let mut map = locks.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = Arc::clone(map.entry(user_id).or_default());
        Self {
            locks,
            user_id,
            lock,
        }
    }
}

impl Drop for UserLockSlot<'_> {
    fn drop(&mut self) {
        let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Held only by the map and this slot
        if Arc::strong_count(&self.lock) == 2 {
            map.remove(&self.user_id);
        }
    }
}

impl RecommendationEngine {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        Self {
            collectors: default_collectors(config.weights),
            store,
            clock,
            config,
            user_locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Replaces the collector set
    pub fn with_collectors(mut self, collectors: Vec<Arc<dyn Collector>>) -> Self {
        self.collectors = collectors;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Generates and persists recommendations for a user
    ///
    /// Only one generation per user runs at a time; concurrent calls for the
    /// same user wait their turn. The whole call, waiting included, is bounded
    /// by the configured timeout.
    #[tracing::instrument(skip(self))]
    pub async fn generate(&self, user_id: Uuid) -> AppResult<Vec<Recommendation>> {
        let slot = UserLockSlot::claim(&self.user_locks, user_id);

        let run = async {
            let _guard = slot.lock.lock().await;
            self.run_generation(user_id).await
        };

        match tokio::time::timeout(self.config.generation_timeout, run).await {
            Ok(result) => result.map_err(AppError::into_generation_failure),
            Err(_) => {
                tracing::error!(
                    timeout_ms = self.config.generation_timeout.as_millis() as u64,
                    "Recommendation generation timed out"
                );
                Err(AppError::Generation(format!(
                    "timed out after {:?}",
                    self.config.generation_timeout
                )))
            }
        }
    }

    /// Purges stale recommendations, then generates a fresh batch
    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self, user_id: Uuid) -> AppResult<RefreshSummary> {
        let cutoff = self.clock.now() - self.config.refresh_max_age;
        let purged = self
            .store
            .delete_recommendations_created_before(user_id, cutoff)
            .await
            .map_err(AppError::into_generation_failure)?;
        tracing::info!(purged, "Purged old recommendations");

        let mut recommendations = self.generate(user_id).await?;
        recommendations.sort_by(rank_order);

        Ok(RefreshSummary {
            generated: recommendations.len(),
            recommendations: recommendations.into_iter().take(REFRESH_PREVIEW).collect(),
        })
    }

    async fn run_generation(&self, user_id: Uuid) -> AppResult<Vec<Recommendation>> {
        let now = self.clock.now();

        let profile = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

        let swept = self.store.delete_expired_recommendations(user_id, now).await?;
        if swept > 0 {
            tracing::debug!(swept, "Removed expired recommendations");
        }

        let profile = Arc::new(profile);
        let candidates = self.collect_candidates(Arc::clone(&profile), now).await;
        let recommendations = self.build_recommendations(&profile, candidates, now);

        let persisted = self.store.upsert_recommendations(recommendations).await?;
        tracing::info!(count = persisted.len(), "Recommendations generated");

        Ok(persisted)
    }

    /// Runs every collector in its own task; failed collectors contribute nothing
    ///
    /// Tasks still running when this future is dropped are aborted.
    async fn collect_candidates(&self, profile: Arc<UserProfile>, now: DateTime<Utc>) -> Vec<Candidate> {
        let mut tasks = JoinSet::new();

        for (index, collector) in self.collectors.iter().enumerate() {
            let collector = Arc::clone(collector);
            let store = Arc::clone(&self.store);
            let profile = Arc::clone(&profile);
            tasks.spawn(async move {
                let name = collector.name();
                (index, name, collector.collect(store, profile, now).await)
            });
        }

        let mut finished = Vec::with_capacity(self.collectors.len());
        let mut failures = 0usize;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, name, Ok(found))) => {
                    tracing::debug!(collector = name, count = found.len(), "Collector finished");
                    finished.push((index, found));
                }
                Ok((_, name, Err(e))) => {
                    tracing::error!(collector = name, error = %e, "Collector failed");
                    failures += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Collector task join error");
                    failures += 1;
                }
            }
        }

        // Collector order, not completion order
        finished.sort_by_key(|(index, _)| *index);
        let candidates: Vec<Candidate> = finished.into_iter().flat_map(|(_, found)| found).collect();

        if failures > 0 {
            tracing::warn!(
                candidate_count = candidates.len(),
                failed_collectors = failures,
                "Partial candidate collection failure"
            );
        }

        candidates
    }

    fn build_recommendations(
        &self,
        profile: &UserProfile,
        candidates: Vec<Candidate>,
        now: DateTime<Utc>,
    ) -> Vec<Recommendation> {
        let mut order = Vec::new();
        let mut best: HashMap<(Target, Reason), Candidate> = HashMap::new();

        for candidate in candidates {
            if candidate.target == Target::User(profile.id) {
                tracing::warn!(reason = candidate.reason.as_str(), "Dropping self-recommendation");
                continue;
            }

            match best.entry((candidate.target.clone(), candidate.reason)) {
                Entry::Occupied(mut slot) => {
                    if candidate.scored.score > slot.get().scored.score {
                        slot.insert(candidate);
                    }
                }
                Entry::Vacant(slot) => {
                    order.push(slot.key().clone());
                    slot.insert(candidate);
                }
            }
        }

        order
            .into_iter()
            .filter_map(|key| best.remove(&key))
            .map(|candidate| self.to_recommendation(profile, candidate, now))
            .collect()
    }

    fn to_recommendation(
        &self,
        profile: &UserProfile,
        candidate: Candidate,
        now: DateTime<Utc>,
    ) -> Recommendation {
        let confidence = scoring::confidence(&candidate.scored);

        Recommendation {
            id: Uuid::new_v4(),
            user_id: profile.id,
            score: scoring::clamp_score(candidate.scored.score),
            metadata: RecommendationMetadata {
                confidence,
                factors: candidate
                    .scored
                    .factors
                    .iter()
                    .map(|factor| factor.to_string())
                    .collect(),
                generated_at: now,
            },
            user_interaction: UserInteraction::default(),
            contextual_info: ContextualInfo {
                personalized_reason: Some(candidate.personalized_reason),
                is_trending: candidate.reason == Reason::Trending,
                user_location: profile.location.clone(),
            },
            target: candidate.target,
            reason: candidate.reason,
            created_at: now,
            updated_at: now,
            expires_at: now + self.config.recommendation_ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        db::InMemoryStore,
        models::{Blog, InteractionType, InteractionUpdate},
        services::{collectors::MockCollector, scoring::Scored},
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct Harness {
        store: InMemoryStore,
        clock: Arc<ManualClock>,
        user: UserProfile,
    }

    impl Harness {
        async fn new() -> Self {
            let store = InMemoryStore::new();
            let mut user = UserProfile::new("Aiko").with_destinations(["JP", "TH"]);
            user.location = Some("Osaka".to_string());
            store.insert_user(user.clone()).await;
            Self {
                store,
                clock: Arc::new(ManualClock::new(Utc::now())),
                user,
            }
        }

        fn engine(&self) -> RecommendationEngine {
            RecommendationEngine::new(
                Arc::new(self.store.clone()),
                self.clock.clone(),
                EngineConfig::default(),
            )
        }
    }

    fn candidate(target: Target, reason: Reason, score: f64) -> Candidate {
        Candidate {
            target,
            reason,
            scored: Scored::fixed(score, "test"),
            personalized_reason: "because".to_string(),
        }
    }

    fn mock_returning(name: &'static str, candidates: Vec<Candidate>) -> Arc<dyn Collector> {
        let mut mock = MockCollector::new();
        mock.expect_name().return_const(name);
        mock.expect_collect()
            .returning(move |_, _, _| Ok(candidates.clone()));
        Arc::new(mock)
    }

    fn mock_failing() -> Arc<dyn Collector> {
        let mut mock = MockCollector::new();
        mock.expect_name().return_const("broken");
        mock.expect_collect()
            .returning(|_, _, _| Err(AppError::Upstream("store unavailable".into())));
        Arc::new(mock)
    }

    #[tokio::test]
    async fn test_location_scenario_end_to_end() {
        let h = Harness::new().await;
        let now = h.clock.now();
        let stranger = UserProfile::new("Ren");
        let blog = Blog::new(&stranger, "Kyoto in autumn", now)
            .in_country("JP")
            .with_engagement(500, 20);
        h.store.insert_blog(blog.clone()).await;

        let recs = h.engine().generate(h.user.id).await.unwrap();

        let location = recs
            .iter()
            .find(|r| r.reason == Reason::LocationBased)
            .expect("location based recommendation");
        assert_eq!(location.target, Target::Blog(blog.id));
        assert!((location.score - 0.94).abs() < 1e-9);
        assert!((location.metadata.confidence - 0.8).abs() < 1e-9);
        assert_eq!(location.expires_at, now + chrono::Duration::days(7));
        assert_eq!(location.contextual_info.user_location.as_deref(), Some("Osaka"));
        assert!(!location.contextual_info.is_trending);

        let trending = recs
            .iter()
            .find(|r| r.reason == Reason::Trending && r.target == Target::Blog(blog.id))
            .expect("trending recommendation");
        assert!(trending.contextual_info.is_trending);
    }

    #[tokio::test]
    async fn test_failing_collector_does_not_abort_generation() {
        let h = Harness::new().await;
        let target = Target::Country("PE".into());
        let engine = h.engine().with_collectors(vec![
            mock_failing(),
            mock_returning("working", vec![candidate(target.clone(), Reason::Trending, 0.6)]),
        ]);

        let recs = engine.generate(h.user.id).await.unwrap();

        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].target, target);
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let h = Harness::new().await;
        let err = h.engine().generate(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_self_targets_dropped_and_duplicates_collapsed() {
        let h = Harness::new().await;
        let other = Target::User(Uuid::new_v4());
        let engine = h.engine().with_collectors(vec![
            mock_returning(
                "first",
                vec![
                    candidate(Target::User(h.user.id), Reason::SimilarInterests, 1.0),
                    candidate(other.clone(), Reason::SimilarInterests, 0.4),
                ],
            ),
            mock_returning(
                "second",
                vec![candidate(other.clone(), Reason::SimilarInterests, 0.8)],
            ),
        ]);

        let recs = engine.generate(h.user.id).await.unwrap();

        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].target, other);
        assert_eq!(recs[0].score, 0.8);
    }

    #[tokio::test]
    async fn test_regeneration_upserts_and_keeps_interactions() {
        let h = Harness::new().await;
        let target = Target::Country("VN".into());
        let engine = h.engine().with_collectors(vec![mock_returning(
            "fixed",
            vec![candidate(target.clone(), Reason::Trending, 0.6)],
        )]);

        let first = engine.generate(h.user.id).await.unwrap();
        h.store
            .update_interaction(
                first[0].id,
                &InteractionUpdate::Interaction(InteractionType::Liked),
                h.clock.now(),
            )
            .await
            .unwrap();

        h.clock.advance(chrono::Duration::hours(2));
        let second = engine.generate(h.user.id).await.unwrap();

        assert_eq!(h.store.recommendation_count().await, 1);
        assert_eq!(second[0].id, first[0].id);
        assert!(second[0].user_interaction.liked);
        assert_eq!(second[0].expires_at, h.clock.now() + chrono::Duration::days(7));
    }

    #[tokio::test]
    async fn test_expired_rows_are_swept() {
        let h = Harness::new().await;
        let engine = h
            .engine()
            .with_collectors(vec![mock_returning("empty", Vec::new())]);
        engine.generate(h.user.id).await.unwrap();

        let engine = h.engine().with_collectors(vec![mock_returning(
            "one",
            vec![candidate(Target::Country("JP".into()), Reason::Trending, 0.6)],
        )]);
        engine.generate(h.user.id).await.unwrap();
        assert_eq!(h.store.recommendation_count().await, 1);

        h.clock.advance(chrono::Duration::days(8));
        let engine = h
            .engine()
            .with_collectors(vec![mock_returning("empty", Vec::new())]);
        engine.generate(h.user.id).await.unwrap();

        assert_eq!(h.store.recommendation_count().await, 0);
    }

    #[tokio::test]
    async fn test_refresh_purges_old_rows() {
        let h = Harness::new().await;
        let stale_target = Target::Country("FR".into());
        let engine = h.engine().with_collectors(vec![mock_returning(
            "old",
            vec![candidate(stale_target.clone(), Reason::Trending, 0.6)],
        )]);
        engine.generate(h.user.id).await.unwrap();

        h.clock.advance(chrono::Duration::hours(25));
        let fresh: Vec<_> = (0..12)
            .map(|i| candidate(Target::Country(format!("C{}", i)), Reason::Trending, 0.5))
            .collect();
        let engine = h
            .engine()
            .with_collectors(vec![mock_returning("new", fresh)]);

        let summary = engine.refresh(h.user.id).await.unwrap();

        assert_eq!(summary.generated, 12);
        assert_eq!(summary.recommendations.len(), 10);
        assert_eq!(h.store.recommendation_count().await, 12);
        assert!(summary
            .recommendations
            .iter()
            .all(|r| r.target != stale_target));
    }

    struct SlowCollector {
        delay: Duration,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Collector for SlowCollector {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn collect(
            &self,
            _store: Arc<dyn DocumentStore>,
            _profile: Arc<UserProfile>,
            _now: DateTime<Utc>,
        ) -> AppResult<Vec<Candidate>> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_generation_serialized_per_user() {
        let h = Harness::new().await;
        let peak = Arc::new(AtomicUsize::new(0));
        let engine = h.engine().with_collectors(vec![Arc::new(SlowCollector {
            delay: Duration::from_millis(20),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: peak.clone(),
        })]);

        let (a, b) = tokio::join!(engine.generate(h.user.id), engine.generate(h.user.id));

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_generation_timeout() {
        let h = Harness::new().await;
        let config = EngineConfig {
            generation_timeout: Duration::from_millis(20),
            ..EngineConfig::default()
        };
        let engine = RecommendationEngine::new(Arc::new(h.store.clone()), h.clock.clone(), config)
            .with_collectors(vec![Arc::new(SlowCollector {
                delay: Duration::from_secs(5),
                in_flight: Arc::new(AtomicUsize::new(0)),
                peak: Arc::new(AtomicUsize::new(0)),
            })]);

        let err = engine.generate(h.user.id).await.unwrap_err();
        assert!(matches!(err, AppError::Generation(_)));
    }

    #[tokio::test]
    async fn test_lock_slots_released_after_generation() {
        let h = Harness::new().await;
        let engine = h
            .engine()
            .with_collectors(vec![mock_returning("empty", Vec::new())]);

        for _ in 0..50 {
            let err = engine.generate(Uuid::new_v4()).await.unwrap_err();
            assert!(matches!(err, AppError::NotFound(_)));
        }
        engine.generate(h.user.id).await.unwrap();

        assert!(engine.user_locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lock_slot_kept_while_another_call_waits() {
        let h = Harness::new().await;
        let engine = h.engine();

        let first = UserLockSlot::claim(&engine.user_locks, h.user.id);
        let second = UserLockSlot::claim(&engine.user_locks, h.user.id);
        assert!(Arc::ptr_eq(&first.lock, &second.lock));

        drop(first);
        assert_eq!(engine.user_locks.lock().unwrap().len(), 1);
        drop(second);
        assert!(engine.user_locks.lock().unwrap().is_empty());
    }

    /// Sets its flag when the collect future is dropped before finishing
    struct AbandonedCollector {
        dropped: Arc<AtomicBool>,
    }

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Collector for AbandonedCollector {
        fn name(&self) -> &'static str {
            "abandoned"
        }

        async fn collect(
            &self,
            _store: Arc<dyn DocumentStore>,
            _profile: Arc<UserProfile>,
            _now: DateTime<Utc>,
        ) -> AppResult<Vec<Candidate>> {
            let flag = SetOnDrop(self.dropped.clone());
            tokio::time::sleep(Duration::from_secs(30)).await;
            std::mem::forget(flag);
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_timeout_aborts_collector_tasks() {
        let h = Harness::new().await;
        let dropped = Arc::new(AtomicBool::new(false));
        let config = EngineConfig {
            generation_timeout: Duration::from_millis(20),
            ..EngineConfig::default()
        };
        let engine = RecommendationEngine::new(Arc::new(h.store.clone()), h.clock.clone(), config)
            .with_collectors(vec![Arc::new(AbandonedCollector {
                dropped: dropped.clone(),
            })]);

        let err = engine.generate(h.user.id).await.unwrap_err();
        assert!(matches!(err, AppError::Generation(_)));

        for _ in 0..50 {
            if dropped.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(dropped.load(Ordering::SeqCst));
    }
}
