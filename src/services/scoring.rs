//! Relevance scoring for recommendation candidates.
//!
//! Every function is pure: the weight table and the current time are passed
//! in, and each bonus that applies is reported as a factor tag so the final
//! score can be explained.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeSet;

use crate::models::{Blog, Package, Reason, UserProfile};

const BASE_SCORE: f64 = 0.5;
const BUDGET_MATCH_BONUS: f64 = 0.3;
const RECENCY_WINDOW_DAYS: f64 = 30.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

pub const FACTOR_POPULARITY: &str = "popularity";
pub const FACTOR_RECENCY: &str = "recency";
pub const FACTOR_LOCATION: &str = "location_match";
pub const FACTOR_BUDGET: &str = "budget_match";
pub const FACTOR_SHARED_DESTINATIONS: &str = "shared_destinations";

/// Weight table applied by the scoring functions
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ScoringWeights {
    pub similarity: f64,
    pub popularity: f64,
    pub recency: f64,
    pub location: f64,
    pub interest: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            similarity: 0.30,
            popularity: 0.20,
            recency: 0.15,
            location: 0.15,
            interest: 0.20,
        }
    }
}

/// A score together with the factors that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    pub score: f64,
    pub factors: Vec<&'static str>,
}

impl Scored {
    /// A score taken from a direct signal rather than computed
    pub fn fixed(score: f64, factor: &'static str) -> Self {
        Self {
            score,
            factors: vec![factor],
        }
    }
}

pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 1.0)
}

/// Confidence grows with the number of independent factors behind a score
pub fn confidence(scored: &Scored) -> f64 {
    (BASE_SCORE + 0.1 * scored.factors.len() as f64).clamp(0.0, 0.95)
}

/// Scores a blog post for a user
///
/// Popularity saturates at 1000 views or 100 likes; recency decays linearly
/// to zero over 30 days from publication.
pub fn score_blog(
    blog: &Blog,
    profile: &UserProfile,
    _reason: Reason,
    weights: &ScoringWeights,
    now: DateTime<Utc>,
) -> Scored {
    let mut score = BASE_SCORE;
    let mut factors = Vec::new();

    let popularity = (blog.views as f64 / 1000.0 + blog.likes as f64 / 100.0).min(1.0);
    if popularity > 0.0 {
        score += popularity * weights.popularity;
        factors.push(FACTOR_POPULARITY);
    }

    let age_days = (now - blog.published_on()).num_seconds() as f64 / SECONDS_PER_DAY;
    let recency = (1.0 - age_days.max(0.0) / RECENCY_WINDOW_DAYS).max(0.0);
    if recency > 0.0 {
        score += recency * weights.recency;
        factors.push(FACTOR_RECENCY);
    }

    if blog
        .country
        .as_deref()
        .map_or(false, |country| profile.prefers(country))
    {
        score += weights.location;
        factors.push(FACTOR_LOCATION);
    }

    Scored {
        score: score.min(1.0),
        factors,
    }
}

/// Scores a travel package against the user's budget tier and destinations
pub fn score_package(
    package: &Package,
    profile: &UserProfile,
    _reason: Reason,
    weights: &ScoringWeights,
) -> Scored {
    let mut score = BASE_SCORE;
    let mut factors = Vec::new();

    if profile
        .budget_tier
        .map_or(false, |tier| tier.contains(package.price))
    {
        score += BUDGET_MATCH_BONUS;
        factors.push(FACTOR_BUDGET);
    }

    if profile.prefers(&package.country) {
        score += weights.location;
        factors.push(FACTOR_LOCATION);
    }

    Scored {
        score: score.min(1.0),
        factors,
    }
}

/// Jaccard similarity of two sets of preferred destinations
pub fn destination_similarity(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Scores another user by overlap of preferred destinations
pub fn score_user(candidate: &UserProfile, profile: &UserProfile, _reason: Reason) -> Scored {
    let similarity =
        destination_similarity(&profile.preferred_destinations, &candidate.preferred_destinations);
    let factors = if similarity > 0.0 {
        vec![FACTOR_SHARED_DESTINATIONS]
    } else {
        Vec::new()
    };

    Scored {
        score: similarity,
        factors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BudgetTier;
    use chrono::Duration;
    use uuid::Uuid;

    fn set(codes: &[&str]) -> BTreeSet<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    fn traveler() -> UserProfile {
        UserProfile::new("Aiko").with_destinations(["JP", "TH"])
    }

    #[test]
    fn test_blog_score_location_scenario() {
        let now = Utc::now();
        let stranger = UserProfile::new("Ren");
        let blog = Blog::new(&stranger, "Kyoto in autumn", now)
            .in_country("JP")
            .with_engagement(500, 20);

        let scored = score_blog(
            &blog,
            &traveler(),
            Reason::LocationBased,
            &ScoringWeights::default(),
            now,
        );

        // 0.5 + min(0.5 + 0.2, 1) * 0.2 + 1 * 0.15 + 0.15
        assert!((scored.score - 0.94).abs() < 1e-9);
        assert_eq!(
            scored.factors,
            vec![FACTOR_POPULARITY, FACTOR_RECENCY, FACTOR_LOCATION]
        );
    }

    #[test]
    fn test_blog_score_capped_at_one() {
        let now = Utc::now();
        let weights = ScoringWeights {
            popularity: 0.5,
            location: 0.5,
            ..ScoringWeights::default()
        };
        let blog = Blog::new(&UserProfile::new("Ren"), "Viral", now)
            .in_country("TH")
            .with_engagement(100_000, 10_000);

        let scored = score_blog(&blog, &traveler(), Reason::Trending, &weights, now);
        assert_eq!(scored.score, 1.0);
    }

    #[test]
    fn test_blog_score_old_unpopular_stays_at_base() {
        let now = Utc::now();
        let blog = Blog::new(&UserProfile::new("Ren"), "Old", now - Duration::days(45))
            .in_country("FR");

        let scored = score_blog(
            &blog,
            &traveler(),
            Reason::Trending,
            &ScoringWeights::default(),
            now,
        );
        assert_eq!(scored.score, 0.5);
        assert!(scored.factors.is_empty());
    }

    #[test]
    fn test_blog_recency_decays_linearly() {
        let now = Utc::now();
        let blog = Blog::new(&UserProfile::new("Ren"), "Mid", now - Duration::days(15));

        let scored = score_blog(
            &blog,
            &UserProfile::new("Nobody"),
            Reason::Trending,
            &ScoringWeights::default(),
            now,
        );
        assert!((scored.score - (0.5 + 0.5 * 0.15)).abs() < 1e-9);
    }

    #[test]
    fn test_package_budget_boundary_gets_bonus() {
        let now = Utc::now();
        let profile = traveler().with_budget(BudgetTier::MidRange);
        let package = Package::new(Uuid::new_v4(), "Bangkok week", "TH", 1000.0, now);

        let scored = score_package(
            &package,
            &profile,
            Reason::PriceRange,
            &ScoringWeights::default(),
        );

        assert!((scored.score - 0.95).abs() < 1e-9);
        assert_eq!(scored.factors, vec![FACTOR_BUDGET, FACTOR_LOCATION]);
    }

    #[test]
    fn test_package_without_budget_tier() {
        let now = Utc::now();
        let package = Package::new(Uuid::new_v4(), "Paris", "FR", 500.0, now);

        let scored = score_package(
            &package,
            &traveler(),
            Reason::PopularAmongSimilarUsers,
            &ScoringWeights::default(),
        );
        assert_eq!(scored.score, 0.5);
    }

    #[test]
    fn test_jaccard_symmetry_and_identity() {
        let a = set(&["JP", "TH", "VN"]);
        let b = set(&["TH", "FR"]);

        assert_eq!(destination_similarity(&a, &b), destination_similarity(&b, &a));
        assert!((destination_similarity(&a, &b) - 0.25).abs() < 1e-9);
        assert_eq!(destination_similarity(&a, &a), 1.0);
        assert_eq!(destination_similarity(&set(&[]), &set(&[])), 0.0);
        assert_eq!(destination_similarity(&a, &set(&[])), 0.0);
    }

    #[test]
    fn test_user_score_is_raw_similarity() {
        let other = UserProfile::new("Mai").with_destinations(["JP"]);
        let scored = score_user(&other, &traveler(), Reason::SimilarInterests);
        assert!((scored.score - 0.5).abs() < 1e-9);
        assert_eq!(scored.factors, vec![FACTOR_SHARED_DESTINATIONS]);
    }

    #[test]
    fn test_scores_stay_in_bounds() {
        let now = Utc::now();
        let profile = traveler().with_budget(BudgetTier::Luxury);
        let weights = ScoringWeights::default();
        let author = UserProfile::new("Ren");

        for (views, likes, days) in [(0, 0, 400), (10, 1, 0), (5000, 900, 2), (0, 0, -3)] {
            let blog = Blog::new(&author, "x", now - Duration::days(days))
                .in_country("JP")
                .with_engagement(views, likes);
            let score = clamp_score(score_blog(&blog, &profile, Reason::Trending, &weights, now).score);
            assert!((0.0..=1.0).contains(&score));
        }

        for price in [0.0, 2999.0, 3000.0, 10_000.0, 50_000.0] {
            let package = Package::new(Uuid::new_v4(), "p", "TH", price, now);
            let score = clamp_score(score_package(&package, &profile, Reason::PriceRange, &weights).score);
            assert!((0.0..=1.0).contains(&score));
        }
    }

    #[test]
    fn test_clamp_and_confidence() {
        assert_eq!(clamp_score(1.7), 1.0);
        assert_eq!(clamp_score(-0.2), 0.0);
        assert_eq!(clamp_score(f64::NAN), 0.0);

        assert!((confidence(&Scored::fixed(0.85, "followed_author")) - 0.6).abs() < 1e-9);
        let many = Scored {
            score: 1.0,
            factors: vec!["a", "b", "c", "d", "e", "f"],
        };
        assert_eq!(confidence(&many), 0.95);
    }
}
