use serde::Deserialize;
use std::time::Duration;

use crate::services::{generator::EngineConfig, scoring::ScoringWeights};

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// PostgreSQL connection URL; the in-memory store is used when unset
    #[serde(default)]
    pub database_url: Option<String>,

    /// Redis connection URL for the trending cache
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_similarity_weight")]
    pub similarity_weight: f64,

    #[serde(default = "default_popularity_weight")]
    pub popularity_weight: f64,

    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,

    #[serde(default = "default_location_weight")]
    pub location_weight: f64,

    #[serde(default = "default_interest_weight")]
    pub interest_weight: f64,

    /// Days until a generated recommendation expires
    #[serde(default = "default_recommendation_ttl_days")]
    pub recommendation_ttl_days: i64,

    /// Age after which a manual refresh purges recommendations
    #[serde(default = "default_refresh_max_age_hours")]
    pub refresh_max_age_hours: i64,

    /// Upper bound for a single generation run
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,

    /// TTL of cached trending results
    #[serde(default = "default_trending_cache_ttl_secs")]
    pub trending_cache_ttl_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_similarity_weight() -> f64 {
    ScoringWeights::default().similarity
}

fn default_popularity_weight() -> f64 {
    ScoringWeights::default().popularity
}

fn default_recency_weight() -> f64 {
    ScoringWeights::default().recency
}

fn default_location_weight() -> f64 {
    ScoringWeights::default().location
}

fn default_interest_weight() -> f64 {
    ScoringWeights::default().interest
}

fn default_recommendation_ttl_days() -> i64 {
    7
}

fn default_refresh_max_age_hours() -> i64 {
    24
}

fn default_generation_timeout_secs() -> u64 {
    30
}

fn default_trending_cache_ttl_secs() -> u64 {
    300
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    pub fn scoring_weights(&self) -> ScoringWeights {
        ScoringWeights {
            similarity: self.similarity_weight,
            popularity: self.popularity_weight,
            recency: self.recency_weight,
            location: self.location_weight,
            interest: self.interest_weight,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            weights: self.scoring_weights(),
            recommendation_ttl: chrono::Duration::days(self.recommendation_ttl_days),
            refresh_max_age: chrono::Duration::hours(self.refresh_max_age_hours),
            generation_timeout: Duration::from_secs(self.generation_timeout_secs),
        }
    }
}
