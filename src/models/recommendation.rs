use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};
use uuid::Uuid;

use crate::error::AppError;

/// Category of a recommendation, derived from its target
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationType {
    Activity,
    Blog,
    Destination,
    Package,
    User,
}

impl RecommendationType {
    pub fn as_str(self) -> &'static str {
        match self {
            RecommendationType::Activity => "activity",
            RecommendationType::Blog => "blog",
            RecommendationType::Destination => "destination",
            RecommendationType::Package => "package",
            RecommendationType::User => "user",
        }
    }

    /// Collection the targets of this type live in
    pub fn target_model(self) -> &'static str {
        match self {
            RecommendationType::Activity => "TripPlan",
            RecommendationType::Blog => "Blog",
            RecommendationType::Destination => "Country",
            RecommendationType::Package => "Package",
            RecommendationType::User => "User",
        }
    }
}

impl FromStr for RecommendationType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "activity" => Ok(RecommendationType::Activity),
            "blog" => Ok(RecommendationType::Blog),
            "destination" => Ok(RecommendationType::Destination),
            "package" => Ok(RecommendationType::Package),
            "user" => Ok(RecommendationType::User),
            other => Err(AppError::InvalidInput(format!(
                "Unknown recommendation type: {}",
                other
            ))),
        }
    }
}

/// Reference to the recommended entity and the collection it lives in
///
/// The recommendation type is derived from the variant, so a blog target can
/// never be filed under another type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "targetModel", content = "targetId")]
pub enum Target {
    Blog(Uuid),
    Package(Uuid),
    /// Country code
    Country(String),
    User(Uuid),
    TripPlan(Uuid),
}

impl Target {
    pub fn kind(&self) -> RecommendationType {
        match self {
            Target::Blog(_) => RecommendationType::Blog,
            Target::Package(_) => RecommendationType::Package,
            Target::Country(_) => RecommendationType::Destination,
            Target::User(_) => RecommendationType::User,
            Target::TripPlan(_) => RecommendationType::Activity,
        }
    }

    pub fn model(&self) -> &'static str {
        self.kind().target_model()
    }

    /// Rebuilds a target from its stored model name and id
    pub fn from_parts(model: &str, id: &str) -> Option<Self> {
        let uuid = || Uuid::parse_str(id).ok();
        match model {
            "Blog" => uuid().map(Target::Blog),
            "Package" => uuid().map(Target::Package),
            "Country" => Some(Target::Country(id.to_string())),
            "User" => uuid().map(Target::User),
            "TripPlan" => uuid().map(Target::TripPlan),
            _ => None,
        }
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Blog(id) | Target::Package(id) | Target::User(id) | Target::TripPlan(id) => {
                write!(f, "{}", id)
            }
            Target::Country(code) => write!(f, "{}", code),
        }
    }
}

/// Why an entity was recommended
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    SimilarInterests,
    LocationBased,
    Trending,
    FriendsActivity,
    PriceRange,
    Seasonal,
    AiGenerated,
    PopularAmongSimilarUsers,
    RecentlyViewed,
    WishlistSimilar,
}

impl Reason {
    pub fn as_str(self) -> &'static str {
        match self {
            Reason::SimilarInterests => "similar_interests",
            Reason::LocationBased => "location_based",
            Reason::Trending => "trending",
            Reason::FriendsActivity => "friends_activity",
            Reason::PriceRange => "price_range",
            Reason::Seasonal => "seasonal",
            Reason::AiGenerated => "ai_generated",
            Reason::PopularAmongSimilarUsers => "popular_among_similar_users",
            Reason::RecentlyViewed => "recently_viewed",
            Reason::WishlistSimilar => "wishlist_similar",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [
            Reason::SimilarInterests,
            Reason::LocationBased,
            Reason::Trending,
            Reason::FriendsActivity,
            Reason::PriceRange,
            Reason::Seasonal,
            Reason::AiGenerated,
            Reason::PopularAmongSimilarUsers,
            Reason::RecentlyViewed,
            Reason::WishlistSimilar,
        ]
        .into_iter()
        .find(|reason| reason.as_str() == value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationMetadata {
    pub confidence: f64,
    /// Tags of every scoring factor that contributed
    pub factors: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserInteraction {
    pub viewed: bool,
    pub viewed_at: Option<DateTime<Utc>>,
    pub clicked: bool,
    pub clicked_at: Option<DateTime<Utc>>,
    pub liked: bool,
    pub liked_at: Option<DateTime<Utc>>,
    pub dismissed: bool,
    pub dismissed_at: Option<DateTime<Utc>>,
    /// Running engagement signal; unbounded in both directions
    pub interaction_score: f64,
    pub helpful: Option<bool>,
    pub feedback: Option<String>,
    pub feedback_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContextualInfo {
    pub personalized_reason: Option<String>,
    pub is_trending: bool,
    pub user_location: Option<String>,
}

/// Implicit user response to a recommendation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InteractionType {
    Viewed,
    Clicked,
    Liked,
    Dismissed,
}

impl InteractionType {
    /// Change applied to the interaction score
    pub fn delta(self) -> f64 {
        match self {
            InteractionType::Viewed => 0.1,
            InteractionType::Clicked => 0.3,
            InteractionType::Liked => 0.5,
            InteractionType::Dismissed => -0.2,
        }
    }
}

impl FromStr for InteractionType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "viewed" => Ok(InteractionType::Viewed),
            "clicked" => Ok(InteractionType::Clicked),
            "liked" => Ok(InteractionType::Liked),
            "dismissed" => Ok(InteractionType::Dismissed),
            other => Err(AppError::InvalidInput(format!(
                "Invalid interaction type: {}",
                other
            ))),
        }
    }
}

/// Explicit qualitative feedback on a recommendation
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Feedback {
    pub helpful: Option<bool>,
    pub feedback: Option<String>,
}

/// A scored recommendation persisted for one user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(flatten)]
    pub target: Target,
    pub reason: Reason,
    pub score: f64,
    pub metadata: RecommendationMetadata,
    pub user_interaction: UserInteraction,
    pub contextual_info: ContextualInfo,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Recommendation {
    pub fn kind(&self) -> RecommendationType {
        self.target.kind()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Records an interaction and adjusts the running score
    pub fn apply_interaction(&mut self, interaction: InteractionType, at: DateTime<Utc>) {
        let state = &mut self.user_interaction;
        let (flag, timestamp) = match interaction {
            InteractionType::Viewed => (&mut state.viewed, &mut state.viewed_at),
            InteractionType::Clicked => (&mut state.clicked, &mut state.clicked_at),
            InteractionType::Liked => (&mut state.liked, &mut state.liked_at),
            InteractionType::Dismissed => (&mut state.dismissed, &mut state.dismissed_at),
        };
        *flag = true;
        *timestamp = Some(at);
        state.interaction_score += interaction.delta();
        self.updated_at = at;
    }

    /// Records feedback, overwriting only the fields that were sent
    ///
    /// Empty feedback text clears any earlier text.
    pub fn apply_feedback(&mut self, feedback: Feedback, at: DateTime<Utc>) {
        let state = &mut self.user_interaction;
        if let Some(helpful) = feedback.helpful {
            state.helpful = Some(helpful);
        }
        if let Some(text) = feedback.feedback {
            state.feedback = Some(text).filter(|text| !text.is_empty());
        }
        state.feedback_at = Some(at);
        self.updated_at = at;
    }

    pub fn apply_update(&mut self, update: &InteractionUpdate, at: DateTime<Utc>) {
        match update {
            InteractionUpdate::Interaction(interaction) => self.apply_interaction(*interaction, at),
            InteractionUpdate::Feedback(feedback) => self.apply_feedback(feedback.clone(), at),
        }
    }
}

/// A change to the interaction state of a stored recommendation
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionUpdate {
    Interaction(InteractionType),
    Feedback(Feedback),
}
