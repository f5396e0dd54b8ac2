mod content;
mod recommendation;
mod user;

pub use content::{Blog, CountryCount, Destination, Package, TargetEntity, TravelerSummary, TripPlan};
pub use recommendation::{
    ContextualInfo, Feedback, InteractionType, InteractionUpdate, Reason, Recommendation,
    RecommendationMetadata, RecommendationType, Target, UserInteraction,
};
pub use user::{BudgetTier, UserProfile, UserRole};
