use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Coarse price bracket chosen by a user
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BudgetTier {
    Budget,
    #[serde(rename = "Mid-range")]
    MidRange,
    Luxury,
}

impl BudgetTier {
    /// Inclusive price range matched by this tier
    pub fn price_range(self) -> (f64, f64) {
        match self {
            BudgetTier::Budget => (0.0, 1000.0),
            BudgetTier::MidRange => (1000.0, 3000.0),
            BudgetTier::Luxury => (3000.0, 10000.0),
        }
    }

    pub fn contains(self, price: f64) -> bool {
        let (min, max) = self.price_range();
        price >= min && price <= max
    }

    pub fn label(self) -> &'static str {
        match self {
            BudgetTier::Budget => "Budget",
            BudgetTier::MidRange => "Mid-range",
            BudgetTier::Luxury => "Luxury",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Budget" => Some(BudgetTier::Budget),
            "Mid-range" => Some(BudgetTier::MidRange),
            "Luxury" => Some(BudgetTier::Luxury),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Traveler,
    Author,
    Admin,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Traveler => "traveler",
            UserRole::Author => "author",
            UserRole::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "traveler" => Some(UserRole::Traveler),
            "author" => Some(UserRole::Author),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

/// A user as seen by the recommendation engine
///
/// Owned by user management; the engine only reads it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub role: UserRole,
    /// Country codes the user wants to travel to
    #[serde(default)]
    pub preferred_destinations: BTreeSet<String>,
    #[serde(default)]
    pub favorite_countries: BTreeSet<String>,
    #[serde(default)]
    pub travel_style: Option<String>,
    #[serde(default)]
    pub budget_tier: Option<BudgetTier>,
    #[serde(default)]
    pub following: BTreeSet<Uuid>,
    #[serde(default)]
    pub location: Option<String>,
}

impl UserProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            role: UserRole::Traveler,
            preferred_destinations: BTreeSet::new(),
            favorite_countries: BTreeSet::new(),
            travel_style: None,
            budget_tier: None,
            following: BTreeSet::new(),
            location: None,
        }
    }

    pub fn with_destinations<I, S>(mut self, countries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preferred_destinations = countries.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_budget(mut self, tier: BudgetTier) -> Self {
        self.budget_tier = Some(tier);
        self
    }

    pub fn with_role(mut self, role: UserRole) -> Self {
        self.role = role;
        self
    }

    pub fn follow(&mut self, user_id: Uuid) {
        self.following.insert(user_id);
    }

    pub fn prefers(&self, country: &str) -> bool {
        self.preferred_destinations.contains(country)
    }
}
