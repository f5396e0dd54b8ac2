use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use super::{UserProfile, UserRole};

/// A travel blog post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Blog {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_name: String,
    pub title: String,
    /// Geotagged country code
    pub country: Option<String>,
    pub published: bool,
    pub views: u64,
    pub likes: u64,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl Blog {
    /// Creates a published blog post
    pub fn new(author: &UserProfile, title: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            author_id: author.id,
            author_name: author.name.clone(),
            title: title.into(),
            country: None,
            published: true,
            views: 0,
            likes: 0,
            created_at,
            published_at: Some(created_at),
        }
    }

    pub fn in_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_engagement(mut self, views: u64, likes: u64) -> Self {
        self.views = views;
        self.likes = likes;
        self
    }

    pub fn draft(mut self) -> Self {
        self.published = false;
        self.published_at = None;
        self
    }

    /// When the post went live, falling back to its creation time
    pub fn published_on(&self) -> DateTime<Utc> {
        self.published_at.unwrap_or(self.created_at)
    }
}

/// A bookable travel package
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub country: String,
    pub price: f64,
    pub booking_count: u64,
    pub created_at: DateTime<Utc>,
}

impl Package {
    pub fn new(
        owner_id: Uuid,
        title: impl Into<String>,
        country: impl Into<String>,
        price: f64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            title: title.into(),
            country: country.into(),
            price,
            booking_count: 0,
            created_at,
        }
    }

    pub fn with_bookings(mut self, booking_count: u64) -> Self {
        self.booking_count = booking_count;
        self
    }
}

/// A country that can be recommended as a destination
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    pub code: String,
    pub name: String,
}

/// Country together with the number of published blogs geotagged there
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryCount {
    pub country: String,
    pub blog_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TripPlan {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub country: String,
}

/// Public projection of a user, safe to hand to other users
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TravelerSummary {
    pub id: Uuid,
    pub name: String,
    pub role: UserRole,
    pub preferred_destinations: BTreeSet<String>,
}

impl From<&UserProfile> for TravelerSummary {
    fn from(profile: &UserProfile) -> Self {
        Self {
            id: profile.id,
            name: profile.name.clone(),
            role: profile.role,
            preferred_destinations: profile.preferred_destinations.clone(),
        }
    }
}

/// The entity a recommendation points at, resolved from the store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "targetModel", content = "entity")]
pub enum TargetEntity {
    Blog(Blog),
    Package(Package),
    Country(Destination),
    User(TravelerSummary),
    TripPlan(TripPlan),
}
