use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, types::Json, FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::store::{
    BlogOrder, BlogQuery, DocumentStore, PackageOrder, PackageQuery, RecommendationQuery,
    UserQuery,
};
use crate::{
    error::{AppError, AppResult},
    models::{
        Blog, BudgetTier, ContextualInfo, CountryCount, Destination, InteractionUpdate, Package,
        Reason, Recommendation, RecommendationMetadata, Target, TargetEntity, TravelerSummary,
        TripPlan, UserInteraction, UserProfile, UserRole,
    },
};

const RECOMMENDATION_COLUMNS: &str = "id, user_id, target_model, target_id, reason, score, \
     metadata, user_interaction, contextual_info, created_at, updated_at, expires_at";

const BLOG_SELECT: &str = "SELECT b.id, b.author_id, u.name AS author_name, b.title, b.country, \
     b.published, b.views, b.likes, b.created_at, b.published_at \
     FROM blogs b JOIN users u ON u.id = b.author_id";

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Document store backed by Postgres
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects and brings the schema up to date
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = create_pool(database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations applied");
        Ok(Self::new(pool))
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    role: String,
    preferred_destinations: Vec<String>,
    favorite_countries: Vec<String>,
    travel_style: Option<String>,
    budget_tier: Option<String>,
    following: Vec<Uuid>,
    location: Option<String>,
}

impl TryFrom<UserRow> for UserProfile {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = UserRole::parse(&row.role)
            .ok_or_else(|| AppError::Internal(format!("Unknown user role: {}", row.role)))?;
        // An unrecognised tier disables budget matching rather than failing the profile
        let budget_tier = row.budget_tier.as_deref().and_then(BudgetTier::parse);

        Ok(UserProfile {
            id: row.id,
            name: row.name,
            role,
            preferred_destinations: row.preferred_destinations.into_iter().collect(),
            favorite_countries: row.favorite_countries.into_iter().collect(),
            travel_style: row.travel_style,
            budget_tier,
            following: row.following.into_iter().collect(),
            location: row.location,
        })
    }
}

#[derive(Debug, FromRow)]
struct BlogRow {
    id: Uuid,
    author_id: Uuid,
    author_name: String,
    title: String,
    country: Option<String>,
    published: bool,
    views: i64,
    likes: i64,
    created_at: DateTime<Utc>,
    published_at: Option<DateTime<Utc>>,
}

impl From<BlogRow> for Blog {
    fn from(row: BlogRow) -> Self {
        Blog {
            id: row.id,
            author_id: row.author_id,
            author_name: row.author_name,
            title: row.title,
            country: row.country,
            published: row.published,
            views: row.views.max(0) as u64,
            likes: row.likes.max(0) as u64,
            created_at: row.created_at,
            published_at: row.published_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct PackageRow {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    country: String,
    price: f64,
    booking_count: i64,
    created_at: DateTime<Utc>,
}

impl From<PackageRow> for Package {
    fn from(row: PackageRow) -> Self {
        Package {
            id: row.id,
            owner_id: row.owner_id,
            title: row.title,
            country: row.country,
            price: row.price,
            booking_count: row.booking_count.max(0) as u64,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct RecommendationRow {
    id: Uuid,
    user_id: Uuid,
    target_model: String,
    target_id: String,
    reason: String,
    score: f64,
    metadata: Json<RecommendationMetadata>,
    user_interaction: Json<UserInteraction>,
    contextual_info: Json<ContextualInfo>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<RecommendationRow> for Recommendation {
    type Error = AppError;

    fn try_from(row: RecommendationRow) -> Result<Self, Self::Error> {
        let target = Target::from_parts(&row.target_model, &row.target_id).ok_or_else(|| {
            AppError::Internal(format!(
                "Invalid target {}:{} on recommendation {}",
                row.target_model, row.target_id, row.id
            ))
        })?;
        let reason = Reason::parse(&row.reason)
            .ok_or_else(|| AppError::Internal(format!("Unknown reason: {}", row.reason)))?;

        Ok(Recommendation {
            id: row.id,
            user_id: row.user_id,
            target,
            reason,
            score: row.score,
            metadata: row.metadata.0,
            user_interaction: row.user_interaction.0,
            contextual_info: row.contextual_info.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
            expires_at: row.expires_at,
        })
    }
}

fn push_recommendation_filters<'a>(
    builder: &mut QueryBuilder<'a, Postgres>,
    query: &RecommendationQuery,
) {
    builder.push(" WHERE expires_at > ").push_bind(query.now);
    if let Some(user_id) = query.user_id {
        builder.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(kind) = query.kind {
        builder.push(" AND rec_type = ").push_bind(kind.as_str());
    }
    if let Some(reason) = query.reason {
        builder.push(" AND reason = ").push_bind(reason.as_str());
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn get_user(&self, id: Uuid) -> AppResult<Option<UserProfile>> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, name, role, preferred_destinations, favorite_countries,
                   travel_style, budget_tier, following, location
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserProfile::try_from).transpose()
    }

    async fn find_published_blogs(&self, query: &BlogQuery) -> AppResult<Vec<Blog>> {
        let mut builder = QueryBuilder::<Postgres>::new(BLOG_SELECT);
        builder.push(" WHERE b.published = TRUE");

        if let Some(countries) = &query.countries {
            builder
                .push(" AND b.country = ANY(")
                .push_bind(countries.clone())
                .push(")");
        }
        if let Some(authors) = &query.authors {
            builder
                .push(" AND b.author_id = ANY(")
                .push_bind(authors.clone())
                .push(")");
        }
        if let Some(author) = query.exclude_author {
            builder.push(" AND b.author_id <> ").push_bind(author);
        }
        if let Some(after) = query.created_after {
            builder.push(" AND b.created_at >= ").push_bind(after);
        }

        builder.push(match query.order {
            BlogOrder::Newest => " ORDER BY COALESCE(b.published_at, b.created_at) DESC",
            BlogOrder::Popularity => " ORDER BY b.views DESC, b.likes DESC, b.created_at DESC",
        });
        builder.push(" LIMIT ").push_bind(query.limit as i64);

        let rows = builder.build_query_as::<BlogRow>().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Blog::from).collect())
    }

    async fn find_packages(&self, query: &PackageQuery) -> AppResult<Vec<Package>> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT id, owner_id, title, country, price, booking_count, created_at \
             FROM packages WHERE TRUE",
        );

        if let Some((min, max)) = query.price_range {
            builder
                .push(" AND price BETWEEN ")
                .push_bind(min)
                .push(" AND ")
                .push_bind(max);
        }
        if let Some(countries) = &query.countries {
            builder
                .push(" AND country = ANY(")
                .push_bind(countries.clone())
                .push(")");
        }
        if let Some(after) = query.created_after {
            builder.push(" AND created_at >= ").push_bind(after);
        }
        if let Some(owner) = query.exclude_owner {
            builder.push(" AND owner_id <> ").push_bind(owner);
        }

        builder.push(match query.order {
            PackageOrder::Newest => " ORDER BY created_at DESC",
            PackageOrder::Bookings => " ORDER BY booking_count DESC, created_at DESC",
        });
        builder.push(" LIMIT ").push_bind(query.limit as i64);

        let rows = builder.build_query_as::<PackageRow>().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Package::from).collect())
    }

    async fn find_users(&self, query: &UserQuery) -> AppResult<Vec<UserProfile>> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT id, name, role, preferred_destinations, favorite_countries, \
             travel_style, budget_tier, following, location FROM users WHERE NOT (id = ANY(",
        );
        builder.push_bind(query.exclude.clone()).push("))");

        if let Some(countries) = &query.sharing_destinations {
            builder
                .push(" AND preferred_destinations && ")
                .push_bind(countries.clone());
        }
        if let Some(role) = query.role {
            builder.push(" AND role = ").push_bind(role.as_str());
        }

        builder.push(" ORDER BY name, id LIMIT ");
        builder.push_bind(query.limit as i64);

        let rows = builder.build_query_as::<UserRow>().fetch_all(&self.pool).await?;
        rows.into_iter().map(UserProfile::try_from).collect()
    }

    async fn top_blog_countries(
        &self,
        exclude: &[String],
        limit: usize,
    ) -> AppResult<Vec<CountryCount>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT country, COUNT(*) AS blog_count
            FROM blogs
            WHERE published = TRUE
              AND country IS NOT NULL
              AND NOT (country = ANY($1))
            GROUP BY country
            ORDER BY blog_count DESC, country ASC
            LIMIT $2
            "#,
        )
        .bind(exclude.to_vec())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(country, blog_count)| CountryCount {
                country,
                blog_count: blog_count.max(0) as u64,
            })
            .collect())
    }

    async fn resolve_target(&self, target: &Target) -> AppResult<Option<TargetEntity>> {
        let entity = match target {
            Target::Blog(id) => {
                let row: Option<BlogRow> =
                    sqlx::query_as(&format!("{} WHERE b.id = $1", BLOG_SELECT))
                        .bind(id)
                        .fetch_optional(&self.pool)
                        .await?;
                row.map(|row| TargetEntity::Blog(row.into()))
            }
            Target::Package(id) => {
                let row: Option<PackageRow> = sqlx::query_as(
                    "SELECT id, owner_id, title, country, price, booking_count, created_at \
                     FROM packages WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
                row.map(|row| TargetEntity::Package(row.into()))
            }
            Target::Country(code) => {
                let row: Option<(String, String)> =
                    sqlx::query_as("SELECT code, name FROM countries WHERE code = $1")
                        .bind(code)
                        .fetch_optional(&self.pool)
                        .await?;
                let (code, name) = row.unwrap_or_else(|| (code.clone(), code.clone()));
                Some(TargetEntity::Country(Destination { code, name }))
            }
            Target::User(id) => self
                .get_user(*id)
                .await?
                .map(|user| TargetEntity::User(TravelerSummary::from(&user))),
            Target::TripPlan(id) => {
                let row: Option<(Uuid, Uuid, String, String)> = sqlx::query_as(
                    "SELECT id, owner_id, title, country FROM trip_plans WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
                row.map(|(id, owner_id, title, country)| {
                    TargetEntity::TripPlan(TripPlan {
                        id,
                        owner_id,
                        title,
                        country,
                    })
                })
            }
        };

        Ok(entity)
    }

    async fn get_recommendation(&self, id: Uuid) -> AppResult<Option<Recommendation>> {
        let row: Option<RecommendationRow> = sqlx::query_as(&format!(
            "SELECT {} FROM recommendations WHERE id = $1",
            RECOMMENDATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Recommendation::try_from).transpose()
    }

    async fn update_interaction(
        &self,
        id: Uuid,
        update: &InteractionUpdate,
        at: DateTime<Utc>,
    ) -> AppResult<Recommendation> {
        let mut tx = self.pool.begin().await?;

        let row: Option<RecommendationRow> = sqlx::query_as(&format!(
            "SELECT {} FROM recommendations WHERE id = $1 FOR UPDATE",
            RECOMMENDATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let mut recommendation = row
            .map(Recommendation::try_from)
            .transpose()?
            .ok_or_else(|| AppError::NotFound(format!("Recommendation {} not found", id)))?;
        recommendation.apply_update(update, at);

        sqlx::query(
            r#"
            UPDATE recommendations
            SET user_interaction = $2, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Json(&recommendation.user_interaction))
        .bind(recommendation.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(recommendation)
    }

    async fn upsert_recommendations(
        &self,
        recommendations: Vec<Recommendation>,
    ) -> AppResult<Vec<Recommendation>> {
        let sql = format!(
            r#"
            INSERT INTO recommendations (
                id, user_id, rec_type, target_model, target_id, reason, score,
                metadata, user_interaction, contextual_info, created_at, updated_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (user_id, target_model, target_id, reason) DO UPDATE SET
                score = EXCLUDED.score,
                metadata = EXCLUDED.metadata,
                contextual_info = EXCLUDED.contextual_info,
                updated_at = EXCLUDED.updated_at,
                expires_at = EXCLUDED.expires_at
            RETURNING {}
            "#,
            RECOMMENDATION_COLUMNS
        );

        let mut tx = self.pool.begin().await?;
        let mut persisted = Vec::with_capacity(recommendations.len());

        for rec in &recommendations {
            let row: RecommendationRow = sqlx::query_as(&sql)
                .bind(rec.id)
                .bind(rec.user_id)
                .bind(rec.kind().as_str())
                .bind(rec.target.model())
                .bind(rec.target.to_string())
                .bind(rec.reason.as_str())
                .bind(rec.score)
                .bind(Json(&rec.metadata))
                .bind(Json(&rec.user_interaction))
                .bind(Json(&rec.contextual_info))
                .bind(rec.created_at)
                .bind(rec.updated_at)
                .bind(rec.expires_at)
                .fetch_one(&mut *tx)
                .await?;
            persisted.push(Recommendation::try_from(row)?);
        }

        tx.commit().await?;
        Ok(persisted)
    }

    async fn delete_expired_recommendations(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result =
            sqlx::query("DELETE FROM recommendations WHERE user_id = $1 AND expires_at <= $2")
                .bind(user_id)
                .bind(now)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn delete_recommendations_created_before(
        &self,
        user_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result =
            sqlx::query("DELETE FROM recommendations WHERE user_id = $1 AND created_at < $2")
                .bind(user_id)
                .bind(cutoff)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn list_recommendations(
        &self,
        query: &RecommendationQuery,
    ) -> AppResult<(Vec<Recommendation>, u64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM recommendations");
        push_recommendation_filters(&mut count, query);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM recommendations",
            RECOMMENDATION_COLUMNS
        ));
        push_recommendation_filters(&mut select, query);
        select
            .push(" ORDER BY score DESC, created_at DESC, id LIMIT ")
            .push_bind(query.limit as i64)
            .push(" OFFSET ")
            .push_bind(query.offset as i64);

        let rows = select
            .build_query_as::<RecommendationRow>()
            .fetch_all(&self.pool)
            .await?;
        let items = rows
            .into_iter()
            .map(Recommendation::try_from)
            .collect::<AppResult<Vec<_>>>()?;

        Ok((items, total.max(0) as u64))
    }

    async fn recommendations_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Recommendation>> {
        let rows: Vec<RecommendationRow> = sqlx::query_as(&format!(
            "SELECT {} FROM recommendations WHERE user_id = $1 AND expires_at > $2",
            RECOMMENDATION_COLUMNS
        ))
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Recommendation::try_from).collect()
    }
}
