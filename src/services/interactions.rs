use uuid::Uuid;

use crate::{
    clock::Clock,
    db::store::DocumentStore,
    error::{AppError, AppResult},
    models::{Feedback, InteractionType, InteractionUpdate, Recommendation},
};

const MAX_FEEDBACK_CHARS: usize = 1000;

/// Checks that a live recommendation exists and belongs to the requester
async fn ensure_owned(
    store: &dyn DocumentStore,
    clock: &dyn Clock,
    requester: Uuid,
    recommendation_id: Uuid,
) -> AppResult<()> {
    let recommendation = store
        .get_recommendation(recommendation_id)
        .await?
        .filter(|recommendation| !recommendation.is_expired(clock.now()))
        .ok_or_else(|| {
            AppError::NotFound(format!("Recommendation {} not found", recommendation_id))
        })?;

    if recommendation.user_id != requester {
        tracing::warn!(
            requester = %requester,
            recommendation_id = %recommendation_id,
            "Rejected access to another user's recommendation"
        );
        return Err(AppError::Forbidden(
            "Not authorized to modify this recommendation".to_string(),
        ));
    }

    Ok(())
}

/// Records an implicit interaction on one of the requester's recommendations
#[tracing::instrument(skip(store, clock))]
pub async fn mark_interaction(
    store: &dyn DocumentStore,
    clock: &dyn Clock,
    requester: Uuid,
    recommendation_id: Uuid,
    interaction: InteractionType,
) -> AppResult<Recommendation> {
    ensure_owned(store, clock, requester, recommendation_id).await?;

    let recommendation = store
        .update_interaction(
            recommendation_id,
            &InteractionUpdate::Interaction(interaction),
            clock.now(),
        )
        .await?;

    tracing::info!(
        interaction_score = recommendation.user_interaction.interaction_score,
        "Interaction recorded"
    );
    Ok(recommendation)
}

/// Trims feedback text and enforces its length limit
fn normalize_feedback(feedback: Feedback) -> AppResult<Feedback> {
    let text = feedback.feedback.map(|text| text.trim().to_string());

    if let Some(text) = &text {
        if text.chars().count() > MAX_FEEDBACK_CHARS {
            return Err(AppError::InvalidInput(format!(
                "Feedback must be at most {} characters",
                MAX_FEEDBACK_CHARS
            )));
        }
    }

    Ok(Feedback {
        helpful: feedback.helpful,
        feedback: text,
    })
}

/// Stores explicit feedback on one of the requester's recommendations
///
/// Fields left out of `feedback` keep their earlier value. Blank text clears it.
#[tracing::instrument(skip(store, clock, feedback))]
pub async fn submit_feedback(
    store: &dyn DocumentStore,
    clock: &dyn Clock,
    requester: Uuid,
    recommendation_id: Uuid,
    feedback: Feedback,
) -> AppResult<Recommendation> {
    let feedback = normalize_feedback(feedback)?;
    ensure_owned(store, clock, requester, recommendation_id).await?;

    let recommendation = store
        .update_interaction(
            recommendation_id,
            &InteractionUpdate::Feedback(feedback),
            clock.now(),
        )
        .await?;

    tracing::info!(helpful = ?recommendation.user_interaction.helpful, "Feedback recorded");
    Ok(recommendation)
}
