//! Read-only analytics endpoints and the cached poll statistic.

use crate::analytics::{self, PollStats, SearchParams};
use crate::chart::{chart_title, png_data_uri};
use crate::db::models::QuestionSummary;
use crate::db::store::PollStore;
use crate::error::{PollError, PollResult};
use crate::extractors::QuestionId;
use crate::startup::AppState;
use axum::{
    extract::{Extension, Json, Query},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ChartResponse {
    pub question_id: Uuid,
    pub question_text: String,
    pub chart: String,
    pub chart_type: &'static str,
}

/// Fetches a question and its choices and computes the breakdown.
pub async fn load_poll_stats(store: &dyn PollStore, question_id: Uuid) -> PollResult<PollStats> {
    let question = store
        .get_question(question_id)
        .await?
        .ok_or(PollError::QuestionNotFound)?;
    let choices = store.get_choices(question_id).await?;

    Ok(analytics::poll_stats(&question, &choices))
}

/// Vote totals and percentages for one poll
pub async fn poll_stats(
    Extension(app_state): Extension<AppState>,
    QuestionId(question_id): QuestionId,
) -> Result<impl IntoResponse, PollError> {
    let stats = load_poll_stats(app_state.store.as_ref(), question_id).await?;
    Ok((StatusCode::OK, Json(stats)))
}

/// Bar chart of the ranked results as a PNG data URI
pub async fn poll_chart(
    Extension(app_state): Extension<AppState>,
    QuestionId(question_id): QuestionId,
) -> Result<impl IntoResponse, PollError> {
    let stats = load_poll_stats(app_state.store.as_ref(), question_id).await?;

    let title = chart_title(&stats.question_text);
    let bars = stats.bars();
    let charts = app_state.charts.clone();
    let png = tokio::task::spawn_blocking(move || charts.render(&title, &bars))
        .await
        .map_err(|e| PollError::Chart(e.to_string()))?
        .map_err(|e| PollError::Chart(e.to_string()))?;

    debug!("rendered chart for poll {question_id}: {} bytes", png.len());

    Ok((
        StatusCode::OK,
        Json(ChartResponse {
            question_id: stats.question_id,
            question_text: stats.question_text,
            chart: png_data_uri(&png),
            chart_type: "bar",
        }),
    ))
}

/// Polls filtered by publish date and sorted by `sort_by`
pub async fn search_polls(
    Extension(app_state): Extension<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, PollError> {
    let query = params.into_query()?;
    let summaries = app_state.store.question_summaries().await?;

    let polls: Vec<QuestionSummary> = analytics::search_polls(summaries, &query);
    Ok((StatusCode::OK, Json(polls)))
}

/// Totals across every poll
pub async fn overall_stats(
    Extension(app_state): Extension<AppState>,
) -> Result<impl IntoResponse, PollError> {
    let summaries = app_state.store.question_summaries().await?;
    Ok((
        StatusCode::OK,
        Json(analytics::overall_stats(&summaries, Utc::now())),
    ))
}

/// Recalculates the cached total of a poll from its live counts
pub async fn refresh_statistic(
    Extension(app_state): Extension<AppState>,
    QuestionId(question_id): QuestionId,
) -> Result<impl IntoResponse, PollError> {
    let stats = load_poll_stats(app_state.store.as_ref(), question_id).await?;

    let statistic = app_state
        .store
        .save_statistic(question_id, stats.total_votes, Utc::now())
        .await?;
    info!(
        "recalculated statistic for poll {question_id}: {} votes",
        statistic.total_votes
    );

    Ok((StatusCode::OK, Json(statistic)))
}

/// The cached total as last calculated, possibly stale
pub async fn get_statistic(
    Extension(app_state): Extension<AppState>,
    QuestionId(question_id): QuestionId,
) -> Result<impl IntoResponse, PollError> {
    if app_state.store.get_question(question_id).await?.is_none() {
        return Err(PollError::QuestionNotFound);
    }

    let statistic = app_state
        .store
        .get_statistic(question_id)
        .await?
        .ok_or(PollError::StatisticNotFound)?;

    Ok((StatusCode::OK, Json(statistic)))
}
