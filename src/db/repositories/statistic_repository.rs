use crate::db::connection::DbPool;
use crate::db::models::PollStatistic;
use sqlx::Error;
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

pub async fn upsert_statistic(
    pool: &DbPool,
    question_id: Uuid,
    total_votes: i64,
    calculated_at: DateTime<Utc>,
) -> Result<PollStatistic, Error> {
    let row = sqlx::query_as::<_, PollStatistic>(
        r#"
        INSERT INTO poll_statistics (question_id, total_votes, last_calculated)
        VALUES ($1, $2, $3)
        ON CONFLICT (question_id)
        DO UPDATE SET total_votes = EXCLUDED.total_votes,
                      last_calculated = EXCLUDED.last_calculated
        RETURNING question_id, total_votes, last_calculated
        "#,
    )
    .bind(question_id)
    .bind(total_votes)
    .bind(calculated_at)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn get_statistic(
    pool: &DbPool,
    question_id: Uuid,
) -> Result<Option<PollStatistic>, Error> {
    let row = sqlx::query_as::<_, PollStatistic>(
        "SELECT question_id, total_votes, last_calculated FROM poll_statistics WHERE question_id = $1",
    )
    .bind(question_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}
