use crate::db::connection::DbPool;
use crate::db::models::Choice;
use sqlx::{Error, Row};
use uuid::Uuid;

pub async fn get_choices(pool: &DbPool, question_id: Uuid) -> Result<Vec<Choice>, Error> {
    let rows = sqlx::query(
        "SELECT id, question_id, choice_text, votes FROM choices WHERE question_id = $1 \
         ORDER BY position, id",
    )
    .bind(question_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| Choice {
            id: r.get("id"),
            question_id: r.get("question_id"),
            choice_text: r.get("choice_text"),
            votes: r.get("votes"),
        })
        .collect())
}

/// Single-statement increment, so concurrent ballots never overwrite each
/// other. Returns `None` when the choice does not exist under `question_id`.
pub async fn increment_votes(
    pool: &DbPool,
    question_id: Uuid,
    choice_id: Uuid,
) -> Result<Option<i64>, Error> {
    let row = sqlx::query(
        "UPDATE choices SET votes = votes + 1 WHERE id = $1 AND question_id = $2 RETURNING votes",
    )
    .bind(choice_id)
    .bind(question_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.get::<i64, _>("votes")))
}

pub async fn reset_votes(pool: &DbPool, question_id: Uuid) -> Result<u64, Error> {
    let result = sqlx::query("UPDATE choices SET votes = 0 WHERE question_id = $1")
        .bind(question_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
