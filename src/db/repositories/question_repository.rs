use crate::db::connection::DbPool;
use crate::db::models::{Choice, NewQuestion, Question, QuestionSummary};
use sqlx::Error;
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

/// Inserts the question and its choices in one transaction.
pub async fn create_question(
    pool: &DbPool,
    new_question: &NewQuestion,
) -> Result<(Question, Vec<Choice>), Error> {
    let mut tx = pool.begin().await?;

    let question = sqlx::query_as::<_, Question>(
        "INSERT INTO questions (id, question_text, pub_date) VALUES ($1, $2, $3) \
         RETURNING id, question_text, pub_date",
    )
    .bind(Uuid::new_v4())
    .bind(&new_question.question_text)
    .bind(new_question.pub_date)
    .fetch_one(&mut *tx)
    .await?;

    let mut choices = Vec::with_capacity(new_question.choices.len());
    for (position, choice_text) in new_question.choices.iter().enumerate() {
        let choice = sqlx::query_as::<_, Choice>(
            "INSERT INTO choices (id, question_id, choice_text, position) VALUES ($1, $2, $3, $4) \
             RETURNING id, question_id, choice_text, votes",
        )
        .bind(Uuid::new_v4())
        .bind(question.id)
        .bind(choice_text)
        .bind(position as i32)
        .fetch_one(&mut *tx)
        .await?;
        choices.push(choice);
    }

    tx.commit().await?;
    Ok((question, choices))
}

pub async fn get_question(pool: &DbPool, question_id: Uuid) -> Result<Option<Question>, Error> {
    let row = sqlx::query_as::<_, Question>(
        "SELECT id, question_text, pub_date FROM questions WHERE id = $1",
    )
    .bind(question_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn get_published_questions(
    pool: &DbPool,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<Question>, Error> {
    let rows = sqlx::query_as::<_, Question>(
        "SELECT id, question_text, pub_date FROM questions WHERE pub_date <= $1 \
         ORDER BY pub_date DESC LIMIT $2",
    )
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Choices and the cached statistic go with the question via `ON DELETE CASCADE`.
pub async fn delete_question(pool: &DbPool, question_id: Uuid) -> Result<bool, Error> {
    let result = sqlx::query("DELETE FROM questions WHERE id = $1")
        .bind(question_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn get_question_summaries(pool: &DbPool) -> Result<Vec<QuestionSummary>, Error> {
    // SUM over BIGINT yields NUMERIC in Postgres, hence the cast.
    let rows = sqlx::query_as::<_, QuestionSummary>(
        r#"
        SELECT q.id, q.question_text, q.pub_date,
               COALESCE(SUM(c.votes), 0)::BIGINT AS total_votes
        FROM questions q
        LEFT JOIN choices c ON c.question_id = q.id
        GROUP BY q.id, q.question_text, q.pub_date
        ORDER BY q.pub_date DESC, q.id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
