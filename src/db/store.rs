use crate::db::connection::{DbPool, get_pool_stats};
use crate::db::models::{Choice, NewQuestion, PollStatistic, Question, QuestionSummary};
use crate::db::repositories;
use crate::error::{PollError, PollResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::{Duration, interval};
use uuid::Uuid;

/// Data access used by every handler. Implementations must make
/// `record_vote` an atomic increment at the storage layer.
#[async_trait]
pub trait PollStore: Send + Sync {
    async fn create_question(&self, new_question: NewQuestion)
    -> PollResult<(Question, Vec<Choice>)>;

    async fn get_question(&self, question_id: Uuid) -> PollResult<Option<Question>>;

    /// Questions with `pub_date <= now`, newest first.
    async fn published_questions(&self, now: DateTime<Utc>, limit: usize)
    -> PollResult<Vec<Question>>;

    /// Choices of a question in creation order.
    async fn get_choices(&self, question_id: Uuid) -> PollResult<Vec<Choice>>;

    /// Adds one vote and returns the new count, or `None` if the choice does
    /// not exist under `question_id`.
    async fn record_vote(&self, question_id: Uuid, choice_id: Uuid) -> PollResult<Option<i64>>;

    /// Administrative reset of every choice of the question to zero.
    async fn reset_votes(&self, question_id: Uuid) -> PollResult<u64>;

    /// Returns false when nothing was deleted.
    async fn delete_question(&self, question_id: Uuid) -> PollResult<bool>;

    /// Every question with its vote total, from a single aggregate pass,
    /// ordered by `pub_date` descending.
    async fn question_summaries(&self) -> PollResult<Vec<QuestionSummary>>;

    async fn save_statistic(
        &self,
        question_id: Uuid,
        total_votes: i64,
        calculated_at: DateTime<Utc>,
    ) -> PollResult<PollStatistic>;

    async fn get_statistic(&self, question_id: Uuid) -> PollResult<Option<PollStatistic>>;
}

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Periodically checks that the pool can still hand out connections.
    pub fn spawn_health_check(&self) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                match pool.acquire().await {
                    Ok(conn) => {
                        drop(conn);
                        debug!("{}", get_pool_stats(&pool));
                    }
                    Err(e) => {
                        error!("Database connection health check failed: {}", e);
                    }
                }
            }
        });
    }
}

#[async_trait]
impl PollStore for PgStore {
    async fn create_question(
        &self,
        new_question: NewQuestion,
    ) -> PollResult<(Question, Vec<Choice>)> {
        Ok(repositories::create_question(&self.pool, &new_question).await?)
    }

    async fn get_question(&self, question_id: Uuid) -> PollResult<Option<Question>> {
        Ok(repositories::get_question(&self.pool, question_id).await?)
    }

    async fn published_questions(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> PollResult<Vec<Question>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        Ok(repositories::get_published_questions(&self.pool, now, limit).await?)
    }

    async fn get_choices(&self, question_id: Uuid) -> PollResult<Vec<Choice>> {
        Ok(repositories::get_choices(&self.pool, question_id).await?)
    }

    async fn record_vote(&self, question_id: Uuid, choice_id: Uuid) -> PollResult<Option<i64>> {
        Ok(repositories::increment_votes(&self.pool, question_id, choice_id).await?)
    }

    async fn reset_votes(&self, question_id: Uuid) -> PollResult<u64> {
        Ok(repositories::reset_votes(&self.pool, question_id).await?)
    }

    async fn delete_question(&self, question_id: Uuid) -> PollResult<bool> {
        Ok(repositories::delete_question(&self.pool, question_id).await?)
    }

    async fn question_summaries(&self) -> PollResult<Vec<QuestionSummary>> {
        Ok(repositories::get_question_summaries(&self.pool).await?)
    }

    async fn save_statistic(
        &self,
        question_id: Uuid,
        total_votes: i64,
        calculated_at: DateTime<Utc>,
    ) -> PollResult<PollStatistic> {
        repositories::upsert_statistic(&self.pool, question_id, total_votes, calculated_at)
            .await
            .map_err(question_gone)
    }

    async fn get_statistic(&self, question_id: Uuid) -> PollResult<Option<PollStatistic>> {
        Ok(repositories::get_statistic(&self.pool, question_id).await?)
    }
}

/// The question was deleted between reading its votes and saving the
/// statistic; report it the way a missing question is reported elsewhere.
fn question_gone(error: sqlx::Error) -> PollError {
    if let sqlx::Error::Database(db_error) = &error {
        if matches!(db_error.kind(), sqlx::error::ErrorKind::ForeignKeyViolation) {
            return PollError::QuestionNotFound;
        }
    }
    error.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::fmt;

    #[derive(Debug)]
    struct ConstraintError(ErrorKind);

    impl fmt::Display for ConstraintError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "constraint violated")
        }
    }

    impl std::error::Error for ConstraintError {}

    impl DatabaseError for ConstraintError {
        fn message(&self) -> &str {
            "constraint violated"
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            match self.0 {
                ErrorKind::ForeignKeyViolation => ErrorKind::ForeignKeyViolation,
                _ => ErrorKind::Other,
            }
        }
    }

    #[test]
    fn foreign_key_violation_means_the_question_is_gone() {
        let error = sqlx::Error::Database(Box::new(ConstraintError(ErrorKind::ForeignKeyViolation)));
        assert!(matches!(question_gone(error), PollError::QuestionNotFound));
    }

    #[test]
    fn other_database_errors_stay_server_errors() {
        let error = sqlx::Error::Database(Box::new(ConstraintError(ErrorKind::Other)));
        assert!(matches!(question_gone(error), PollError::DatabaseError(_)));
        assert!(matches!(
            question_gone(sqlx::Error::PoolTimedOut),
            PollError::DatabaseError(_)
        ));
    }
}
