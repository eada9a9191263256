//! Request extractors.

use crate::error::PollError;
use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::request::Parts,
};
use uuid::Uuid;

/// The `:question_id` path segment. A segment that is not a UUID cannot
/// name any poll, so it is rejected as not found rather than bad request.
#[derive(Debug, Clone, Copy)]
pub struct QuestionId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for QuestionId
where
    S: Send + Sync,
{
    type Rejection = PollError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| PollError::QuestionNotFound)?;

        Uuid::parse_str(raw.trim())
            .map(QuestionId)
            .map_err(|_| PollError::QuestionNotFound)
    }
}
