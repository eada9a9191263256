use crate::polls::BallotForm;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PollError {
    #[error("Question not found")]
    QuestionNotFound,
    #[error("Statistic has not been calculated yet")]
    StatisticNotFound,
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("{}", .form.error_message)]
    InvalidBallot { form: Box<BallotForm> },
    #[error("Chart rendering failed: {0}")]
    Chart(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

pub type PollResult<T> = Result<T, PollError>;

impl IntoResponse for PollError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            PollError::QuestionNotFound => (StatusCode::NOT_FOUND, "Question not found"),
            PollError::StatisticNotFound => (StatusCode::NOT_FOUND, "Statistic not found"),
            PollError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "Invalid request"),
            PollError::InvalidBallot { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "Invalid ballot"),
            PollError::Chart(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Chart rendering failed"),
            PollError::DatabaseError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
        };

        if let PollError::InvalidBallot { form } = self {
            return (status, Json(*form)).into_response();
        }

        if status.is_server_error() {
            error!("{self}");
        }

        let body = Json(json!({
            "error": error_message,
            "details": self.to_string()
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for PollError {
    fn from(error: sqlx::Error) -> Self {
        PollError::DatabaseError(error.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}
