use crate::db::models::{Choice, MAX_TEXT_LEN, NewQuestion, Question};
use crate::error::PollError;
use crate::extractors::QuestionId;
use crate::sse::{SseEvent, VoteRecorded};
use crate::startup::AppState;
use axum::{
    Form,
    extract::{Extension, Json},
    http::{StatusCode, header},
    response::{IntoResponse, Redirect},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Latest published polls shown by the index.
pub const INDEX_LIMIT: usize = 5;
pub const NO_CHOICE_SELECTED: &str = "You didn't select a choice.";

// Request/Response DTOs
#[derive(Debug, Deserialize)]
pub struct CreatePollRequest {
    pub question_text: String,
    pub choices: Vec<String>,
    pub pub_date: Option<DateTime<Utc>>,
}

impl CreatePollRequest {
    /// Trims the texts, drops blank choices and enforces the length limits.
    pub fn validate(self, now: DateTime<Utc>) -> Result<NewQuestion, PollError> {
        let question_text = self.question_text.trim().to_string();
        if question_text.is_empty() {
            return Err(PollError::InvalidRequest("question_text is required".to_string()));
        }
        if question_text.chars().count() > MAX_TEXT_LEN {
            return Err(PollError::InvalidRequest(format!(
                "question_text must be at most {MAX_TEXT_LEN} characters"
            )));
        }

        let choices: Vec<String> = self
            .choices
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        if choices.is_empty() {
            return Err(PollError::InvalidRequest("at least one choice is required".to_string()));
        }
        if let Some(long) = choices.iter().find(|c| c.chars().count() > MAX_TEXT_LEN) {
            return Err(PollError::InvalidRequest(format!(
                "choice '{long}' is longer than {MAX_TEXT_LEN} characters"
            )));
        }

        Ok(NewQuestion {
            question_text,
            pub_date: self.pub_date.unwrap_or(now),
            choices,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct QuestionListItem {
    pub id: Uuid,
    pub question_text: String,
    pub pub_date: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ChoiceResponse {
    pub id: Uuid,
    pub choice_text: String,
}

#[derive(Debug, Serialize)]
pub struct QuestionDetailResponse {
    pub id: Uuid,
    pub question_text: String,
    pub pub_date: DateTime<Utc>,
    pub was_published_recently: bool,
    pub choices: Vec<ChoiceResponse>,
}

impl QuestionDetailResponse {
    fn new(question: &Question, choices: Vec<Choice>, now: DateTime<Utc>) -> Self {
        Self {
            id: question.id,
            question_text: question.question_text.clone(),
            pub_date: question.pub_date,
            was_published_recently: question.was_published_recently(now),
            choices: choices
                .into_iter()
                .map(|c| ChoiceResponse {
                    id: c.id,
                    choice_text: c.choice_text,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChoiceWithVotesResponse {
    pub id: Uuid,
    pub choice_text: String,
    pub votes: i64,
}

#[derive(Debug, Serialize)]
pub struct ResultsResponse {
    pub id: Uuid,
    pub question_text: String,
    pub pub_date: DateTime<Utc>,
    pub total_votes: i64,
    pub choices: Vec<ChoiceWithVotesResponse>,
}

impl ResultsResponse {
    fn new(question: Question, choices: Vec<Choice>) -> Self {
        Self {
            id: question.id,
            question_text: question.question_text,
            pub_date: question.pub_date,
            total_votes: choices.iter().map(|c| c.votes).sum(),
            choices: choices
                .into_iter()
                .map(|c| ChoiceWithVotesResponse {
                    id: c.id,
                    choice_text: c.choice_text,
                    votes: c.votes,
                })
                .collect(),
        }
    }
}

/// The ballot form sent back when a submission cannot be counted.
#[derive(Debug, Serialize)]
pub struct BallotForm {
    pub question: QuestionDetailResponse,
    pub error_message: String,
}

#[derive(Debug, Deserialize)]
pub struct BallotRequest {
    pub choice: Option<String>,
}

async fn find_question(app_state: &AppState, question_id: Uuid) -> Result<Question, PollError> {
    app_state
        .store
        .get_question(question_id)
        .await?
        .ok_or(PollError::QuestionNotFound)
}

/// Like [`find_question`] but hides questions scheduled for the future.
async fn find_published_question(
    app_state: &AppState,
    question_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Question, PollError> {
    let question = find_question(app_state, question_id).await?;
    if !question.is_published(now) {
        return Err(PollError::QuestionNotFound);
    }
    Ok(question)
}

/// Create a new poll with its choices
pub async fn create_poll(
    Extension(app_state): Extension<AppState>,
    Json(payload): Json<CreatePollRequest>,
) -> Result<impl IntoResponse, PollError> {
    let now = Utc::now();
    let new_question = payload.validate(now)?;

    let (question, choices) = app_state.store.create_question(new_question).await?;
    info!(
        "created poll {} with {} choices",
        question.id,
        choices.len()
    );

    let location = format!("/polls/{}", question.id);
    let response = QuestionDetailResponse::new(&question, choices, now);

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(response),
    ))
}

/// Latest published polls, newest first
pub async fn list_polls(
    Extension(app_state): Extension<AppState>,
) -> Result<impl IntoResponse, PollError> {
    let questions = app_state
        .store
        .published_questions(Utc::now(), INDEX_LIMIT)
        .await?;

    let items: Vec<QuestionListItem> = questions
        .into_iter()
        .map(|q| QuestionListItem {
            id: q.id,
            question_text: q.question_text,
            pub_date: q.pub_date,
        })
        .collect();

    Ok((StatusCode::OK, Json(items)))
}

/// A published poll with the choices a voter can pick from
pub async fn poll_detail(
    Extension(app_state): Extension<AppState>,
    QuestionId(question_id): QuestionId,
) -> Result<impl IntoResponse, PollError> {
    let now = Utc::now();
    let question = find_published_question(&app_state, question_id, now).await?;
    let choices = app_state.store.get_choices(question_id).await?;

    Ok((
        StatusCode::OK,
        Json(QuestionDetailResponse::new(&question, choices, now)),
    ))
}

/// A published poll with its current vote counts
pub async fn poll_results(
    Extension(app_state): Extension<AppState>,
    QuestionId(question_id): QuestionId,
) -> Result<impl IntoResponse, PollError> {
    let question = find_published_question(&app_state, question_id, Utc::now()).await?;
    let choices = app_state.store.get_choices(question_id).await?;

    Ok((StatusCode::OK, Json(ResultsResponse::new(question, choices))))
}

/// Cast an anonymous ballot for one choice of the poll
pub async fn vote(
    Extension(app_state): Extension<AppState>,
    QuestionId(question_id): QuestionId,
    ballot: Option<Form<BallotRequest>>,
) -> Result<Redirect, PollError> {
    let question = find_question(&app_state, question_id).await?;

    // An unreadable body is a ballot without a choice
    let submitted = ballot.and_then(|Form(ballot)| ballot.choice);
    let choice_id = submitted
        .as_deref()
        .map(str::trim)
        .and_then(|raw| Uuid::parse_str(raw).ok());

    let recorded = match choice_id {
        Some(choice_id) => app_state
            .store
            .record_vote(question_id, choice_id)
            .await?
            .map(|votes| (choice_id, votes)),
        None => None,
    };

    let Some((choice_id, votes)) = recorded else {
        warn!(
            "rejected ballot for poll {question_id}: choice {:?} not found",
            submitted
        );
        let choices = app_state.store.get_choices(question_id).await?;
        return Err(PollError::InvalidBallot {
            form: Box::new(BallotForm {
                question: QuestionDetailResponse::new(&question, choices, Utc::now()),
                error_message: NO_CHOICE_SELECTED.to_string(),
            }),
        });
    };

    debug!("poll {question_id}: choice {choice_id} now has {votes} votes");
    // No subscribers is fine
    let _ = app_state.events.send(SseEvent::VoteRecorded(VoteRecorded {
        question_id,
        choice_id,
        votes,
    }));

    Ok(Redirect::to(&format!("/polls/{question_id}/results")))
}

/// Administrative reset of every vote count of the poll
pub async fn reset_votes(
    Extension(app_state): Extension<AppState>,
    QuestionId(question_id): QuestionId,
) -> Result<impl IntoResponse, PollError> {
    let question = find_question(&app_state, question_id).await?;

    let reset = app_state.store.reset_votes(question_id).await?;
    info!("reset {reset} choices of poll {question_id}");
    let _ = app_state.events.send(SseEvent::VotesReset(question_id));

    let choices = app_state.store.get_choices(question_id).await?;
    Ok((StatusCode::OK, Json(ResultsResponse::new(question, choices))))
}

/// Delete a poll together with its choices and cached statistic
pub async fn delete_poll(
    Extension(app_state): Extension<AppState>,
    QuestionId(question_id): QuestionId,
) -> Result<impl IntoResponse, PollError> {
    if !app_state.store.delete_question(question_id).await? {
        return Err(PollError::QuestionNotFound);
    }

    info!("deleted poll {question_id}");
    let _ = app_state.events.send(SseEvent::QuestionDeleted(question_id));

    Ok(StatusCode::NO_CONTENT)
}
