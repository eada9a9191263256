use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct VoteRecorded {
    pub question_id: Uuid,
    pub choice_id: Uuid,
    pub votes: i64,
}

#[derive(Debug, Clone)]
pub enum SseEvent {
    VoteRecorded(VoteRecorded),
    VotesReset(Uuid),
    QuestionDeleted(Uuid),
}

impl SseEvent {
    pub fn question_id(&self) -> Uuid {
        match self {
            SseEvent::VoteRecorded(vote) => vote.question_id,
            SseEvent::VotesReset(question_id) | SseEvent::QuestionDeleted(question_id) => {
                *question_id
            }
        }
    }
}

pub type SseSender = tokio::sync::broadcast::Sender<SseEvent>;
