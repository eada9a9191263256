use crate::db::models::{Choice, NewQuestion, PollStatistic, Question, QuestionSummary};
use crate::db::store::PollStore;
use crate::error::{PollError, PollResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

struct StoredChoice {
    question_id: Uuid,
    choice_text: String,
    votes: AtomicI64,
}

#[derive(Default)]
struct Tables {
    questions: HashMap<Uuid, Question>,
    choices: HashMap<Uuid, StoredChoice>,
    choice_order: HashMap<Uuid, Vec<Uuid>>,
    statistics: HashMap<Uuid, PollStatistic>,
}

impl Tables {
    fn choices_of(&self, question_id: Uuid) -> Vec<Choice> {
        self.choice_order
            .get(&question_id)
            .into_iter()
            .flatten()
            .filter_map(|id| {
                self.choices.get(id).map(|c| Choice {
                    id: *id,
                    question_id: c.question_id,
                    choice_text: c.choice_text.clone(),
                    votes: c.votes.load(Ordering::SeqCst),
                })
            })
            .collect()
    }

    fn total_votes(&self, question_id: Uuid) -> i64 {
        self.choice_order
            .get(&question_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.choices.get(id))
            .map(|c| c.votes.load(Ordering::SeqCst))
            .sum()
    }
}

/// Process-local store. Vote counts are atomics, so ballots only need the
/// shared read lock and never lose increments.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> PollResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| PollError::DatabaseError("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> PollResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| PollError::DatabaseError("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl PollStore for MemoryStore {
    async fn create_question(
        &self,
        new_question: NewQuestion,
    ) -> PollResult<(Question, Vec<Choice>)> {
        let question = Question {
            id: Uuid::new_v4(),
            question_text: new_question.question_text,
            pub_date: new_question.pub_date,
        };

        let mut tables = self.write()?;
        let mut order = Vec::with_capacity(new_question.choices.len());
        for choice_text in new_question.choices {
            let id = Uuid::new_v4();
            tables.choices.insert(
                id,
                StoredChoice {
                    question_id: question.id,
                    choice_text,
                    votes: AtomicI64::new(0),
                },
            );
            order.push(id);
        }
        tables.choice_order.insert(question.id, order);
        tables.questions.insert(question.id, question.clone());

        let choices = tables.choices_of(question.id);
        Ok((question, choices))
    }

    async fn get_question(&self, question_id: Uuid) -> PollResult<Option<Question>> {
        Ok(self.read()?.questions.get(&question_id).cloned())
    }

    async fn published_questions(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> PollResult<Vec<Question>> {
        let tables = self.read()?;
        let mut questions: Vec<Question> = tables
            .questions
            .values()
            .filter(|q| q.is_published(now))
            .cloned()
            .collect();
        questions.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(a.id.cmp(&b.id)));
        questions.truncate(limit);
        Ok(questions)
    }

    async fn get_choices(&self, question_id: Uuid) -> PollResult<Vec<Choice>> {
        Ok(self.read()?.choices_of(question_id))
    }

    async fn record_vote(&self, question_id: Uuid, choice_id: Uuid) -> PollResult<Option<i64>> {
        let tables = self.read()?;
        Ok(tables
            .choices
            .get(&choice_id)
            .filter(|c| c.question_id == question_id)
            .map(|c| c.votes.fetch_add(1, Ordering::SeqCst) + 1))
    }

    async fn reset_votes(&self, question_id: Uuid) -> PollResult<u64> {
        let tables = self.read()?;
        let mut reset = 0;
        for choice in tables.choices.values().filter(|c| c.question_id == question_id) {
            choice.votes.store(0, Ordering::SeqCst);
            reset += 1;
        }
        Ok(reset)
    }

    async fn delete_question(&self, question_id: Uuid) -> PollResult<bool> {
        let mut tables = self.write()?;
        if tables.questions.remove(&question_id).is_none() {
            return Ok(false);
        }
        if let Some(order) = tables.choice_order.remove(&question_id) {
            for id in order {
                tables.choices.remove(&id);
            }
        }
        tables.statistics.remove(&question_id);
        Ok(true)
    }

    async fn question_summaries(&self) -> PollResult<Vec<QuestionSummary>> {
        let tables = self.read()?;
        let mut summaries: Vec<QuestionSummary> = tables
            .questions
            .values()
            .map(|q| QuestionSummary {
                id: q.id,
                question_text: q.question_text.clone(),
                pub_date: q.pub_date,
                total_votes: tables.total_votes(q.id),
            })
            .collect();
        summaries.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(a.id.cmp(&b.id)));
        Ok(summaries)
    }

    async fn save_statistic(
        &self,
        question_id: Uuid,
        total_votes: i64,
        calculated_at: DateTime<Utc>,
    ) -> PollResult<PollStatistic> {
        let mut tables = self.write()?;
        if !tables.questions.contains_key(&question_id) {
            return Err(PollError::QuestionNotFound);
        }
        let statistic = PollStatistic {
            question_id,
            total_votes,
            last_calculated: calculated_at,
        };
        tables.statistics.insert(question_id, statistic.clone());
        Ok(statistic)
    }

    async fn get_statistic(&self, question_id: Uuid) -> PollResult<Option<PollStatistic>> {
        Ok(self.read()?.statistics.get(&question_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use futures::future::join_all;
    use std::sync::Arc;

    fn new_question(text: &str, choices: &[&str]) -> NewQuestion {
        NewQuestion {
            question_text: text.to_string(),
            pub_date: Utc::now(),
            choices: choices.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn choices_keep_creation_order() {
        let store = MemoryStore::new();
        let (question, _) = store
            .create_question(new_question("Color?", &["Red", "Blue", "Green"]))
            .await
            .unwrap();

        let texts: Vec<String> = store
            .get_choices(question.id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.choice_text)
            .collect();
        assert_eq!(texts, vec!["Red", "Blue", "Green"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_votes_are_not_lost() {
        let store = Arc::new(MemoryStore::new());
        let (question, choices) = store
            .create_question(new_question("Color?", &["Red", "Blue"]))
            .await
            .unwrap();
        let red = choices[0].id;

        let tasks = (0..200).map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.record_vote(question.id, red).await })
        });
        for result in join_all(tasks).await {
            assert!(result.unwrap().unwrap().is_some());
        }

        let choices = store.get_choices(question.id).await.unwrap();
        assert_eq!(choices[0].votes, 200);
        assert_eq!(choices[1].votes, 0);
    }

    #[tokio::test]
    async fn vote_for_choice_of_other_question_is_rejected() {
        let store = MemoryStore::new();
        let (first, _) = store
            .create_question(new_question("First?", &["Yes"]))
            .await
            .unwrap();
        let (_, other_choices) = store
            .create_question(new_question("Second?", &["No"]))
            .await
            .unwrap();

        let outcome = store.record_vote(first.id, other_choices[0].id).await.unwrap();
        assert_eq!(outcome, None);
        assert_eq!(store.get_choices(first.id).await.unwrap()[0].votes, 0);
    }

    #[tokio::test]
    async fn delete_cascades_to_choices_and_statistic() {
        let store = MemoryStore::new();
        let (question, choices) = store
            .create_question(new_question("Color?", &["Red"]))
            .await
            .unwrap();
        store.save_statistic(question.id, 0, Utc::now()).await.unwrap();

        assert!(store.delete_question(question.id).await.unwrap());
        assert!(!store.delete_question(question.id).await.unwrap());
        assert!(store.get_choices(question.id).await.unwrap().is_empty());
        assert!(store.get_statistic(question.id).await.unwrap().is_none());
        assert_eq!(store.record_vote(question.id, choices[0].id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn reset_zeroes_only_that_question() {
        let store = MemoryStore::new();
        let (a, a_choices) = store.create_question(new_question("A?", &["x"])).await.unwrap();
        let (b, b_choices) = store.create_question(new_question("B?", &["y"])).await.unwrap();
        store.record_vote(a.id, a_choices[0].id).await.unwrap();
        store.record_vote(b.id, b_choices[0].id).await.unwrap();

        assert_eq!(store.reset_votes(a.id).await.unwrap(), 1);
        assert_eq!(store.get_choices(a.id).await.unwrap()[0].votes, 0);
        assert_eq!(store.get_choices(b.id).await.unwrap()[0].votes, 1);
    }

    #[tokio::test]
    async fn published_questions_skip_future_and_respect_limit() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for days in [-30, -5, -1, 3] {
            let mut q = new_question(&format!("{days} days"), &[]);
            q.pub_date = now + Duration::days(days);
            store.create_question(q).await.unwrap();
        }

        let latest = store.published_questions(now, 2).await.unwrap();
        let texts: Vec<&str> = latest.iter().map(|q| q.question_text.as_str()).collect();
        assert_eq!(texts, vec!["-1 days", "-5 days"]);
    }
}
