//! Vote aggregation, percentage breakdowns and poll ranking.
//!
//! Everything here is pure computation over rows handed in by the store, so
//! handlers fetch once and the arithmetic stays testable without a database.

use crate::db::models::{Choice, Question, QuestionSummary};
use crate::error::{PollError, PollResult};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Window used by the overall statistics for "recent" polls.
pub const RECENT_WINDOW_DAYS: i64 = 7;
pub const POPULAR_POLLS_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoiceStat {
    pub choice_text: String,
    pub votes: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollStats {
    pub question_id: Uuid,
    pub question_text: String,
    pub total_votes: i64,
    pub choices: Vec<ChoiceStat>,
    pub pub_date: DateTime<Utc>,
}

impl PollStats {
    /// `(label, votes)` pairs in ranked order, as the chart expects them.
    pub fn bars(&self) -> Vec<(String, i64)> {
        self.choices
            .iter()
            .map(|c| (c.choice_text.clone(), c.votes))
            .collect()
    }
}

/// Share of `votes` in `total`, in percent, rounded to two decimals.
/// Zero when nobody voted.
pub fn percentage(votes: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    let share = votes as f64 / total as f64 * 100.0;
    round_cents(share)
}

/// Rounds to two decimals, half to even, on the exact binary value of `x`.
/// Scaling by 100 in floating point first would round twice.
fn round_cents(x: f64) -> f64 {
    if !x.is_finite() || x < 0.0 {
        return x;
    }
    let bits = x.to_bits();
    let exponent = ((bits >> 52) & 0x7ff) as i32;
    let fraction = bits & ((1 << 52) - 1);
    // x == mantissa * 2^exp
    let (mantissa, exp) = if exponent == 0 {
        (fraction, -1074)
    } else {
        (fraction | (1 << 52), exponent - 1075)
    };

    if exp >= 0 {
        // already an integer
        return x;
    }

    let scaled = u128::from(mantissa) * 100;
    let cents = if -exp >= 127 {
        0
    } else {
        let shift = -exp as u32;
        let quotient = scaled >> shift;
        let remainder = scaled - (quotient << shift);
        let half = 1u128 << (shift - 1);
        if remainder > half || (remainder == half && quotient % 2 == 1) {
            quotient + 1
        } else {
            quotient
        }
    };
    cents as f64 / 100.0
}

pub fn total_votes(choices: &[Choice]) -> i64 {
    choices.iter().map(|c| c.votes).sum()
}

pub fn poll_stats(question: &Question, choices: &[Choice]) -> PollStats {
    let total = total_votes(choices);

    let mut stats: Vec<ChoiceStat> = choices
        .iter()
        .map(|c| ChoiceStat {
            choice_text: c.choice_text.clone(),
            votes: c.votes,
            percentage: percentage(c.votes, total),
        })
        .collect();
    // sort_by is stable, ties keep store order
    stats.sort_by(|a, b| b.votes.cmp(&a.votes));

    PollStats {
        question_id: question.id,
        question_text: question.question_text.clone(),
        total_votes: total,
        choices: stats,
        pub_date: question.pub_date,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortMode {
    Recent,
    Oldest,
    Popularity,
    /// Unrecognised `sort_by`; rows keep the store's order.
    Unsorted,
}

impl SortMode {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            None | Some("recent") => SortMode::Recent,
            Some("oldest") => SortMode::Oldest,
            Some("popularity") => SortMode::Popularity,
            Some(other) => {
                debug!("unknown sort_by {other:?}, keeping store order");
                SortMode::Unsorted
            }
        }
    }
}

/// Inclusive publish-date bounds; a missing side is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| from <= at) && self.to.is_none_or(|to| at <= to)
    }
}

/// Query string of the search endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub sort_by: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchQuery {
    pub range: DateRange,
    pub sort: SortMode,
}

impl SearchParams {
    pub fn into_query(self) -> PollResult<SearchQuery> {
        Ok(SearchQuery {
            range: DateRange {
                from: non_blank(self.date_from.as_deref())
                    .map(parse_date_bound)
                    .transpose()?,
                to: non_blank(self.date_to.as_deref())
                    .map(parse_date_bound)
                    .transpose()?,
            },
            sort: SortMode::parse(non_blank(self.sort_by.as_deref())),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Accepts RFC 3339 timestamps, naive `YYYY-MM-DD[ T]HH:MM:SS` (taken as UTC)
/// and bare dates, which mean midnight UTC of that day.
pub fn parse_date_bound(raw: &str) -> PollResult<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| PollError::InvalidRequest(format!("'{raw}' is not a valid date")))
}

pub fn search_polls(summaries: Vec<QuestionSummary>, query: &SearchQuery) -> Vec<QuestionSummary> {
    let mut polls: Vec<QuestionSummary> = summaries
        .into_iter()
        .filter(|s| query.range.contains(s.pub_date))
        .collect();

    match query.sort {
        SortMode::Recent => polls.sort_by(|a, b| b.pub_date.cmp(&a.pub_date)),
        SortMode::Oldest => polls.sort_by(|a, b| a.pub_date.cmp(&b.pub_date)),
        SortMode::Popularity => polls.sort_by(|a, b| b.total_votes.cmp(&a.total_votes)),
        SortMode::Unsorted => {}
    }

    polls
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopularPoll {
    pub id: Uuid,
    pub question_text: String,
    pub total_votes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallStats {
    pub total_polls: usize,
    pub total_votes: i64,
    pub recent_polls: usize,
    pub popular_polls: Vec<PopularPoll>,
}

pub fn overall_stats(summaries: &[QuestionSummary], now: DateTime<Utc>) -> OverallStats {
    let window_start = now - Duration::days(RECENT_WINDOW_DAYS);

    let mut ranked: Vec<&QuestionSummary> = summaries.iter().collect();
    ranked.sort_by(|a, b| b.total_votes.cmp(&a.total_votes).then(a.id.cmp(&b.id)));

    OverallStats {
        total_polls: summaries.len(),
        total_votes: summaries.iter().map(|s| s.total_votes).sum(),
        recent_polls: summaries.iter().filter(|s| s.pub_date >= window_start).count(),
        popular_polls: ranked
            .into_iter()
            .take(POPULAR_POLLS_LIMIT)
            .map(|s| PopularPoll {
                id: s.id,
                question_text: s.question_text.clone(),
                total_votes: s.total_votes,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn question(text: &str) -> Question {
        Question {
            id: Uuid::new_v4(),
            question_text: text.to_string(),
            pub_date: Utc::now(),
        }
    }

    fn choice(question: &Question, text: &str, votes: i64) -> Choice {
        Choice {
            id: Uuid::new_v4(),
            question_id: question.id,
            choice_text: text.to_string(),
            votes,
        }
    }

    fn summary(text: &str, days_ago: i64, total_votes: i64, now: DateTime<Utc>) -> QuestionSummary {
        QuestionSummary {
            id: Uuid::new_v4(),
            question_text: text.to_string(),
            pub_date: now - Duration::days(days_ago),
            total_votes,
        }
    }

    fn texts(polls: &[QuestionSummary]) -> Vec<&str> {
        polls.iter().map(|p| p.question_text.as_str()).collect()
    }

    #[test]
    fn color_poll_breakdown() {
        let q = question("Color?");
        let choices = vec![choice(&q, "Blue", 1), choice(&q, "Red", 3)];

        let stats = poll_stats(&q, &choices);

        assert_eq!(stats.total_votes, 4);
        assert_eq!(
            stats.choices,
            vec![
                ChoiceStat { choice_text: "Red".into(), votes: 3, percentage: 75.0 },
                ChoiceStat { choice_text: "Blue".into(), votes: 1, percentage: 25.0 },
            ]
        );
    }

    #[test]
    fn no_votes_means_zero_percent_everywhere() {
        let q = question("Anyone?");
        let choices = vec![choice(&q, "a", 0), choice(&q, "b", 0)];

        let stats = poll_stats(&q, &choices);

        assert_eq!(stats.total_votes, 0);
        assert!(stats.choices.iter().all(|c| c.percentage == 0.0));
    }

    #[test]
    fn question_without_choices_has_zero_total() {
        let stats = poll_stats(&question("Empty?"), &[]);
        assert_eq!(stats.total_votes, 0);
        assert!(stats.choices.is_empty());
    }

    #[test]
    fn percentages_round_to_two_decimals_and_sum_to_hundred() {
        let q = question("Thirds?");
        let choices = vec![choice(&q, "a", 1), choice(&q, "b", 1), choice(&q, "c", 1)];

        let stats = poll_stats(&q, &choices);

        assert!(stats.choices.iter().all(|c| c.percentage == 33.33));
        let sum: f64 = stats.choices.iter().map(|c| c.percentage).sum();
        assert!((sum - 100.0).abs() <= 0.01 * choices.len() as f64);
    }

    #[test]
    fn exact_halves_round_to_even() {
        // 3.125 and 15.625 are exact in binary
        assert_eq!(percentage(1, 32), 3.12);
        assert_eq!(percentage(5, 32), 15.62);
        assert_eq!(percentage(3, 32), 9.38);
        assert_eq!(percentage(1, 8), 12.5);
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(percentage(7, 7), 100.0);
        assert_eq!(percentage(0, 7), 0.0);
    }

    #[test]
    fn choices_sorted_by_votes_with_stable_ties() {
        let q = question("Order?");
        let choices = vec![
            choice(&q, "first", 2),
            choice(&q, "top", 9),
            choice(&q, "second", 2),
            choice(&q, "none", 0),
        ];

        let order: Vec<String> = poll_stats(&q, &choices)
            .choices
            .into_iter()
            .map(|c| c.choice_text)
            .collect();

        assert_eq!(order, vec!["top", "first", "second", "none"]);
    }

    #[test]
    fn sort_mode_parsing() {
        assert_eq!(SortMode::parse(None), SortMode::Recent);
        assert_eq!(SortMode::parse(Some("recent")), SortMode::Recent);
        assert_eq!(SortMode::parse(Some("oldest")), SortMode::Oldest);
        assert_eq!(SortMode::parse(Some("popularity")), SortMode::Popularity);
        assert_eq!(SortMode::parse(Some("votes")), SortMode::Unsorted);
    }

    #[test]
    fn date_bounds_accept_dates_and_timestamps() {
        let midnight = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_date_bound("2024-03-01").unwrap(), midnight);
        assert_eq!(parse_date_bound("2024-03-01T00:00:00Z").unwrap(), midnight);
        assert_eq!(parse_date_bound("2024-03-01T02:00:00+02:00").unwrap(), midnight);
        assert_eq!(parse_date_bound("2024-03-01 00:00:00").unwrap(), midnight);
        assert!(matches!(
            parse_date_bound("yesterday"),
            Err(PollError::InvalidRequest(_))
        ));
    }

    #[test]
    fn blank_params_are_treated_as_absent() {
        let query = SearchParams {
            date_from: Some(String::new()),
            date_to: Some("  ".to_string()),
            sort_by: Some(String::new()),
        }
        .into_query()
        .unwrap();

        assert_eq!(query.range, DateRange::default());
        assert_eq!(query.sort, SortMode::Recent);
    }

    #[test]
    fn date_filter_is_inclusive_and_unbounded_when_omitted() {
        let now = Utc::now();
        let polls = vec![
            summary("new", 1, 0, now),
            summary("mid", 10, 0, now),
            summary("old", 30, 0, now),
        ];

        let all = search_polls(
            polls.clone(),
            &SearchQuery { range: DateRange::default(), sort: SortMode::Recent },
        );
        assert_eq!(texts(&all), vec!["new", "mid", "old"]);

        let bounded = search_polls(
            polls.clone(),
            &SearchQuery {
                range: DateRange {
                    from: Some(now - Duration::days(10)),
                    to: Some(now - Duration::days(1)),
                },
                sort: SortMode::Recent,
            },
        );
        assert_eq!(texts(&bounded), vec!["new", "mid"]);

        let only_from = search_polls(
            polls,
            &SearchQuery {
                range: DateRange { from: Some(now - Duration::days(9)), to: None },
                sort: SortMode::Recent,
            },
        );
        assert_eq!(texts(&only_from), vec!["new"]);
    }

    #[test]
    fn sorting_modes() {
        let now = Utc::now();
        let polls = vec![
            summary("old-popular", 30, 50, now),
            summary("new-quiet", 1, 2, now),
            summary("mid", 10, 7, now),
        ];
        let sorted = |sort| {
            let query = SearchQuery { range: DateRange::default(), sort };
            search_polls(polls.clone(), &query)
        };

        assert_eq!(texts(&sorted(SortMode::Recent)), vec!["new-quiet", "mid", "old-popular"]);
        assert_eq!(texts(&sorted(SortMode::Oldest)), vec!["old-popular", "mid", "new-quiet"]);
        assert_eq!(texts(&sorted(SortMode::Popularity)), vec!["old-popular", "mid", "new-quiet"]);
        assert_eq!(texts(&sorted(SortMode::Unsorted)), vec!["old-popular", "new-quiet", "mid"]);
    }

    #[test]
    fn overall_on_empty_store() {
        let overall = overall_stats(&[], Utc::now());
        assert_eq!(
            overall,
            OverallStats {
                total_polls: 0,
                total_votes: 0,
                recent_polls: 0,
                popular_polls: vec![],
            }
        );
    }

    #[test]
    fn overall_counts_recent_window_and_top_five() {
        let now = Utc::now();
        let polls: Vec<QuestionSummary> = [(1, 10), (6, 4), (8, 30), (20, 1), (40, 0), (2, 12)]
            .iter()
            .enumerate()
            .map(|(i, (days, votes))| summary(&format!("p{i}"), *days, *votes, now))
            .collect();

        let overall = overall_stats(&polls, now);

        assert_eq!(overall.total_polls, 6);
        assert_eq!(overall.total_votes, 57);
        assert_eq!(overall.recent_polls, 3);
        let top: Vec<i64> = overall.popular_polls.iter().map(|p| p.total_votes).collect();
        assert_eq!(top, vec![30, 12, 10, 4, 1]);
    }

    #[test]
    fn popular_ties_break_by_id() {
        let now = Utc::now();
        let polls = vec![summary("a", 1, 5, now), summary("b", 2, 5, now)];
        let mut expected: Vec<Uuid> = polls.iter().map(|p| p.id).collect();
        expected.sort();

        let ids: Vec<Uuid> = overall_stats(&polls, now)
            .popular_polls
            .into_iter()
            .map(|p| p.id)
            .collect();

        assert_eq!(ids, expected);
    }
}
