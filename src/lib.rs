//! Poll and voting backend with a vote analytics API.
//!
//! Polls (questions with choices) live behind [`db::PollStore`], either in
//! PostgreSQL or in memory. Ballots bump a choice's count atomically; the
//! [`analytics`] module turns the counts into percentages, rankings and
//! overall totals, and [`chart`] draws them as a bar chart.

#[macro_use]
extern crate tracing;

pub mod analytics;
pub mod chart;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod polls;
pub mod sse;
pub mod startup;
pub mod stats;
