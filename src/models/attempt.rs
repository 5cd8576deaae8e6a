// src/models/attempt.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Lifecycle of an attempt. `InProgress` is the only non-terminal state;
/// no transition leaves `Completed` or `Abandoned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptStatus {
    #[sqlx(rename = "IN_PROGRESS")]
    InProgress,
    #[sqlx(rename = "COMPLETED")]
    Completed,
    #[sqlx(rename = "ABANDONED")]
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptMode {
    #[sqlx(rename = "MOCK_TEST")]
    MockTest,
    #[sqlx(rename = "PRACTICE")]
    Practice,
}

/// Represents the 'user_attempts' table: one test/practice session owned by
/// exactly one user. `total_score` is fixed at creation; `percentage` is set
/// only on completion.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserAttempt {
    pub id: i64,
    pub user_id: i64,
    /// null for practice mode
    pub mock_test_id: Option<i64>,
    pub status: AttemptStatus,
    pub mode: AttemptMode,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Total seconds spent, calculated when the attempt reaches a terminal state.
    pub total_time_taken: Option<i64>,
    pub score_obtained: f64,
    pub total_score: f64,
    pub percentage: Option<f64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Represents the 'attempt_questions' table: the question set and marks
/// snapshotted when the attempt was started.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AttemptQuestion {
    pub id: i64,
    pub user_attempt_id: i64,
    pub question_id: i64,
    pub question_order: i64,
    pub marks_allocated: f64,
}

/// Represents the 'user_answers' table: one response per (attempt, question).
/// `is_correct` and `is_skipped` are derived from `selected_answer_id` on
/// every write, never accepted from clients.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserAnswer {
    pub id: i64,
    pub user_attempt_id: i64,
    pub question_id: i64,
    /// null when the question was skipped
    pub selected_answer_id: Option<i64>,
    pub is_correct: bool,
    pub is_skipped: bool,
    pub is_marked_for_review: bool,
    pub time_taken_seconds: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// DTO for starting an attempt. Either a mock test binding (question set and
/// marks come from the test) or, for practice mode, an explicit question list
/// scored at one mark each.
#[derive(Debug, Deserialize, Validate)]
pub struct StartAttemptRequest {
    pub mock_test_id: Option<i64>,
    #[validate(length(min = 1, max = 200))]
    pub question_ids: Option<Vec<i64>>,
}

/// DTO for submitting (or re-submitting) one question's answer.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitAnswerRequest {
    pub question_id: i64,
    /// null ⇒ the question is recorded as skipped
    pub selected_answer_id: Option<i64>,
    #[validate(range(min = 0, max = 86400))]
    pub time_taken_seconds: Option<i64>,
    #[serde(default)]
    pub is_marked_for_review: bool,
}

#[derive(Debug, Serialize)]
pub struct SubmitAnswerResponse {
    pub answer: UserAnswer,
    /// The attempt's running score after recomputation.
    pub score_obtained: f64,
}

/// Full attempt view returned to its owner.
#[derive(Debug, Serialize)]
pub struct AttemptDetail {
    #[serde(flatten)]
    pub attempt: UserAttempt,
    pub questions: Vec<AttemptQuestion>,
    pub answers: Vec<UserAnswer>,
}
