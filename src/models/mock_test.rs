// src/models/mock_test.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Represents the 'mock_tests' table: a fixed, ordered, marked set of
/// questions an attempt can be bound to.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MockTest {
    pub id: i64,
    pub title_en: String,
    pub title_np: String,
    pub slug: String,
    pub description_en: Option<String>,
    pub description_np: Option<String>,
    /// 'OFFICIAL' | 'COMMUNITY' | 'CUSTOM'
    pub test_type: String,
    pub branch_id: i64,
    pub sub_branch_id: Option<i64>,
    pub total_questions: i64,
    /// If null, the user can set their own timing.
    pub duration_minutes: Option<i64>,
    pub pass_percentage: f64,
    pub is_public: bool,
    pub is_active: bool,
    /// Total attempts started by all users.
    pub attempt_count: i64,
    pub created_by: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Represents the 'mock_test_questions' junction table: question order and
/// marks allocation within one test.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MockTestQuestion {
    pub id: i64,
    pub mock_test_id: i64,
    pub question_id: i64,
    pub question_order: i64,
    pub marks_allocated: f64,
}

/// One question row in a create-test request.
#[derive(Debug, Serialize, Deserialize)]
pub struct TestQuestionInput {
    pub question_id: i64,
    #[serde(default = "default_marks")]
    pub marks_allocated: f64,
}

fn default_marks() -> f64 {
    1.0
}

/// DTO for creating a mock test with its ordered question list.
/// Question order follows the position in `questions`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateMockTestRequest {
    #[validate(length(min = 1, max = 255))]
    pub title_en: String,
    #[validate(length(min = 1, max = 255))]
    pub title_np: String,
    pub description_en: Option<String>,
    pub description_np: Option<String>,
    #[validate(custom(function = validate_test_type))]
    pub test_type: Option<String>,
    pub branch_id: i64,
    pub sub_branch_id: Option<i64>,
    #[validate(range(min = 1, max = 600))]
    pub duration_minutes: Option<i64>,
    #[validate(range(min = 0.0, max = 100.0))]
    pub pass_percentage: Option<f64>,
    #[validate(length(min = 1, max = 200), custom(function = validate_test_questions))]
    pub questions: Vec<TestQuestionInput>,
}

fn validate_test_type(test_type: &str) -> Result<(), validator::ValidationError> {
    match test_type {
        "OFFICIAL" | "COMMUNITY" | "CUSTOM" => Ok(()),
        _ => Err(validator::ValidationError::new("invalid_test_type")),
    }
}

fn validate_test_questions(
    questions: &[TestQuestionInput],
) -> Result<(), validator::ValidationError> {
    for question in questions {
        if question.marks_allocated < 0.25 || question.marks_allocated > 100.0 {
            return Err(validator::ValidationError::new("marks_out_of_range"));
        }
    }
    Ok(())
}

/// Detail response: the test plus its questions in order, answers hidden.
#[derive(Debug, Serialize)]
pub struct MockTestDetail {
    #[serde(flatten)]
    pub test: MockTest,
    pub questions: Vec<MockTestQuestionDetail>,
}

#[derive(Debug, Serialize)]
pub struct MockTestQuestionDetail {
    pub question_order: i64,
    pub marks_allocated: f64,
    pub question: crate::models::question::PublicQuestion,
}
