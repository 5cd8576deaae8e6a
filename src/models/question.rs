// src/models/question.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Represents the 'questions' table: a bilingual MCQ with its lifetime
/// counters. `times_attempted` / `times_correct` are only ever bumped by
/// attempt completion.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub question_text_en: String,
    pub question_text_np: String,
    pub category_id: i64,
    /// 'EASY' | 'MEDIUM' | 'HARD'; only set for IQ/Mathematics categories.
    pub difficulty_level: Option<String>,
    pub explanation_en: String,
    pub explanation_np: String,
    /// 'DRAFT' | 'PENDING_REVIEW' | 'PUBLIC' | 'PRIVATE'
    pub status: String,
    /// e.g., 'PSC 2078 Nasu Exam'
    pub source_reference: Option<String>,
    pub times_attempted: i64,
    pub times_correct: i64,
    pub created_by: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Represents the 'answers' table: one option of a question's ordered
/// answer set. At most one row per question has `is_correct = true`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Answer {
    pub id: i64,
    pub question_id: i64,
    pub answer_text_en: String,
    pub answer_text_np: String,
    pub is_correct: bool,
    pub display_order: i64,
    pub created_at: Option<DateTime<Utc>>,
}

/// DTO for sending an answer option to clients: correctness is hidden.
#[derive(Debug, Serialize)]
pub struct PublicAnswer {
    pub id: i64,
    pub answer_text_en: String,
    pub answer_text_np: String,
    pub display_order: i64,
}

impl From<Answer> for PublicAnswer {
    fn from(a: Answer) -> Self {
        PublicAnswer {
            id: a.id,
            answer_text_en: a.answer_text_en,
            answer_text_np: a.answer_text_np,
            display_order: a.display_order,
        }
    }
}

/// DTO for sending a question to clients (no correct-answer flags,
/// no explanation — the explanation is revealed by attempt results).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub question_text_en: String,
    pub question_text_np: String,
    pub category_id: i64,
    pub difficulty_level: Option<String>,
    pub answers: Vec<PublicAnswer>,
}

/// One answer option in a create/update request.
#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerInput {
    pub answer_text_en: String,
    pub answer_text_np: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// DTO for creating a new question with its full answer set.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 2000))]
    pub question_text_en: String,
    #[validate(length(min = 1, max = 2000))]
    pub question_text_np: String,
    pub category_id: i64,
    #[validate(custom(function = validate_difficulty))]
    pub difficulty_level: Option<String>,
    #[validate(length(max = 4000))]
    pub explanation_en: Option<String>,
    #[validate(length(max = 4000))]
    pub explanation_np: Option<String>,
    #[validate(length(max = 255))]
    pub source_reference: Option<String>,
    #[validate(custom(function = validate_status))]
    pub status: Option<String>,
    #[validate(custom(function = validate_answer_set))]
    pub answers: Vec<AnswerInput>,
}

fn validate_difficulty(level: &str) -> Result<(), validator::ValidationError> {
    match level {
        "EASY" | "MEDIUM" | "HARD" => Ok(()),
        _ => Err(validator::ValidationError::new("invalid_difficulty")),
    }
}

fn validate_status(status: &str) -> Result<(), validator::ValidationError> {
    match status {
        "DRAFT" | "PENDING_REVIEW" | "PUBLIC" | "PRIVATE" => Ok(()),
        _ => Err(validator::ValidationError::new("invalid_status")),
    }
}

/// An MCQ needs two to six non-empty options and exactly one marked correct.
fn validate_answer_set(answers: &[AnswerInput]) -> Result<(), validator::ValidationError> {
    if answers.len() < 2 || answers.len() > 6 {
        return Err(validator::ValidationError::new("answer_count_out_of_range"));
    }
    for answer in answers {
        for text in [&answer.answer_text_en, &answer.answer_text_np] {
            if text.is_empty() || text.len() > 500 {
                return Err(validator::ValidationError::new("answer_text_out_of_range"));
            }
        }
    }
    let correct = answers.iter().filter(|a| a.is_correct).count();
    if correct != 1 {
        return Err(validator::ValidationError::new("exactly_one_correct_answer"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(text: &str, is_correct: bool) -> AnswerInput {
        AnswerInput {
            answer_text_en: text.to_string(),
            answer_text_np: text.to_string(),
            is_correct,
        }
    }

    #[test]
    fn answer_set_requires_exactly_one_correct() {
        assert!(validate_answer_set(&[option("a", true), option("b", false)]).is_ok());
        assert!(validate_answer_set(&[option("a", false), option("b", false)]).is_err());
        assert!(validate_answer_set(&[option("a", true), option("b", true)]).is_err());
        assert!(validate_answer_set(&[option("a", true)]).is_err());
    }
}
