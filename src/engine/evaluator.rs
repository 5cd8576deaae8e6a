// src/engine/evaluator.rs

use crate::error::AppError;
use crate::models::question::Answer;

/// Verdict for one submitted answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correctness {
    Correct,
    Incorrect,
    Skipped,
}

impl Correctness {
    pub fn is_correct(&self) -> bool {
        matches!(self, Correctness::Correct)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Correctness::Skipped)
    }
}

/// Judges a submitted answer against the question's answer set.
///
/// * `None` ⇒ `Skipped`.
/// * A selection outside `answers` is rejected — this guards against
///   cross-question answer injection.
/// * A question with no correct answer is a data-integrity problem upstream;
///   here every selection simply comes back `Incorrect` rather than
///   fabricating a correct one.
pub fn evaluate(
    answers: &[Answer],
    selected_answer_id: Option<i64>,
) -> Result<Correctness, AppError> {
    let Some(selected_id) = selected_answer_id else {
        return Ok(Correctness::Skipped);
    };

    let selected = answers
        .iter()
        .find(|a| a.id == selected_id)
        .ok_or_else(|| {
            AppError::BadRequest("Selected answer does not belong to this question".to_string())
        })?;

    if selected.is_correct {
        Ok(Correctness::Correct)
    } else {
        Ok(Correctness::Incorrect)
    }
}
