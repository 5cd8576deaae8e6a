// src/engine/attempt.rs

use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    engine::evaluator,
    error::AppError,
    models::{
        attempt::{
            AttemptDetail, AttemptMode, AttemptQuestion, AttemptStatus, StartAttemptRequest,
            SubmitAnswerRequest, SubmitAnswerResponse, UserAnswer, UserAttempt,
        },
        mock_test::{MockTest, MockTestQuestion},
        question::Answer,
    },
};

/// Starts a new attempt for the user.
///
/// Mock-test mode snapshots the test's question set and marks so mid-attempt
/// edits to the test cannot change a running attempt; practice mode takes an
/// explicit list of public questions at one mark each. `total_score` is fixed
/// here and never changes afterwards.
pub async fn start_attempt(
    pool: &SqlitePool,
    user_id: i64,
    req: &StartAttemptRequest,
) -> Result<AttemptDetail, AppError> {
    let mut tx = pool.begin().await?;

    let now = Utc::now();

    // (question_id, marks) pairs in presentation order.
    let (mode, mock_test_id, question_set) = match (req.mock_test_id, &req.question_ids) {
        (Some(_), Some(_)) => {
            return Err(AppError::BadRequest(
                "Provide either mock_test_id or question_ids, not both".to_string(),
            ));
        }
        (None, None) => {
            return Err(AppError::BadRequest(
                "Either mock_test_id or question_ids is required".to_string(),
            ));
        }
        (Some(test_id), None) => {
            let test = sqlx::query_as::<_, MockTest>(
                "SELECT * FROM mock_tests WHERE id = ? AND is_public = 1 AND is_active = 1",
            )
            .bind(test_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Mock test not found".to_string()))?;

            // One live session per (user, mock test).
            let in_progress: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM user_attempts
                 WHERE user_id = ? AND mock_test_id = ? AND status = ?",
            )
            .bind(user_id)
            .bind(test.id)
            .bind(AttemptStatus::InProgress)
            .fetch_one(&mut *tx)
            .await?;

            if in_progress > 0 {
                return Err(AppError::InvalidState(
                    "An attempt for this mock test is already in progress".to_string(),
                ));
            }

            let test_questions = sqlx::query_as::<_, MockTestQuestion>(
                "SELECT * FROM mock_test_questions WHERE mock_test_id = ? ORDER BY question_order",
            )
            .bind(test.id)
            .fetch_all(&mut *tx)
            .await?;

            let set = test_questions
                .iter()
                .map(|tq| (tq.question_id, tq.marks_allocated))
                .collect::<Vec<_>>();

            (AttemptMode::MockTest, Some(test.id), set)
        }
        (None, Some(question_ids)) => {
            let mut deduped = question_ids.clone();
            deduped.sort_unstable();
            deduped.dedup();
            if deduped.len() != question_ids.len() {
                return Err(AppError::BadRequest(
                    "Duplicate question ids in practice set".to_string(),
                ));
            }

            let mut query_builder =
                sqlx::QueryBuilder::new("SELECT id FROM questions WHERE status = 'PUBLIC' AND id IN (");
            let mut separated = query_builder.separated(",");
            for id in question_ids {
                separated.push_bind(id);
            }
            separated.push_unseparated(")");

            let found: Vec<i64> = query_builder
                .build_query_scalar()
                .fetch_all(&mut *tx)
                .await?;

            if found.len() != question_ids.len() {
                return Err(AppError::NotFound(
                    "One or more questions do not exist or are not public".to_string(),
                ));
            }

            let set = question_ids.iter().map(|&id| (id, 1.0)).collect::<Vec<_>>();

            (AttemptMode::Practice, None, set)
        }
    };

    let total_score: f64 = question_set.iter().map(|(_, marks)| marks).sum();

    let attempt_id = sqlx::query(
        "INSERT INTO user_attempts
            (user_id, mock_test_id, status, mode, start_time, score_obtained, total_score)
         VALUES (?, ?, ?, ?, ?, 0, ?)",
    )
    .bind(user_id)
    .bind(mock_test_id)
    .bind(AttemptStatus::InProgress)
    .bind(mode)
    .bind(now)
    .bind(total_score)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    for (order, (question_id, marks)) in question_set.iter().enumerate() {
        sqlx::query(
            "INSERT INTO attempt_questions
                (user_attempt_id, question_id, question_order, marks_allocated)
             VALUES (?, ?, ?, ?)",
        )
        .bind(attempt_id)
        .bind(question_id)
        .bind(order as i64 + 1)
        .bind(marks)
        .execute(&mut *tx)
        .await?;
    }

    if let Some(test_id) = mock_test_id {
        sqlx::query("UPDATE mock_tests SET attempt_count = attempt_count + 1 WHERE id = ?")
            .bind(test_id)
            .execute(&mut *tx)
            .await?;
    }

    let attempt = fetch_attempt(&mut tx, attempt_id).await?;
    let questions = fetch_snapshot(&mut tx, attempt_id).await?;

    tx.commit().await?;

    Ok(AttemptDetail {
        attempt,
        questions,
        answers: Vec::new(),
    })
}

/// Records (or replaces) the user's answer to one question of the attempt.
///
/// Correctness is derived by the evaluator, never taken from the client, and
/// `score_obtained` is recomputed from scratch over all currently-correct
/// answers so edits can never leave the score drifting.
pub async fn submit_answer(
    pool: &SqlitePool,
    user_id: i64,
    attempt_id: i64,
    req: &SubmitAnswerRequest,
) -> Result<SubmitAnswerResponse, AppError> {
    let mut tx = pool.begin().await?;

    let attempt = load_owned_attempt(&mut tx, attempt_id, user_id).await?;

    if attempt.status != AttemptStatus::InProgress {
        return Err(AppError::InvalidState(
            "Attempt is no longer in progress".to_string(),
        ));
    }

    // The question must be part of the attempt's snapshot.
    let snapshot_hit: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM attempt_questions WHERE user_attempt_id = ? AND question_id = ?",
    )
    .bind(attempt.id)
    .bind(req.question_id)
    .fetch_one(&mut *tx)
    .await?;

    if snapshot_hit == 0 {
        return Err(AppError::NotFound(
            "Question is not part of this attempt".to_string(),
        ));
    }

    let answers = sqlx::query_as::<_, Answer>(
        "SELECT * FROM answers WHERE question_id = ? ORDER BY display_order",
    )
    .bind(req.question_id)
    .fetch_all(&mut *tx)
    .await?;

    let verdict = evaluator::evaluate(&answers, req.selected_answer_id)?;

    let now = Utc::now();

    // Upsert: a resubmission replaces the prior answer for this question.
    sqlx::query(
        "INSERT INTO user_answers
            (user_attempt_id, question_id, selected_answer_id, is_correct, is_skipped,
             is_marked_for_review, time_taken_seconds, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (user_attempt_id, question_id) DO UPDATE SET
            selected_answer_id = excluded.selected_answer_id,
            is_correct = excluded.is_correct,
            is_skipped = excluded.is_skipped,
            is_marked_for_review = excluded.is_marked_for_review,
            time_taken_seconds = excluded.time_taken_seconds,
            updated_at = excluded.updated_at",
    )
    .bind(attempt.id)
    .bind(req.question_id)
    .bind(req.selected_answer_id)
    .bind(verdict.is_correct())
    .bind(verdict.is_skipped())
    .bind(req.is_marked_for_review)
    .bind(req.time_taken_seconds)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let score_obtained = recompute_score(&mut tx, attempt.id).await?;

    sqlx::query("UPDATE user_attempts SET score_obtained = ?, updated_at = ? WHERE id = ?")
        .bind(score_obtained)
        .bind(now)
        .bind(attempt.id)
        .execute(&mut *tx)
        .await?;

    let answer = sqlx::query_as::<_, UserAnswer>(
        "SELECT * FROM user_answers WHERE user_attempt_id = ? AND question_id = ?",
    )
    .bind(attempt.id)
    .bind(req.question_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(SubmitAnswerResponse {
        answer,
        score_obtained,
    })
}

/// Finalizes the attempt: sets end time, elapsed seconds, percentage and the
/// COMPLETED status, and bumps each answered question's lifetime counters.
///
/// The status guard makes the counter update run exactly once — a second
/// completion request fails instead of double-counting.
pub async fn complete_attempt(
    pool: &SqlitePool,
    user_id: i64,
    attempt_id: i64,
) -> Result<UserAttempt, AppError> {
    let mut tx = pool.begin().await?;

    let attempt = load_owned_attempt(&mut tx, attempt_id, user_id).await?;

    if attempt.status != AttemptStatus::InProgress {
        return Err(AppError::InvalidState(
            "Attempt has already been completed or abandoned".to_string(),
        ));
    }

    let now = Utc::now();
    let total_time_taken = (now - attempt.start_time).num_seconds().max(0);
    let percentage = if attempt.total_score > 0.0 {
        attempt.score_obtained / attempt.total_score * 100.0
    } else {
        0.0
    };

    // Compare-and-swap on the status so two racing completion requests can
    // never both pass the guard; only the winner bumps the counters below.
    let result = sqlx::query(
        "UPDATE user_attempts
         SET status = ?, end_time = ?, total_time_taken = ?, percentage = ?, updated_at = ?
         WHERE id = ? AND status = ?",
    )
    .bind(AttemptStatus::Completed)
    .bind(now)
    .bind(total_time_taken)
    .bind(percentage)
    .bind(now)
    .bind(attempt.id)
    .bind(AttemptStatus::InProgress)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::InvalidState(
            "Attempt has already been completed or abandoned".to_string(),
        ));
    }

    // Lifetime question counters: every answered (non-skipped) question was
    // attempted once; the correct ones also count as correct.
    sqlx::query(
        "UPDATE questions SET
            times_attempted = times_attempted + 1,
            times_correct = times_correct +
                (SELECT ua.is_correct FROM user_answers ua
                 WHERE ua.user_attempt_id = ?1 AND ua.question_id = questions.id)
         WHERE id IN
            (SELECT question_id FROM user_answers
             WHERE user_attempt_id = ?1 AND is_skipped = 0)",
    )
    .bind(attempt.id)
    .execute(&mut *tx)
    .await?;

    let attempt = fetch_attempt(&mut tx, attempt.id).await?;

    tx.commit().await?;

    Ok(attempt)
}

/// Abandons an in-progress attempt. Score fields keep their last computed
/// values; `percentage` stays null because the attempt was never finalized.
pub async fn abandon_attempt(
    pool: &SqlitePool,
    user_id: i64,
    attempt_id: i64,
) -> Result<UserAttempt, AppError> {
    let mut tx = pool.begin().await?;

    let attempt = load_owned_attempt(&mut tx, attempt_id, user_id).await?;

    if attempt.status != AttemptStatus::InProgress {
        return Err(AppError::InvalidState(
            "Attempt has already been completed or abandoned".to_string(),
        ));
    }

    let now = Utc::now();
    let total_time_taken = (now - attempt.start_time).num_seconds().max(0);

    let result = sqlx::query(
        "UPDATE user_attempts
         SET status = ?, end_time = ?, total_time_taken = ?, updated_at = ?
         WHERE id = ? AND status = ?",
    )
    .bind(AttemptStatus::Abandoned)
    .bind(now)
    .bind(total_time_taken)
    .bind(now)
    .bind(attempt.id)
    .bind(AttemptStatus::InProgress)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::InvalidState(
            "Attempt has already been completed or abandoned".to_string(),
        ));
    }

    let attempt = fetch_attempt(&mut tx, attempt.id).await?;

    tx.commit().await?;

    Ok(attempt)
}

/// Loads an attempt and checks ownership. Another user's attempt reads as
/// missing rather than forbidden, so attempt ids can't be probed.
async fn load_owned_attempt(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    attempt_id: i64,
    user_id: i64,
) -> Result<UserAttempt, AppError> {
    let attempt = sqlx::query_as::<_, UserAttempt>("SELECT * FROM user_attempts WHERE id = ?")
        .bind(attempt_id)
        .fetch_optional(&mut **tx)
        .await?
        .filter(|a| a.user_id == user_id)
        .ok_or_else(|| AppError::NotFound("Attempt not found".to_string()))?;

    Ok(attempt)
}

async fn fetch_attempt(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    attempt_id: i64,
) -> Result<UserAttempt, AppError> {
    let attempt = sqlx::query_as::<_, UserAttempt>("SELECT * FROM user_attempts WHERE id = ?")
        .bind(attempt_id)
        .fetch_one(&mut **tx)
        .await?;

    Ok(attempt)
}

async fn fetch_snapshot(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    attempt_id: i64,
) -> Result<Vec<AttemptQuestion>, AppError> {
    let questions = sqlx::query_as::<_, AttemptQuestion>(
        "SELECT * FROM attempt_questions WHERE user_attempt_id = ? ORDER BY question_order",
    )
    .bind(attempt_id)
    .fetch_all(&mut **tx)
    .await?;

    Ok(questions)
}

/// Full recompute from the current answer set — intentionally not an
/// incremental increment/decrement, so answer edits can never cause drift.
async fn recompute_score(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    attempt_id: i64,
) -> Result<f64, AppError> {
    let score: f64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(aq.marks_allocated), 0.0)
         FROM user_answers ua
         JOIN attempt_questions aq
           ON aq.user_attempt_id = ua.user_attempt_id AND aq.question_id = ua.question_id
         WHERE ua.user_attempt_id = ? AND ua.is_correct = 1",
    )
    .bind(attempt_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(score)
}
