// src/handlers/attempt.rs
//
// Thin wiring over the attempt engine: ownership comes from the JWT claims,
// lifecycle and scoring rules live in `engine::attempt`.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    engine::attempt as engine,
    error::AppError,
    events::{self, DomainEvent},
    models::attempt::{
        AttemptDetail, AttemptQuestion, StartAttemptRequest, SubmitAnswerRequest, UserAnswer,
        UserAttempt,
    },
    utils::jwt::Claims,
};

/// Starts a mock-test or practice attempt for the current user.
pub async fn start_attempt(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<StartAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let user_id = claims.user_id()?;

    let detail = engine::start_attempt(&pool, user_id, &payload).await?;

    Ok((StatusCode::CREATED, Json(detail)))
}

/// Submits (or edits) one answer of an in-progress attempt.
pub async fn submit_answer(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let user_id = claims.user_id()?;

    let response = engine::submit_answer(&pool, user_id, attempt_id, &payload).await?;

    Ok(Json(response))
}

/// Finalizes an attempt and notifies the user of the result.
pub async fn complete_attempt(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let attempt = engine::complete_attempt(&pool, user_id, attempt_id).await?;

    events::emit(
        &pool,
        DomainEvent::AttemptCompleted {
            attempt: attempt.clone(),
        },
    );

    Ok(Json(attempt))
}

/// Abandons an in-progress attempt.
pub async fn abandon_attempt(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let attempt = engine::abandon_attempt(&pool, user_id, attempt_id).await?;

    Ok(Json(attempt))
}

/// Lists the current user's attempts, newest first.
pub async fn list_my_attempts(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let attempts = sqlx::query_as::<_, UserAttempt>(
        "SELECT * FROM user_attempts WHERE user_id = ? ORDER BY start_time DESC LIMIT 100",
    )
    .bind(user_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(attempts))
}

/// Full view of one attempt: the snapshot and all recorded answers.
/// Only visible to its owner.
pub async fn get_attempt(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let attempt = sqlx::query_as::<_, UserAttempt>(
        "SELECT * FROM user_attempts WHERE id = ? AND user_id = ?",
    )
    .bind(attempt_id)
    .bind(user_id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Attempt not found".to_string()))?;

    let questions = sqlx::query_as::<_, AttemptQuestion>(
        "SELECT * FROM attempt_questions WHERE user_attempt_id = ? ORDER BY question_order",
    )
    .bind(attempt.id)
    .fetch_all(&pool)
    .await?;

    let answers = sqlx::query_as::<_, UserAnswer>(
        "SELECT * FROM user_answers WHERE user_attempt_id = ? ORDER BY question_id",
    )
    .bind(attempt.id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(AttemptDetail {
        attempt,
        questions,
        answers,
    }))
}
