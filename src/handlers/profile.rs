// src/handlers/profile.rs

use axum::{Extension, Json, extract::State, response::IntoResponse};
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    error::AppError,
    models::user::{MeResponse, UpdateProfileRequest, User},
    utils::jwt::Claims,
};

/// Current user's profile with lifetime performance aggregates.
pub async fn get_me(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let user = load_user(&pool, user_id).await?;

    let (attempts_completed, questions_answered, correct_answers) =
        sqlx::query_as::<_, (i64, i64, i64)>(
            "SELECT
                (SELECT COUNT(*) FROM user_attempts
                 WHERE user_id = ?1 AND status = 'COMPLETED'),
                (SELECT COUNT(*) FROM user_answers ua
                 JOIN user_attempts a ON a.id = ua.user_attempt_id
                 WHERE a.user_id = ?1 AND ua.is_skipped = 0),
                (SELECT COUNT(*) FROM user_answers ua
                 JOIN user_attempts a ON a.id = ua.user_attempt_id
                 WHERE a.user_id = ?1 AND ua.is_correct = 1)",
        )
        .bind(user_id)
        .fetch_one(&pool)
        .await?;

    Ok(Json(MeResponse {
        id: user.id,
        username: user.username,
        role: user.role,
        preferred_language: user.preferred_language,
        target_branch_id: user.target_branch_id,
        target_sub_branch_id: user.target_sub_branch_id,
        attempts_completed,
        questions_answered,
        correct_answers,
        created_at: user.created_at,
    }))
}

/// Updates language preference and target branch/sub-branch.
pub async fn update_me(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let user_id = claims.user_id()?;

    let user = load_user(&pool, user_id).await?;

    let preferred_language = payload
        .preferred_language
        .unwrap_or(user.preferred_language);
    let target_branch_id = payload.target_branch_id.or(user.target_branch_id);
    let target_sub_branch_id = payload.target_sub_branch_id.or(user.target_sub_branch_id);

    if let Some(branch_id) = target_branch_id {
        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM branches WHERE id = ?")
            .bind(branch_id)
            .fetch_one(&pool)
            .await?;
        if exists == 0 {
            return Err(AppError::NotFound("Target branch not found".to_string()));
        }
    }
    if let Some(sub_branch_id) = target_sub_branch_id {
        let branch_id = target_branch_id.ok_or_else(|| {
            AppError::BadRequest("A target sub-branch requires a target branch".to_string())
        })?;
        let exists: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sub_branches WHERE id = ? AND branch_id = ?",
        )
        .bind(sub_branch_id)
        .bind(branch_id)
        .fetch_one(&pool)
        .await?;
        if exists == 0 {
            return Err(AppError::NotFound(
                "Target sub-branch not found in that branch".to_string(),
            ));
        }
    }

    let user = sqlx::query_as::<_, User>(
        "UPDATE users
         SET preferred_language = ?, target_branch_id = ?, target_sub_branch_id = ?
         WHERE id = ?
         RETURNING *",
    )
    .bind(&preferred_language)
    .bind(target_branch_id)
    .bind(target_sub_branch_id)
    .bind(user_id)
    .fetch_one(&pool)
    .await?;

    Ok(Json(user))
}

async fn load_user(pool: &SqlitePool, user_id: i64) -> Result<User, AppError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}
