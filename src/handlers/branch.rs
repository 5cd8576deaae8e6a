// src/handlers/branch.rs

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::branch::{Branch, Category, SubBranch},
};

/// Lists all active examination branches in display order.
pub async fn list_branches(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let branches = sqlx::query_as::<_, Branch>(
        "SELECT * FROM branches WHERE is_active = 1 ORDER BY display_order, name_en",
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(branches))
}

/// Lists the active specializations of one branch.
pub async fn list_sub_branches(
    State(pool): State<SqlitePool>,
    Path(branch_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM branches WHERE id = ?")
        .bind(branch_id)
        .fetch_one(&pool)
        .await?;
    if exists == 0 {
        return Err(AppError::NotFound("Branch not found".to_string()));
    }

    let sub_branches = sqlx::query_as::<_, SubBranch>(
        "SELECT * FROM sub_branches
         WHERE branch_id = ? AND is_active = 1
         ORDER BY display_order, name_en",
    )
    .bind(branch_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(sub_branches))
}

/// Lists all active question categories.
pub async fn list_categories(
    State(pool): State<SqlitePool>,
) -> Result<impl IntoResponse, AppError> {
    let categories = sqlx::query_as::<_, Category>(
        "SELECT * FROM categories WHERE is_active = 1 ORDER BY display_order, name_en",
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(categories))
}
