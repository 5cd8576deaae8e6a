// src/handlers/leaderboard.rs

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::leaderboard::{LeaderboardQuery, LeaderboardRow},
};

/// Reads the top of one leaderboard partition. The rows are derived state
/// maintained by the scheduled aggregator; this endpoint never recomputes.
pub async fn get_leaderboard(
    State(pool): State<SqlitePool>,
    Query(params): Query<LeaderboardQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params.limit.unwrap_or(20).clamp(1, 100);

    let rows = sqlx::query_as::<_, LeaderboardRow>(
        "SELECT l.rank, l.user_id, u.username, l.total_score,
                l.tests_completed, l.accuracy_percentage, l.last_updated
         FROM leaderboard_entries l
         JOIN users u ON u.id = l.user_id
         WHERE l.time_period = ? AND l.branch_id = ?
           AND COALESCE(l.sub_branch_id, 0) = COALESCE(?, 0)
         ORDER BY l.rank, u.username
         LIMIT ?",
    )
    .bind(params.period)
    .bind(params.branch)
    .bind(params.sub_branch)
    .bind(limit)
    .fetch_all(&pool)
    .await?;

    Ok(Json(rows))
}
