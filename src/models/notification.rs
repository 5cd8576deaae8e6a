// src/models/notification.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// Represents the 'notifications' table: user-visible alerts created by the
/// attempt engine and the leaderboard aggregator.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    /// 'ATTEMPT_COMPLETED' | 'RANK_CHANGED'
    pub notification_type: String,
    pub title_en: String,
    pub title_np: String,
    pub message_en: String,
    pub message_np: String,
    pub is_read: bool,
    pub created_at: Option<DateTime<Utc>>,
}
