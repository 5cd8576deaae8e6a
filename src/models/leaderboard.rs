// src/models/leaderboard.rs

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// Ranking window. Weekly is a trailing window from the run time; monthly is
/// the calendar month containing the run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimePeriod {
    #[sqlx(rename = "WEEKLY")]
    Weekly,
    #[sqlx(rename = "MONTHLY")]
    Monthly,
    #[sqlx(rename = "ALL_TIME")]
    AllTime,
}

impl TimePeriod {
    pub const ALL: [TimePeriod; 3] = [TimePeriod::Weekly, TimePeriod::Monthly, TimePeriod::AllTime];

    /// Inclusive lower bound on completion time for this period, or `None`
    /// when unbounded.
    pub fn window_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TimePeriod::Weekly => Some(now - Duration::days(7)),
            TimePeriod::Monthly => Utc
                .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
                .single(),
            TimePeriod::AllTime => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimePeriod::Weekly => "WEEKLY",
            TimePeriod::Monthly => "MONTHLY",
            TimePeriod::AllTime => "ALL_TIME",
        }
    }
}

/// Represents the 'leaderboard_entries' table: one row per
/// (user, time_period, branch, optional sub-branch), wholly rebuilt by the
/// aggregator — never patched incrementally.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub id: i64,
    pub user_id: i64,
    pub time_period: TimePeriod,
    pub branch_id: i64,
    pub sub_branch_id: Option<i64>,
    /// 1-based dense rank within the partition; rank 1 is best.
    pub rank: i64,
    pub total_score: f64,
    pub tests_completed: i64,
    pub accuracy_percentage: f64,
    pub last_updated: DateTime<Utc>,
}

/// Leaderboard row joined with the username for display.
#[derive(Debug, Serialize, FromRow)]
pub struct LeaderboardRow {
    pub rank: i64,
    pub user_id: i64,
    pub username: String,
    pub total_score: f64,
    pub tests_completed: i64,
    pub accuracy_percentage: f64,
    pub last_updated: DateTime<Utc>,
}

/// Query parameters for the public leaderboard endpoint.
#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub period: TimePeriod,
    pub branch: i64,
    pub sub_branch: Option<i64>,
    pub limit: Option<i64>,
}
