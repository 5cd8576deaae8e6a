// src/engine/aggregator.rs

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::prelude::FromRow;

use crate::error::AppError;
use crate::models::leaderboard::TimePeriod;

/// One leaderboard bucket, recomputed as a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    pub time_period: TimePeriod,
    pub branch_id: i64,
    pub sub_branch_id: Option<i64>,
}

/// In-process mutual exclusion per partition: two runs for the same
/// partition must never overlap, runs for different partitions may.
#[derive(Clone, Default)]
pub struct PartitionLocks {
    running: Arc<Mutex<HashSet<PartitionKey>>>,
}

impl PartitionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the partition, or returns `None` when a run is already active.
    /// The claim is released when the returned guard drops.
    pub fn try_acquire(&self, key: PartitionKey) -> Option<PartitionGuard> {
        let mut running = self.running.lock().expect("partition lock poisoned");
        if !running.insert(key) {
            return None;
        }
        Some(PartitionGuard {
            locks: self.clone(),
            key,
        })
    }
}

pub struct PartitionGuard {
    locks: PartitionLocks,
    key: PartitionKey,
}

impl Drop for PartitionGuard {
    fn drop(&mut self) {
        let mut running = self
            .locks
            .running
            .lock()
            .expect("partition lock poisoned");
        running.remove(&self.key);
    }
}

/// One completed attempt feeding a partition, with its answer tallies.
#[derive(Debug, Clone, FromRow)]
struct CompletedAttempt {
    user_id: i64,
    score_obtained: f64,
    end_time: DateTime<Utc>,
    answered_count: i64,
    correct_count: i64,
}

/// A freshly computed leaderboard row, before insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedUser {
    pub user_id: i64,
    pub rank: i64,
    pub total_score: f64,
    pub tests_completed: i64,
    pub accuracy_percentage: f64,
}

/// A user whose rank differs from the previous run of this partition.
#[derive(Debug, Clone)]
pub struct RankChange {
    pub user_id: i64,
    pub old_rank: Option<i64>,
    pub new_rank: i64,
}

#[derive(Debug)]
pub struct RecalculateOutcome {
    pub entries: Vec<RankedUser>,
    pub rank_changes: Vec<RankChange>,
}

/// Recomputes one leaderboard partition from completed attempts.
///
/// The read runs before any write, so a failed read leaves the existing
/// board untouched; the replace itself is a single transaction, so readers
/// never observe a partially-updated partition. Running twice with no new
/// attempts produces identical ranks and scores.
pub async fn recalculate(
    pool: &SqlitePool,
    key: PartitionKey,
    now: DateTime<Utc>,
) -> Result<RecalculateOutcome, AppError> {
    let mut query_builder = sqlx::QueryBuilder::new(
        "SELECT ua.user_id, ua.score_obtained, ua.end_time,
            (SELECT COUNT(*) FROM user_answers a
             WHERE a.user_attempt_id = ua.id AND a.is_skipped = 0) AS answered_count,
            (SELECT COUNT(*) FROM user_answers a
             WHERE a.user_attempt_id = ua.id AND a.is_correct = 1) AS correct_count
         FROM user_attempts ua
         JOIN mock_tests mt ON mt.id = ua.mock_test_id
         WHERE ua.status = 'COMPLETED' AND ua.end_time IS NOT NULL
           AND mt.branch_id = ",
    );
    query_builder.push_bind(key.branch_id);

    if let Some(sub_branch_id) = key.sub_branch_id {
        query_builder.push(" AND mt.sub_branch_id = ");
        query_builder.push_bind(sub_branch_id);
    }
    if let Some(window_start) = key.time_period.window_start(now) {
        query_builder.push(" AND ua.end_time >= ");
        query_builder.push_bind(window_start);
    }

    let attempts: Vec<CompletedAttempt> = query_builder
        .build_query_as()
        .fetch_all(pool)
        .await?;

    let entries = rank_users(&attempts);

    let mut tx = pool.begin().await?;

    let previous: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT user_id, rank FROM leaderboard_entries
         WHERE time_period = ? AND branch_id = ? AND COALESCE(sub_branch_id, 0) = COALESCE(?, 0)",
    )
    .bind(key.time_period)
    .bind(key.branch_id)
    .bind(key.sub_branch_id)
    .fetch_all(&mut *tx)
    .await?;
    let previous: HashMap<i64, i64> = previous.into_iter().collect();

    // Full replace: delete the partition, bulk-insert the fresh rows.
    sqlx::query(
        "DELETE FROM leaderboard_entries
         WHERE time_period = ? AND branch_id = ? AND COALESCE(sub_branch_id, 0) = COALESCE(?, 0)",
    )
    .bind(key.time_period)
    .bind(key.branch_id)
    .bind(key.sub_branch_id)
    .execute(&mut *tx)
    .await?;

    for entry in &entries {
        sqlx::query(
            "INSERT INTO leaderboard_entries
                (user_id, time_period, branch_id, sub_branch_id, rank,
                 total_score, tests_completed, accuracy_percentage, last_updated)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.user_id)
        .bind(key.time_period)
        .bind(key.branch_id)
        .bind(key.sub_branch_id)
        .bind(entry.rank)
        .bind(entry.total_score)
        .bind(entry.tests_completed)
        .bind(entry.accuracy_percentage)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let rank_changes = entries
        .iter()
        .filter_map(|entry| {
            let old_rank = previous.get(&entry.user_id).copied();
            if old_rank == Some(entry.rank) {
                None
            } else {
                Some(RankChange {
                    user_id: entry.user_id,
                    old_rank,
                    new_rank: entry.rank,
                })
            }
        })
        .collect();

    Ok(RecalculateOutcome {
        entries,
        rank_changes,
    })
}

/// Per-user aggregation over one partition's completed attempts.
#[derive(Debug, Default)]
struct UserTally {
    total_score: f64,
    tests_completed: i64,
    answered: i64,
    correct: i64,
    end_time_sum_secs: f64,
}

impl UserTally {
    fn accuracy(&self) -> f64 {
        if self.answered > 0 {
            self.correct as f64 / self.answered as f64 * 100.0
        } else {
            0.0
        }
    }

    fn average_end_secs(&self) -> f64 {
        self.end_time_sum_secs / self.tests_completed as f64
    }
}

/// Dense rank, descending by total score; ties broken by higher accuracy,
/// then by earlier average completion time. Rank 1 is best.
fn rank_users(attempts: &[CompletedAttempt]) -> Vec<RankedUser> {
    let mut tallies: HashMap<i64, UserTally> = HashMap::new();
    for attempt in attempts {
        let tally = tallies.entry(attempt.user_id).or_default();
        tally.total_score += attempt.score_obtained;
        tally.tests_completed += 1;
        tally.answered += attempt.answered_count;
        tally.correct += attempt.correct_count;
        tally.end_time_sum_secs += attempt.end_time.timestamp() as f64;
    }

    let mut users: Vec<(i64, UserTally)> = tallies.into_iter().collect();
    users.sort_by(|(a_id, a), (b_id, b)| {
        b.total_score
            .total_cmp(&a.total_score)
            .then_with(|| b.accuracy().total_cmp(&a.accuracy()))
            .then_with(|| a.average_end_secs().total_cmp(&b.average_end_secs()))
            .then_with(|| a_id.cmp(b_id))
    });

    let mut ranked = Vec::with_capacity(users.len());
    let mut rank = 0;
    let mut prev_key: Option<(f64, f64, f64)> = None;
    for (user_id, tally) in users {
        let key = (tally.total_score, tally.accuracy(), tally.average_end_secs());
        if prev_key != Some(key) {
            rank += 1;
            prev_key = Some(key);
        }
        ranked.push(RankedUser {
            user_id,
            rank,
            total_score: tally.total_score,
            tests_completed: tally.tests_completed,
            accuracy_percentage: tally.accuracy(),
        });
    }

    ranked
}
