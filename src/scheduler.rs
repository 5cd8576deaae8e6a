// src/scheduler.rs
//
// Periodic leaderboard recomputation. Leaderboard rows are derived state:
// nothing here is triggered by user requests, and a failed partition is
// simply retried on the next sweep.

use std::time::Duration;

use chrono::Utc;

use crate::{
    engine::aggregator::{self, PartitionKey},
    error::AppError,
    events::{self, DomainEvent},
    models::{branch::Branch, leaderboard::TimePeriod},
    state::AppState,
};

pub fn spawn(state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(state.config.leaderboard_refresh_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if let Err(e) = sweep(&state).await {
                tracing::warn!("Leaderboard sweep aborted: {}", e);
            }
        }
    })
}

/// Walks every active (period × branch × optional sub-branch) partition and
/// recomputes it. Partitions are independent; one failing partition does not
/// stop the sweep.
pub async fn sweep(state: &AppState) -> Result<(), AppError> {
    let branches = sqlx::query_as::<_, Branch>(
        "SELECT * FROM branches WHERE is_active = 1 ORDER BY display_order, name_en",
    )
    .fetch_all(&state.pool)
    .await?;

    let now = Utc::now();

    for branch in &branches {
        let mut sub_branch_ids: Vec<Option<i64>> = vec![None];
        if branch.has_sub_branches {
            let subs: Vec<i64> = sqlx::query_scalar(
                "SELECT id FROM sub_branches WHERE branch_id = ? AND is_active = 1",
            )
            .bind(branch.id)
            .fetch_all(&state.pool)
            .await?;
            sub_branch_ids.extend(subs.into_iter().map(Some));
        }

        for sub_branch_id in sub_branch_ids {
            for time_period in TimePeriod::ALL {
                let key = PartitionKey {
                    time_period,
                    branch_id: branch.id,
                    sub_branch_id,
                };
                recalculate_partition(state, key, branch).await;
            }
        }
    }

    Ok(())
}

async fn recalculate_partition(state: &AppState, key: PartitionKey, branch: &Branch) {
    // Skip rather than queue: the next sweep will pick the partition up.
    let Some(_guard) = state.partition_locks.try_acquire(key) else {
        tracing::debug!(
            "Skipping {:?} leaderboard for branch {}: run already in progress",
            key.time_period,
            branch.id
        );
        return;
    };

    match aggregator::recalculate(&state.pool, key, Utc::now()).await {
        Ok(outcome) => {
            if !outcome.rank_changes.is_empty() {
                events::emit(
                    &state.pool,
                    DomainEvent::LeaderboardUpdated {
                        time_period: key.time_period,
                        branch_name_en: branch.name_en.clone(),
                        branch_name_np: branch.name_np.clone(),
                        changes: outcome.rank_changes,
                    },
                );
            }
        }
        Err(e) => {
            // Existing rows stay visible; the run is retried next cycle.
            tracing::warn!(
                "Leaderboard recalculation failed for branch {} ({:?}): {}",
                branch.id,
                key.time_period,
                e
            );
        }
    }
}
