// src/events.rs
//
// Domain events emitted by the attempt engine and the leaderboard
// aggregator, consumed as user notifications. Delivery is fire-and-forget:
// a failed insert is logged and never fails the operation that emitted it.

use sqlx::SqlitePool;

use crate::{
    engine::aggregator::RankChange,
    error::AppError,
    models::{attempt::UserAttempt, leaderboard::TimePeriod},
};

#[derive(Debug)]
pub enum DomainEvent {
    AttemptCompleted {
        attempt: UserAttempt,
    },
    LeaderboardUpdated {
        time_period: TimePeriod,
        branch_name_en: String,
        branch_name_np: String,
        changes: Vec<RankChange>,
    },
}

/// Hands the event off to a background task and returns immediately.
pub fn emit(pool: &SqlitePool, event: DomainEvent) {
    let pool = pool.clone();
    tokio::spawn(async move {
        if let Err(e) = deliver(&pool, event).await {
            tracing::warn!("Notification delivery failed: {}", e);
        }
    });
}

async fn deliver(pool: &SqlitePool, event: DomainEvent) -> Result<(), AppError> {
    match event {
        DomainEvent::AttemptCompleted { attempt } => {
            let percentage = attempt.percentage.unwrap_or(0.0);
            insert_notification(
                pool,
                attempt.user_id,
                "ATTEMPT_COMPLETED",
                "Test completed",
                "परीक्षा पूरा भयो",
                &format!(
                    "You scored {:.2} out of {:.2} ({:.1}%).",
                    attempt.score_obtained, attempt.total_score, percentage
                ),
                &format!(
                    "तपाईंले {:.2} मध्ये {:.2} अंक ({:.1}%) प्राप्त गर्नुभयो।",
                    attempt.total_score, attempt.score_obtained, percentage
                ),
            )
            .await?;
        }
        DomainEvent::LeaderboardUpdated {
            time_period,
            branch_name_en,
            branch_name_np,
            changes,
        } => {
            let period_en = match time_period {
                TimePeriod::Weekly => "weekly",
                TimePeriod::Monthly => "monthly",
                TimePeriod::AllTime => "all-time",
            };
            let period_np = match time_period {
                TimePeriod::Weekly => "साप्ताहिक",
                TimePeriod::Monthly => "मासिक",
                TimePeriod::AllTime => "समग्र",
            };
            for change in changes {
                insert_notification(
                    pool,
                    change.user_id,
                    "RANK_CHANGED",
                    "Leaderboard updated",
                    "लिडरबोर्ड अद्यावधिक भयो",
                    &format!(
                        "You are now rank #{} on the {} {} leaderboard.",
                        change.new_rank, period_en, branch_name_en
                    ),
                    &format!(
                        "तपाईं अब {} {} लिडरबोर्डमा #{} स्थानमा हुनुहुन्छ।",
                        period_np, branch_name_np, change.new_rank
                    ),
                )
                .await?;
            }
        }
    }
    Ok(())
}

async fn insert_notification(
    pool: &SqlitePool,
    user_id: i64,
    notification_type: &str,
    title_en: &str,
    title_np: &str,
    message_en: &str,
    message_np: &str,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO notifications
            (user_id, notification_type, title_en, title_np, message_en, message_np)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(notification_type)
    .bind(title_en)
    .bind(title_np)
    .bind(message_en)
    .bind(message_np)
    .execute(pool)
    .await?;

    Ok(())
}
