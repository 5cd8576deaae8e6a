// src/handlers/admin.rs
//
// Moderation/curation surface. All routes here sit behind the auth + admin
// middleware pair.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    engine::aggregator::{self, PartitionKey},
    error::AppError,
    events::{self, DomainEvent},
    models::{
        branch::{
            Branch, Category, CreateBranchRequest, CreateCategoryRequest, CreateSubBranchRequest,
            SubBranch, slugify,
        },
        leaderboard::TimePeriod,
        mock_test::{CreateMockTestRequest, MockTest},
        question::{Answer, CreateQuestionRequest, Question},
    },
    state::AppState,
};

/// Creates an examination branch.
pub async fn create_branch(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateBranchRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let branch = sqlx::query_as::<_, Branch>(
        "INSERT INTO branches
            (name_en, name_np, slug, description_en, description_np,
             has_sub_branches, display_order)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         RETURNING *",
    )
    .bind(&payload.name_en)
    .bind(&payload.name_np)
    .bind(slugify(&payload.name_en))
    .bind(&payload.description_en)
    .bind(&payload.description_np)
    .bind(payload.has_sub_branches)
    .bind(payload.display_order)
    .fetch_one(&pool)
    .await
    .map_err(unique_to_conflict("A branch with this name already exists"))?;

    Ok((StatusCode::CREATED, Json(branch)))
}

/// Creates a specialization under a branch.
pub async fn create_sub_branch(
    State(pool): State<SqlitePool>,
    Path(branch_id): Path<i64>,
    Json(payload): Json<CreateSubBranchRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM branches WHERE id = ?")
        .bind(branch_id)
        .fetch_one(&pool)
        .await?;
    if exists == 0 {
        return Err(AppError::NotFound("Branch not found".to_string()));
    }

    let sub_branch = sqlx::query_as::<_, SubBranch>(
        "INSERT INTO sub_branches
            (branch_id, name_en, name_np, slug, description_en, description_np, display_order)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         RETURNING *",
    )
    .bind(branch_id)
    .bind(&payload.name_en)
    .bind(&payload.name_np)
    .bind(slugify(&payload.name_en))
    .bind(&payload.description_en)
    .bind(&payload.description_np)
    .bind(payload.display_order)
    .fetch_one(&pool)
    .await
    .map_err(unique_to_conflict(
        "A sub-branch with this name already exists in the branch",
    ))?;

    // Creating the first specialization flips the parent's flag.
    sqlx::query("UPDATE branches SET has_sub_branches = 1 WHERE id = ?")
        .bind(branch_id)
        .execute(&pool)
        .await?;

    Ok((StatusCode::CREATED, Json(sub_branch)))
}

/// Creates a question category. Scope decides the required targets:
/// UNIVERSAL forbids both, BRANCH requires the branch only, SUBBRANCH both.
pub async fn create_category(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    match payload.scope_type.as_str() {
        "UNIVERSAL" => {
            if payload.target_branch_id.is_some() || payload.target_sub_branch_id.is_some() {
                return Err(AppError::BadRequest(
                    "Universal categories cannot have target branch or sub-branch".to_string(),
                ));
            }
        }
        "BRANCH" => {
            if payload.target_branch_id.is_none() {
                return Err(AppError::BadRequest(
                    "Branch-specific categories must have a target branch".to_string(),
                ));
            }
            if payload.target_sub_branch_id.is_some() {
                return Err(AppError::BadRequest(
                    "Branch-specific categories cannot have target sub-branch".to_string(),
                ));
            }
        }
        "SUBBRANCH" => {
            if payload.target_branch_id.is_none() || payload.target_sub_branch_id.is_none() {
                return Err(AppError::BadRequest(
                    "Sub-branch categories must have both target branch and sub-branch".to_string(),
                ));
            }
        }
        _ => {
            return Err(AppError::BadRequest("Invalid scope type".to_string()));
        }
    }

    if let Some(branch_id) = payload.target_branch_id {
        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM branches WHERE id = ?")
            .bind(branch_id)
            .fetch_one(&pool)
            .await?;
        if exists == 0 {
            return Err(AppError::NotFound("Target branch not found".to_string()));
        }
    }
    if let Some(sub_branch_id) = payload.target_sub_branch_id {
        let exists: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sub_branches WHERE id = ? AND branch_id = ?",
        )
        .bind(sub_branch_id)
        .bind(payload.target_branch_id)
        .fetch_one(&pool)
        .await?;
        if exists == 0 {
            return Err(AppError::NotFound(
                "Target sub-branch not found in that branch".to_string(),
            ));
        }
    }

    let category = sqlx::query_as::<_, Category>(
        "INSERT INTO categories
            (name_en, name_np, slug, description_en, description_np,
             scope_type, target_branch_id, target_sub_branch_id, display_order)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING *",
    )
    .bind(&payload.name_en)
    .bind(&payload.name_np)
    .bind(slugify(&payload.name_en))
    .bind(&payload.description_en)
    .bind(&payload.description_np)
    .bind(&payload.scope_type)
    .bind(payload.target_branch_id)
    .bind(payload.target_sub_branch_id)
    .bind(payload.display_order)
    .fetch_one(&pool)
    .await
    .map_err(unique_to_conflict("A category with this name already exists"))?;

    Ok((StatusCode::CREATED, Json(category)))
}

/// Creates a question together with its full answer set.
/// The request validator enforces the exactly-one-correct invariant.
pub async fn create_question(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let mut tx = pool.begin().await?;

    let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories WHERE id = ?")
        .bind(payload.category_id)
        .fetch_one(&mut *tx)
        .await?;
    if exists == 0 {
        return Err(AppError::NotFound("Category not found".to_string()));
    }

    let question = sqlx::query_as::<_, Question>(
        "INSERT INTO questions
            (question_text_en, question_text_np, category_id, difficulty_level,
             explanation_en, explanation_np, status, source_reference)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING *",
    )
    .bind(&payload.question_text_en)
    .bind(&payload.question_text_np)
    .bind(payload.category_id)
    .bind(&payload.difficulty_level)
    .bind(payload.explanation_en.as_deref().unwrap_or(""))
    .bind(payload.explanation_np.as_deref().unwrap_or(""))
    .bind(payload.status.as_deref().unwrap_or("DRAFT"))
    .bind(&payload.source_reference)
    .fetch_one(&mut *tx)
    .await?;

    let mut answers = Vec::with_capacity(payload.answers.len());
    for (order, input) in payload.answers.iter().enumerate() {
        let answer = sqlx::query_as::<_, Answer>(
            "INSERT INTO answers
                (question_id, answer_text_en, answer_text_np, is_correct, display_order)
             VALUES (?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(question.id)
        .bind(&input.answer_text_en)
        .bind(&input.answer_text_np)
        .bind(input.is_correct)
        .bind(order as i64)
        .fetch_one(&mut *tx)
        .await?;
        answers.push(answer);
    }

    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "question": question, "answers": answers })),
    ))
}

/// Replaces a question's content and answer set.
/// Rejected once user responses reference the old answers — attempts keep
/// their history intact.
pub async fn update_question(
    State(pool): State<SqlitePool>,
    Path(question_id): Path<i64>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let mut tx = pool.begin().await?;

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE id = ?")
        .bind(question_id)
        .fetch_one(&mut *tx)
        .await?;
    if existing == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    sqlx::query("DELETE FROM answers WHERE question_id = ?")
        .bind(question_id)
        .execute(&mut *tx)
        .await
        .map_err(fk_to_conflict(
            "Answers are referenced by user responses and cannot be replaced",
        ))?;

    let question = sqlx::query_as::<_, Question>(
        "UPDATE questions
         SET question_text_en = ?, question_text_np = ?, category_id = ?,
             difficulty_level = ?, explanation_en = ?, explanation_np = ?,
             status = ?, source_reference = ?, updated_at = ?
         WHERE id = ?
         RETURNING *",
    )
    .bind(&payload.question_text_en)
    .bind(&payload.question_text_np)
    .bind(payload.category_id)
    .bind(&payload.difficulty_level)
    .bind(payload.explanation_en.as_deref().unwrap_or(""))
    .bind(payload.explanation_np.as_deref().unwrap_or(""))
    .bind(payload.status.as_deref().unwrap_or("DRAFT"))
    .bind(&payload.source_reference)
    .bind(Utc::now())
    .bind(question_id)
    .fetch_one(&mut *tx)
    .await?;

    let mut answers = Vec::with_capacity(payload.answers.len());
    for (order, input) in payload.answers.iter().enumerate() {
        let answer = sqlx::query_as::<_, Answer>(
            "INSERT INTO answers
                (question_id, answer_text_en, answer_text_np, is_correct, display_order)
             VALUES (?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(question_id)
        .bind(&input.answer_text_en)
        .bind(&input.answer_text_np)
        .bind(input.is_correct)
        .bind(order as i64)
        .fetch_one(&mut *tx)
        .await?;
        answers.push(answer);
    }

    tx.commit().await?;

    Ok(Json(serde_json::json!({ "question": question, "answers": answers })))
}

/// Deletes a question. Questions referenced by attempts or mock tests are
/// protected, not cascaded.
pub async fn delete_question(
    State(pool): State<SqlitePool>,
    Path(question_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM questions WHERE id = ?")
        .bind(question_id)
        .execute(&pool)
        .await
        .map_err(fk_to_conflict(
            "Question is referenced by attempts or mock tests and cannot be deleted",
        ))?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Creates a mock test with its ordered, marked question list.
pub async fn create_mock_test(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateMockTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let mut question_ids: Vec<i64> = payload.questions.iter().map(|q| q.question_id).collect();
    question_ids.sort_unstable();
    question_ids.dedup();
    if question_ids.len() != payload.questions.len() {
        return Err(AppError::BadRequest(
            "Duplicate question ids in test".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM branches WHERE id = ?")
        .bind(payload.branch_id)
        .fetch_one(&mut *tx)
        .await?;
    if exists == 0 {
        return Err(AppError::NotFound("Branch not found".to_string()));
    }
    if let Some(sub_branch_id) = payload.sub_branch_id {
        let exists: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sub_branches WHERE id = ? AND branch_id = ?",
        )
        .bind(sub_branch_id)
        .bind(payload.branch_id)
        .fetch_one(&mut *tx)
        .await?;
        if exists == 0 {
            return Err(AppError::NotFound(
                "Sub-branch not found in that branch".to_string(),
            ));
        }
    }

    let mut query_builder =
        sqlx::QueryBuilder::new("SELECT COUNT(*) FROM questions WHERE id IN (");
    let mut separated = query_builder.separated(",");
    for id in &question_ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");
    let found: i64 = query_builder
        .build_query_scalar()
        .fetch_one(&mut *tx)
        .await?;
    if found != question_ids.len() as i64 {
        return Err(AppError::NotFound(
            "One or more questions do not exist".to_string(),
        ));
    }

    let test = sqlx::query_as::<_, MockTest>(
        "INSERT INTO mock_tests
            (title_en, title_np, slug, description_en, description_np, test_type,
             branch_id, sub_branch_id, total_questions, duration_minutes, pass_percentage)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING *",
    )
    .bind(&payload.title_en)
    .bind(&payload.title_np)
    .bind(slugify(&payload.title_en))
    .bind(&payload.description_en)
    .bind(&payload.description_np)
    .bind(payload.test_type.as_deref().unwrap_or("COMMUNITY"))
    .bind(payload.branch_id)
    .bind(payload.sub_branch_id)
    .bind(payload.questions.len() as i64)
    .bind(payload.duration_minutes)
    .bind(payload.pass_percentage.unwrap_or(40.0))
    .fetch_one(&mut *tx)
    .await
    .map_err(unique_to_conflict("A mock test with this title already exists"))?;

    for (order, input) in payload.questions.iter().enumerate() {
        sqlx::query(
            "INSERT INTO mock_test_questions
                (mock_test_id, question_id, question_order, marks_allocated)
             VALUES (?, ?, ?, ?)",
        )
        .bind(test.id)
        .bind(input.question_id)
        .bind(order as i64 + 1)
        .bind(input.marks_allocated)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(test)))
}

#[derive(Debug, Deserialize)]
pub struct RecalculateRequest {
    pub period: TimePeriod,
    pub branch_id: i64,
    pub sub_branch_id: Option<i64>,
}

/// Triggers an immediate recalculation of one leaderboard partition, outside
/// the regular schedule. Mutually exclusive with a scheduled run of the same
/// partition.
pub async fn recalculate_leaderboard(
    State(state): State<AppState>,
    Json(payload): Json<RecalculateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let branch = sqlx::query_as::<_, Branch>("SELECT * FROM branches WHERE id = ?")
        .bind(payload.branch_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Branch not found".to_string()))?;

    let key = PartitionKey {
        time_period: payload.period,
        branch_id: payload.branch_id,
        sub_branch_id: payload.sub_branch_id,
    };

    let _guard = state.partition_locks.try_acquire(key).ok_or_else(|| {
        AppError::Conflict("A recalculation for this partition is already running".to_string())
    })?;

    let outcome = aggregator::recalculate(&state.pool, key, Utc::now()).await?;

    if !outcome.rank_changes.is_empty() {
        events::emit(
            &state.pool,
            DomainEvent::LeaderboardUpdated {
                time_period: key.time_period,
                branch_name_en: branch.name_en,
                branch_name_np: branch.name_np,
                changes: outcome.rank_changes,
            },
        );
    }

    Ok(Json(serde_json::json!({
        "entries": outcome.entries.len(),
    })))
}

/// Maps a UNIQUE-constraint failure to a 409, everything else to a 500.
fn unique_to_conflict(message: &'static str) -> impl Fn(sqlx::Error) -> AppError {
    move |e| {
        if e.to_string().contains("UNIQUE constraint failed") {
            AppError::Conflict(message.to_string())
        } else {
            tracing::error!("Database error: {:?}", e);
            AppError::from(e)
        }
    }
}

/// Maps a FOREIGN KEY failure (protected reference) to a 409.
fn fk_to_conflict(message: &'static str) -> impl Fn(sqlx::Error) -> AppError {
    move |e| {
        if e.to_string().contains("FOREIGN KEY constraint failed") {
            AppError::Conflict(message.to_string())
        } else {
            tracing::error!("Database error: {:?}", e);
            AppError::from(e)
        }
    }
}
