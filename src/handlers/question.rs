// src/handlers/question.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::question::{Answer, PublicQuestion, Question},
};

#[derive(Debug, Deserialize)]
pub struct QuestionListParams {
    pub category: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Lists public questions with their answer options, correctness hidden.
pub async fn list_questions(
    State(pool): State<SqlitePool>,
    Query(params): Query<QuestionListParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut query_builder =
        sqlx::QueryBuilder::new("SELECT * FROM questions WHERE status = 'PUBLIC'");
    if let Some(category_id) = params.category {
        query_builder.push(" AND category_id = ");
        query_builder.push_bind(category_id);
    }
    query_builder.push(" ORDER BY id LIMIT ");
    query_builder.push_bind(limit);
    query_builder.push(" OFFSET ");
    query_builder.push_bind(offset);

    let questions: Vec<Question> = query_builder.build_query_as().fetch_all(&pool).await?;

    let public = load_public_questions(&pool, questions).await?;

    Ok(Json(public))
}

/// Fetches a single public question.
pub async fn get_question(
    State(pool): State<SqlitePool>,
    Path(question_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let question = sqlx::query_as::<_, Question>(
        "SELECT * FROM questions WHERE id = ? AND status = 'PUBLIC'",
    )
    .bind(question_id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;

    let mut public = load_public_questions(&pool, vec![question]).await?;

    Ok(Json(public.remove(0)))
}

/// Projects question rows to their public DTOs, attaching each question's
/// ordered answer set with the correctness flags stripped.
pub(crate) async fn load_public_questions(
    pool: &SqlitePool,
    questions: Vec<Question>,
) -> Result<Vec<PublicQuestion>, AppError> {
    if questions.is_empty() {
        return Ok(Vec::new());
    }

    let mut query_builder =
        sqlx::QueryBuilder::new("SELECT * FROM answers WHERE question_id IN (");
    let mut separated = query_builder.separated(",");
    for question in &questions {
        separated.push_bind(question.id);
    }
    separated.push_unseparated(") ORDER BY question_id, display_order");

    let answers: Vec<Answer> = query_builder.build_query_as().fetch_all(pool).await?;

    let mut public: Vec<PublicQuestion> = questions
        .into_iter()
        .map(|q| PublicQuestion {
            id: q.id,
            question_text_en: q.question_text_en,
            question_text_np: q.question_text_np,
            category_id: q.category_id,
            difficulty_level: q.difficulty_level,
            answers: Vec::new(),
        })
        .collect();

    for answer in answers {
        if let Some(question) = public.iter_mut().find(|q| q.id == answer.question_id) {
            question.answers.push(answer.into());
        }
    }

    Ok(public)
}
