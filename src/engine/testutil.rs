// src/engine/testutil.rs
//
// Shared fixtures for engine tests: an in-memory database with the real
// migrations applied, plus minimal seed data.

use std::sync::atomic::{AtomicI64, Ordering};

use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};

static SEQ: AtomicI64 = AtomicI64::new(1);

fn next_seq() -> i64 {
    SEQ.fetch_add(1, Ordering::Relaxed)
}

/// A single-connection in-memory database. One connection is required so all
/// pool users see the same `:memory:` instance.
pub async fn pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory sqlite");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to migrate test database");

    pool
}

pub async fn seed_user(pool: &SqlitePool, username: &str) -> i64 {
    sqlx::query("INSERT INTO users (username, password) VALUES (?, 'not-a-real-hash')")
        .bind(username)
        .execute(pool)
        .await
        .expect("failed to seed user")
        .last_insert_rowid()
}

pub struct MockTestFixture {
    pub branch_id: i64,
    pub sub_branch_id: Option<i64>,
    pub category_id: i64,
    pub mock_test_id: i64,
    /// Parallel vectors, one entry per seeded question.
    pub question_ids: Vec<i64>,
    pub correct_answer_ids: Vec<i64>,
    pub wrong_answer_ids: Vec<i64>,
}

pub async fn seed_branch(pool: &SqlitePool, name: &str) -> i64 {
    let seq = next_seq();
    sqlx::query("INSERT INTO branches (name_en, name_np, slug) VALUES (?, ?, ?)")
        .bind(format!("{name} {seq}"))
        .bind(name)
        .bind(format!("{}-{seq}", name.to_lowercase()))
        .execute(pool)
        .await
        .expect("failed to seed branch")
        .last_insert_rowid()
}

pub async fn seed_category(pool: &SqlitePool) -> i64 {
    let seq = next_seq();
    sqlx::query(
        "INSERT INTO categories (name_en, name_np, slug, scope_type)
         VALUES ('General Knowledge', 'सामान्य ज्ञान', ?, 'UNIVERSAL')",
    )
    .bind(format!("general-knowledge-{seq}"))
    .execute(pool)
    .await
    .expect("failed to seed category")
    .last_insert_rowid()
}

/// Seeds a PUBLIC four-option question; returns (question, correct answer,
/// one wrong answer).
pub async fn seed_question(pool: &SqlitePool, category_id: i64) -> (i64, i64, i64) {
    let seq = next_seq();
    let question_id = sqlx::query(
        "INSERT INTO questions (question_text_en, question_text_np, category_id, status)
         VALUES (?, ?, ?, 'PUBLIC')",
    )
    .bind(format!("Question {seq}?"))
    .bind(format!("प्रश्न {seq}?"))
    .bind(category_id)
    .execute(pool)
    .await
    .expect("failed to seed question")
    .last_insert_rowid();

    let mut correct_id = 0;
    let mut wrong_id = 0;
    for order in 0..4 {
        let id = sqlx::query(
            "INSERT INTO answers (question_id, answer_text_en, answer_text_np, is_correct, display_order)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(question_id)
        .bind(format!("Option {order}"))
        .bind(format!("विकल्प {order}"))
        .bind(order == 0)
        .bind(order)
        .execute(pool)
        .await
        .expect("failed to seed answer")
        .last_insert_rowid();

        if order == 0 {
            correct_id = id;
        } else if order == 1 {
            wrong_id = id;
        }
    }

    (question_id, correct_id, wrong_id)
}

/// Seeds a branch, category, and a public mock test with one question per
/// entry in `marks`, allocated those marks in order.
pub async fn seed_mock_test(pool: &SqlitePool, marks: &[f64]) -> MockTestFixture {
    let branch_id = seed_branch(pool, "Nasu").await;
    let category_id = seed_category(pool).await;

    let seq = next_seq();
    let mock_test_id = sqlx::query(
        "INSERT INTO mock_tests (title_en, title_np, slug, branch_id, total_questions)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(format!("Mock Test {seq}"))
    .bind(format!("नमुना परीक्षा {seq}"))
    .bind(format!("mock-test-{seq}"))
    .bind(branch_id)
    .bind(marks.len() as i64)
    .execute(pool)
    .await
    .expect("failed to seed mock test")
    .last_insert_rowid();

    let mut question_ids = Vec::new();
    let mut correct_answer_ids = Vec::new();
    let mut wrong_answer_ids = Vec::new();

    for (order, &mark) in marks.iter().enumerate() {
        let (question_id, correct_id, wrong_id) = seed_question(pool, category_id).await;
        sqlx::query(
            "INSERT INTO mock_test_questions (mock_test_id, question_id, question_order, marks_allocated)
             VALUES (?, ?, ?, ?)",
        )
        .bind(mock_test_id)
        .bind(question_id)
        .bind(order as i64 + 1)
        .bind(mark)
        .execute(pool)
        .await
        .expect("failed to seed mock test question");

        question_ids.push(question_id);
        correct_answer_ids.push(correct_id);
        wrong_answer_ids.push(wrong_id);
    }

    MockTestFixture {
        branch_id,
        sub_branch_id: None,
        category_id,
        mock_test_id,
        question_ids,
        correct_answer_ids,
        wrong_answer_ids,
    }
}

pub async fn question_counters(pool: &SqlitePool, question_id: i64) -> (i64, i64) {
    sqlx::query_as::<_, (i64, i64)>(
        "SELECT times_attempted, times_correct FROM questions WHERE id = ?",
    )
    .bind(question_id)
    .fetch_one(pool)
    .await
    .expect("failed to read question counters")
}
