// tests/api_tests.rs

use loksewa_backend::{config::Config, routes, state::AppState, utils::hash::hash_password};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use std::time::Duration;

/// Spawns the app on a random port against a fresh in-memory database.
/// Returns the base URL and the pool for seeding.
async fn spawn_app() -> (String, SqlitePool) {
    // A single connection keeps every pool user on the same :memory: instance.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory sqlite");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600, // 10 minutes for tests
        rust_log: "error".to_string(),
        admin_username: None,
        admin_password: None,
        leaderboard_refresh_secs: 3600,
    };

    let state = AppState::new(pool.clone(), config);
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (address, pool)
}

struct Catalog {
    branch_id: i64,
    mock_test_id: i64,
    question_ids: Vec<i64>,
    correct_answer_ids: Vec<i64>,
    wrong_answer_ids: Vec<i64>,
}

/// Seeds a branch, a category, `marks.len()` public questions (first option
/// correct) and a public mock test over them.
async fn seed_catalog(pool: &SqlitePool, marks: &[f64]) -> Catalog {
    let branch_id = sqlx::query(
        "INSERT INTO branches (name_en, name_np, slug) VALUES ('Nasu', 'नासु', 'nasu')",
    )
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid();

    let category_id = sqlx::query(
        "INSERT INTO categories (name_en, name_np, slug, scope_type)
         VALUES ('General Knowledge', 'सामान्य ज्ञान', 'general-knowledge', 'UNIVERSAL')",
    )
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid();

    let mock_test_id = sqlx::query(
        "INSERT INTO mock_tests (title_en, title_np, slug, branch_id, total_questions)
         VALUES ('Nasu First Paper', 'नासु पहिलो पत्र', 'nasu-first-paper', ?, ?)",
    )
    .bind(branch_id)
    .bind(marks.len() as i64)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid();

    let mut question_ids = Vec::new();
    let mut correct_answer_ids = Vec::new();
    let mut wrong_answer_ids = Vec::new();

    for (i, &mark) in marks.iter().enumerate() {
        let question_id = sqlx::query(
            "INSERT INTO questions (question_text_en, question_text_np, category_id, status)
             VALUES (?, ?, ?, 'PUBLIC')",
        )
        .bind(format!("Question {i}?"))
        .bind(format!("प्रश्न {i}?"))
        .bind(category_id)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid();

        for order in 0..4 {
            let answer_id = sqlx::query(
                "INSERT INTO answers
                    (question_id, answer_text_en, answer_text_np, is_correct, display_order)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(question_id)
            .bind(format!("Option {order}"))
            .bind(format!("विकल्प {order}"))
            .bind(order == 0)
            .bind(order)
            .execute(pool)
            .await
            .unwrap()
            .last_insert_rowid();

            if order == 0 {
                correct_answer_ids.push(answer_id);
            } else if order == 1 {
                wrong_answer_ids.push(answer_id);
            }
        }

        sqlx::query(
            "INSERT INTO mock_test_questions
                (mock_test_id, question_id, question_order, marks_allocated)
             VALUES (?, ?, ?, ?)",
        )
        .bind(mock_test_id)
        .bind(question_id)
        .bind(i as i64 + 1)
        .bind(mark)
        .execute(pool)
        .await
        .unwrap();

        question_ids.push(question_id);
    }

    Catalog {
        branch_id,
        mock_test_id,
        question_ids,
        correct_answer_ids,
        wrong_answer_ids,
    }
}

/// Registers a fresh user through the API and returns (username, token).
async fn register_and_login(client: &reqwest::Client, address: &str) -> (String, String) {
    let username = format!("u_{}", &uuid::Uuid::new_v4().to_string()[..8]);
    let password = "password123";

    let response = client
        .post(format!("{address}/api/auth/register"))
        .json(&serde_json::json!({ "username": username, "password": password }))
        .send()
        .await
        .expect("Register failed");
    assert_eq!(response.status().as_u16(), 201);

    let token = login(client, address, &username, password).await;
    (username, token)
}

async fn login(client: &reqwest::Client, address: &str, username: &str, password: &str) -> String {
    let body: serde_json::Value = client
        .post(format!("{address}/api/auth/login"))
        .json(&serde_json::json!({ "username": username, "password": password }))
        .send()
        .await
        .expect("Login failed")
        .json()
        .await
        .expect("Failed to parse login json");

    body["token"].as_str().expect("Token not found").to_string()
}

/// Seeds an admin user directly and logs in through the API.
async fn admin_token(pool: &SqlitePool, client: &reqwest::Client, address: &str) -> String {
    let password_hash = hash_password("admin_password_123").unwrap();
    sqlx::query("INSERT INTO users (username, password, role) VALUES ('admin', ?, 'admin')")
        .bind(password_hash)
        .execute(pool)
        .await
        .unwrap();

    login(client, address, "admin", "admin_password_123").await
}

#[tokio::test]
async fn health_check_404() {
    // Arrange
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .get(format!("{address}/random_path_that_does_not_exist"))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn register_fails_validation() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    // Act: Send a username that is too short
    let response = client
        .post(format!("{address}/api/auth/register"))
        .json(&serde_json::json!({ "username": "yo", "password": "password123" }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn register_rejects_duplicate_username() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let body = serde_json::json!({ "username": "gopal", "password": "password123" });

    let first = client
        .post(format!("{address}/api/auth/register"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status().as_u16(), 201);

    let second = client
        .post(format!("{address}/api/auth/register"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status().as_u16(), 409);
}

#[tokio::test]
async fn attempts_require_authentication() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{address}/api/attempts"))
        .json(&serde_json::json!({ "mock_test_id": 1 }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn admin_routes_reject_regular_users() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let (_, token) = register_and_login(&client, &address).await;

    let response = client
        .post(format!("{address}/api/admin/branches"))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "name_en": "Nasu", "name_np": "नासु" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn test_full_attempt_flow() {
    // Arrange: one 10-mark question in a mock test.
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let catalog = seed_catalog(&pool, &[10.0]).await;
    let (_, token) = register_and_login(&client, &address).await;

    // 1. Start the attempt
    let detail: serde_json::Value = client
        .post(format!("{address}/api/attempts"))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "mock_test_id": catalog.mock_test_id }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let attempt_id = detail["id"].as_i64().expect("attempt id");
    assert_eq!(detail["status"], "IN_PROGRESS");
    assert_eq!(detail["total_score"], 10.0);
    assert_eq!(detail["score_obtained"], 0.0);

    // 2. A duplicate session for the same test is rejected
    let duplicate = client
        .post(format!("{address}/api/attempts"))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "mock_test_id": catalog.mock_test_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status().as_u16(), 409);

    // 3. Submit the correct answer: full marks
    let response: serde_json::Value = client
        .post(format!("{address}/api/attempts/{attempt_id}/answers"))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "question_id": catalog.question_ids[0],
            "selected_answer_id": catalog.correct_answer_ids[0],
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(response["answer"]["is_correct"], true);
    assert_eq!(response["answer"]["is_skipped"], false);
    assert_eq!(response["score_obtained"], 10.0);

    // 4. Edit to a wrong answer: verdict flips, score drops
    let response: serde_json::Value = client
        .post(format!("{address}/api/attempts/{attempt_id}/answers"))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "question_id": catalog.question_ids[0],
            "selected_answer_id": catalog.wrong_answer_ids[0],
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(response["answer"]["is_correct"], false);
    assert_eq!(response["score_obtained"], 0.0);

    // 5. Complete: percentage finalized from the edited answer
    let completed: serde_json::Value = client
        .post(format!("{address}/api/attempts/{attempt_id}/complete"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(completed["status"], "COMPLETED");
    assert_eq!(completed["percentage"], 0.0);

    // 6. Completing again fails with a conflict, and the question counters
    //    were bumped exactly once
    let again = client
        .post(format!("{address}/api/attempts/{attempt_id}/complete"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(again.status().as_u16(), 409);

    let (attempted, correct): (i64, i64) = sqlx::query_as(
        "SELECT times_attempted, times_correct FROM questions WHERE id = ?",
    )
    .bind(catalog.question_ids[0])
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(attempted, 1);
    assert_eq!(correct, 0);

    // 7. The completion notification arrives (delivery is async, so poll)
    let mut notifications = Vec::new();
    for _ in 0..20 {
        let body: serde_json::Value = client
            .get(format!("{address}/api/notifications"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        notifications = body.as_array().cloned().unwrap_or_default();
        if !notifications.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["notification_type"], "ATTEMPT_COMPLETED");
}

#[tokio::test]
async fn answer_from_another_question_is_rejected() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let catalog = seed_catalog(&pool, &[5.0, 5.0]).await;
    let (_, token) = register_and_login(&client, &address).await;

    let detail: serde_json::Value = client
        .post(format!("{address}/api/attempts"))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "mock_test_id": catalog.mock_test_id }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let attempt_id = detail["id"].as_i64().unwrap();

    // Cross-question injection: question 0 with question 1's answer.
    let response = client
        .post(format!("{address}/api/attempts/{attempt_id}/answers"))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "question_id": catalog.question_ids[0],
            "selected_answer_id": catalog.correct_answer_ids[1],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    // Nothing was recorded.
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_answers")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_leaderboard_flow() {
    // Arrange: ten 10-mark questions.
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let catalog = seed_catalog(&pool, &[10.0; 10]).await;

    let (first_name, first_token) = register_and_login(&client, &address).await;
    let (second_name, second_token) = register_and_login(&client, &address).await;

    // First user answers 8 correctly (80), second 6 (60).
    for (token, correct) in [(&first_token, 8), (&second_token, 6)] {
        let detail: serde_json::Value = client
            .post(format!("{address}/api/attempts"))
            .bearer_auth(token)
            .json(&serde_json::json!({ "mock_test_id": catalog.mock_test_id }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let attempt_id = detail["id"].as_i64().unwrap();

        for i in 0..10 {
            let selected = if i < correct {
                catalog.correct_answer_ids[i]
            } else {
                catalog.wrong_answer_ids[i]
            };
            let response = client
                .post(format!("{address}/api/attempts/{attempt_id}/answers"))
                .bearer_auth(token)
                .json(&serde_json::json!({
                    "question_id": catalog.question_ids[i],
                    "selected_answer_id": selected,
                }))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status().as_u16(), 200);
        }

        let response = client
            .post(format!("{address}/api/attempts/{attempt_id}/complete"))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    // Admin triggers the monthly recalculation.
    let admin = admin_token(&pool, &client, &address).await;
    let response = client
        .post(format!("{address}/api/admin/leaderboard/recalculate"))
        .bearer_auth(&admin)
        .json(&serde_json::json!({
            "period": "MONTHLY",
            "branch_id": catalog.branch_id,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    // The board ranks the 80-scorer first, the 60-scorer second.
    let board: serde_json::Value = client
        .get(format!(
            "{address}/api/leaderboard?period=MONTHLY&branch={}",
            catalog.branch_id
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let rows = board.as_array().expect("leaderboard rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["rank"], 1);
    assert_eq!(rows[0]["username"], first_name.as_str());
    assert_eq!(rows[0]["total_score"], 80.0);
    assert_eq!(rows[1]["rank"], 2);
    assert_eq!(rows[1]["username"], second_name.as_str());
    assert_eq!(rows[1]["total_score"], 60.0);
}

#[tokio::test]
async fn practice_attempt_flow() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let catalog = seed_catalog(&pool, &[10.0, 10.0]).await;
    let (_, token) = register_and_login(&client, &address).await;

    // Practice mode: explicit question set, one mark each, no test binding.
    let detail: serde_json::Value = client
        .post(format!("{address}/api/attempts"))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "question_ids": catalog.question_ids }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(detail["mode"], "PRACTICE");
    assert_eq!(detail["mock_test_id"], serde_json::Value::Null);
    assert_eq!(detail["total_score"], 2.0);

    let attempt_id = detail["id"].as_i64().unwrap();

    // Skip the first question, answer the second.
    let response: serde_json::Value = client
        .post(format!("{address}/api/attempts/{attempt_id}/answers"))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "question_id": catalog.question_ids[0],
            "selected_answer_id": null,
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(response["answer"]["is_skipped"], true);
    assert_eq!(response["answer"]["is_correct"], false);

    let response: serde_json::Value = client
        .post(format!("{address}/api/attempts/{attempt_id}/answers"))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "question_id": catalog.question_ids[1],
            "selected_answer_id": catalog.correct_answer_ids[1],
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(response["score_obtained"], 1.0);

    let completed: serde_json::Value = client
        .post(format!("{address}/api/attempts/{attempt_id}/complete"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(completed["percentage"], 50.0);

    // Practice attempts never feed the leaderboard.
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM leaderboard_entries")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn abandoned_attempt_keeps_score_but_no_percentage() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let catalog = seed_catalog(&pool, &[10.0]).await;
    let (_, token) = register_and_login(&client, &address).await;

    let detail: serde_json::Value = client
        .post(format!("{address}/api/attempts"))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "mock_test_id": catalog.mock_test_id }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let attempt_id = detail["id"].as_i64().unwrap();

    client
        .post(format!("{address}/api/attempts/{attempt_id}/answers"))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "question_id": catalog.question_ids[0],
            "selected_answer_id": catalog.correct_answer_ids[0],
        }))
        .send()
        .await
        .unwrap();

    let abandoned: serde_json::Value = client
        .post(format!("{address}/api/attempts/{attempt_id}/abandon"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(abandoned["status"], "ABANDONED");
    assert_eq!(abandoned["score_obtained"], 10.0);
    assert_eq!(abandoned["percentage"], serde_json::Value::Null);

    // No submissions are accepted after the terminal state.
    let response = client
        .post(format!("{address}/api/attempts/{attempt_id}/answers"))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "question_id": catalog.question_ids[0],
            "selected_answer_id": catalog.wrong_answer_ids[0],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn questions_endpoint_hides_correct_answers() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    seed_catalog(&pool, &[5.0]).await;

    let questions: serde_json::Value = client
        .get(format!("{address}/api/questions"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let questions = questions.as_array().expect("question list");
    assert_eq!(questions.len(), 1);
    let answers = questions[0]["answers"].as_array().expect("answers");
    assert_eq!(answers.len(), 4);
    for answer in answers {
        assert!(
            answer.get("is_correct").is_none(),
            "correctness must not leak to clients"
        );
    }
}
