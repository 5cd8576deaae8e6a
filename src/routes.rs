// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, attempt, auth, branch, leaderboard, mock_test, notification, profile, question},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, catalog, attempts, leaderboard, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (database pool, config, partition locks).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let catalog_routes = Router::new()
        .route("/branches", get(branch::list_branches))
        .route("/branches/{id}/sub-branches", get(branch::list_sub_branches))
        .route("/categories", get(branch::list_categories))
        .route("/questions", get(question::list_questions))
        .route("/questions/{id}", get(question::get_question))
        .route("/mock-tests", get(mock_test::list_mock_tests))
        .route("/mock-tests/{id}", get(mock_test::get_mock_test));

    let attempt_routes = Router::new()
        .route("/", post(attempt::start_attempt).get(attempt::list_my_attempts))
        .route("/{id}", get(attempt::get_attempt))
        .route("/{id}/answers", post(attempt::submit_answer))
        .route("/{id}/complete", post(attempt::complete_attempt))
        .route("/{id}/abandon", post(attempt::abandon_attempt))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let leaderboard_routes = Router::new().route("/", get(leaderboard::get_leaderboard));

    let account_routes = Router::new()
        .route("/profile/me", get(profile::get_me).put(profile::update_me))
        .route("/notifications", get(notification::list_notifications))
        .route("/notifications/{id}/read", put(notification::mark_read))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/branches", post(admin::create_branch))
        .route("/branches/{id}/sub-branches", post(admin::create_sub_branch))
        .route("/categories", post(admin::create_category))
        .route("/questions", post(admin::create_question))
        .route(
            "/questions/{id}",
            put(admin::update_question).delete(admin::delete_question),
        )
        .route("/mock-tests", post(admin::create_mock_test))
        .route(
            "/leaderboard/recalculate",
            post(admin::recalculate_leaderboard),
        )
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api", catalog_routes)
        .nest("/api/attempts", attempt_routes)
        .nest("/api/leaderboard", leaderboard_routes)
        .nest("/api", account_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
