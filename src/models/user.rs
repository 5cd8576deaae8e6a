// src/models/user.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// Argon2 hash, never serialized to clients.
    #[serde(skip_serializing)]
    pub password: String,
    pub role: String,
    /// 'EN' or 'NP'.
    pub preferred_language: String,
    /// Branch the user is preparing for, if chosen.
    pub target_branch_id: Option<i64>,
    pub target_sub_branch_id: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

/// DTO for registration and login.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 3, max = 20))]
    pub username: String,
    #[validate(length(min = 8, max = 72))]
    pub password: String,
}

/// Current user's profile response.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: i64,
    pub username: String,
    pub role: String,
    pub preferred_language: String,
    pub target_branch_id: Option<i64>,
    pub target_sub_branch_id: Option<i64>,
    pub attempts_completed: i64,
    pub questions_answered: i64,
    pub correct_answers: i64,
    pub created_at: Option<DateTime<Utc>>,
}

/// DTO for updating the current user's profile.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(custom(function = validate_language))]
    pub preferred_language: Option<String>,
    pub target_branch_id: Option<i64>,
    pub target_sub_branch_id: Option<i64>,
}

fn validate_language(language: &str) -> Result<(), validator::ValidationError> {
    if language != "EN" && language != "NP" {
        return Err(validator::ValidationError::new("invalid_language"));
    }
    Ok(())
}
