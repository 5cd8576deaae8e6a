// src/models/branch.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Represents the 'branches' table: a main examination branch
/// (e.g., Nasu, Kharidar, Engineering).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Branch {
    pub id: i64,
    pub name_en: String,
    pub name_np: String,
    pub slug: String,
    pub description_en: Option<String>,
    pub description_np: Option<String>,
    pub has_sub_branches: bool,
    pub display_order: i64,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
}

/// Represents the 'sub_branches' table: a specialization within a branch
/// (e.g., Civil Engineering under Engineering).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SubBranch {
    pub id: i64,
    pub branch_id: i64,
    pub name_en: String,
    pub name_np: String,
    pub slug: String,
    pub description_en: Option<String>,
    pub description_np: Option<String>,
    pub display_order: i64,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
}

/// Represents the 'categories' table. Scope decides which targets apply:
/// UNIVERSAL has none, BRANCH has a target branch, SUBBRANCH has both.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name_en: String,
    pub name_np: String,
    pub slug: String,
    pub description_en: Option<String>,
    pub description_np: Option<String>,
    pub scope_type: String,
    pub target_branch_id: Option<i64>,
    pub target_sub_branch_id: Option<i64>,
    pub display_order: i64,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBranchRequest {
    #[validate(length(min = 1, max = 255))]
    pub name_en: String,
    #[validate(length(min = 1, max = 255))]
    pub name_np: String,
    pub description_en: Option<String>,
    pub description_np: Option<String>,
    #[serde(default)]
    pub has_sub_branches: bool,
    #[serde(default)]
    pub display_order: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSubBranchRequest {
    #[validate(length(min = 1, max = 255))]
    pub name_en: String,
    #[validate(length(min = 1, max = 255))]
    pub name_np: String,
    pub description_en: Option<String>,
    pub description_np: Option<String>,
    #[serde(default)]
    pub display_order: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1, max = 255))]
    pub name_en: String,
    #[validate(length(min = 1, max = 255))]
    pub name_np: String,
    pub description_en: Option<String>,
    pub description_np: Option<String>,
    /// 'UNIVERSAL', 'BRANCH' or 'SUBBRANCH'; target requirements are
    /// checked against the scope in the handler.
    pub scope_type: String,
    pub target_branch_id: Option<i64>,
    pub target_sub_branch_id: Option<i64>,
    #[serde(default)]
    pub display_order: i64,
}

/// Derives a URL slug the way the original platform did: lowercase,
/// alphanumerics kept, runs of everything else collapsed to single hyphens.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_was_hyphen = true;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
