use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{SortBy, deserialize_timestamp};

// Request bodies are only deserialized after passing the schema validator,
// which has already stripped unknown properties.

// -- Users --

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user_id: i64,
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub current_password: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

impl ChangeUserRequest {
    /// True when nothing besides `currentPassword` was supplied.
    pub fn has_no_changes(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.password.is_none()
            && self.city.is_none()
            && self.country.is_none()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub city: Option<String>,
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

// -- Petitions --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePetitionRequest {
    pub title: String,
    pub description: String,
    pub category_id: i64,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub closing_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePetitionResponse {
    pub petition_id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchPetitionRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub closing_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub q: Option<String>,
    pub category_id: Option<i64>,
    pub author_id: Option<i64>,
    #[serde(default)]
    pub sort_by: SortBy,
    pub count: Option<i64>,
    pub start_index: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PetitionSummary {
    pub petition_id: i64,
    pub title: String,
    pub category: Option<String>,
    pub author_name: Option<String>,
    pub signature_count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PetitionDetail {
    pub petition_id: i64,
    pub title: String,
    pub category: Option<String>,
    pub author_name: Option<String>,
    pub author_id: i64,
    pub author_city: Option<String>,
    pub author_country: Option<String>,
    pub signature_count: i64,
    pub description: String,
    pub created_date: DateTime<Utc>,
    pub closing_date: Option<DateTime<Utc>>,
}

// -- Signatures --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureView {
    pub signatory_id: i64,
    pub name: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub signed_date: DateTime<Utc>,
}
