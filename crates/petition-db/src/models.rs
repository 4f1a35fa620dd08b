//! Database row types; these map directly to SQLite rows.
//! Distinct from petition-types API models to keep the DB layer independent.

use chrono::{DateTime, Utc};

pub struct UserRow {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub password: String,
    pub city: Option<String>,
    pub country: Option<String>,
    pub photo_filename: Option<String>,
}

pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub city: Option<&'a str>,
    pub country: Option<&'a str>,
}

/// Column updates for a user; `None` leaves the column untouched.
#[derive(Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

/// A petition joined with its author, category name and signature count.
pub struct PetitionRow {
    pub petition_id: i64,
    pub title: String,
    pub description: String,
    pub author_id: i64,
    pub author_name: Option<String>,
    pub author_city: Option<String>,
    pub author_country: Option<String>,
    pub category: Option<String>,
    pub signature_count: i64,
    pub created_date: DateTime<Utc>,
    pub closing_date: Option<DateTime<Utc>>,
}

pub struct NewPetition<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub author_id: i64,
    pub category_id: i64,
    pub created_date: DateTime<Utc>,
    pub closing_date: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct PetitionChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub closing_date: Option<DateTime<Utc>>,
}
