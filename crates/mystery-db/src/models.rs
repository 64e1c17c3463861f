//! Database row types. These map directly to SQLite rows.
//! Distinct from mystery-types API models to keep the DB layer independent.

use chrono::{DateTime, Utc};

/// Password value stored for accounts created through an external sign-in
/// provider. It never parses as a password hash.
pub const EXTERNAL_PASSWORD: &str = "EXTERNAL_OAUTH";

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub verify_code: String,
    pub verify_code_expiry: String,
    pub is_verified: bool,
    pub is_accepting_messages: bool,
    pub created_at: String,
}

impl UserRow {
    pub fn is_external(&self) -> bool {
        self.password == EXTERNAL_PASSWORD
    }
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub reply: Option<String>,
    pub created_at: String,
}

/// Input for a local sign-up.
pub struct NewUser<'a> {
    pub id: &'a str,
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub verify_code: &'a str,
    pub verify_code_expiry: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// A fresh unverified account was inserted.
    Created,
    /// An unverified account with this email got a new password and code.
    Refreshed,
    UsernameTaken,
    EmailTaken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified,
    Expired,
    IncorrectCode,
    UserNotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    UserNotFound,
    NotAccepting,
}
