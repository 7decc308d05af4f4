use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A row of `users.csv`. Older files only carry `username,password,email`,
/// so everything after the password defaults to empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    /// bcrypt hash, or plaintext in rows written before hashing was added.
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub about: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
}

impl User {
    pub fn new(username: String, password_hash: String, email: Option<String>) -> Self {
        Self {
            username,
            password: password_hash,
            email,
            about: None,
            date_of_birth: None,
        }
    }

    pub fn has_hashed_password(&self) -> bool {
        self.password.starts_with("$2")
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            username: self.username.clone(),
            email: self.email.clone(),
            about: self.about.clone(),
            date_of_birth: self.date_of_birth,
        }
    }
}

/// The public view of a user; never carries the password.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    pub email: Option<String>,
    pub about: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    pub confirm_password: String,
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
}

/// Fields left as `None` are not changed.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub email: Option<String>,
    pub about: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub new_password: Option<String>,
}
