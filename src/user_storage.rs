use crate::error::{StoreError, StoreResult};
use crate::table::CsvTable;
use crate::user_models::{ProfileUpdate, SignupRequest, User, UserProfile};
use std::path::PathBuf;
use tokio::sync::RwLock;

const MAX_USERNAME_CHARS: usize = 32;
const MIN_PASSWORD_CHARS: usize = 6;
const MAX_ABOUT_CHARS: usize = 500;

pub struct UserStorage {
    users: RwLock<CsvTable<User>>,
    bcrypt_cost: u32,
}

impl UserStorage {
    pub fn open(path: impl Into<PathBuf>, bcrypt_cost: u32) -> StoreResult<Self> {
        Ok(Self {
            users: RwLock::new(CsvTable::load(path)?),
            bcrypt_cost,
        })
    }

    pub async fn signup(&self, req: SignupRequest) -> StoreResult<UserProfile> {
        let username = req.username.trim();
        if username.is_empty() || req.password.is_empty() || req.confirm_password.is_empty() {
            return Err(StoreError::validation("Please fill in all sign-up fields"));
        }
        if username.chars().count() > MAX_USERNAME_CHARS
            || username.chars().any(char::is_whitespace)
        {
            return Err(StoreError::Validation(format!(
                "Username must be at most {} characters without spaces",
                MAX_USERNAME_CHARS
            )));
        }
        check_password(&req.password)?;
        if req.password != req.confirm_password {
            return Err(StoreError::validation("Passwords do not match"));
        }

        let hash = hash_password(&req.password, self.bcrypt_cost).await?;
        let email = req.email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty());
        let user = User::new(username.to_string(), hash, email);

        let mut users = self.users.write().await;
        if users.rows().iter().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict("Username already exists".to_string()));
        }
        users.append(user.clone())?;

        tracing::info!("Signed up {}", user.username);
        Ok(user.profile())
    }

    /// Verifies credentials. Plaintext passwords left over from older files
    /// are replaced by a hash on the first successful login.
    pub async fn authenticate(&self, username: &str, password: &str) -> StoreResult<UserProfile> {
        let user = {
            let users = self.users.read().await;
            users.rows().iter().find(|u| u.username == username).cloned()
        }
        .ok_or(StoreError::Unauthenticated)?;

        if user.has_hashed_password() {
            match verify_password(password, &user.password).await {
                Ok(true) => return Ok(user.profile()),
                Ok(false) => return Err(StoreError::Unauthenticated),
                // Not a real hash, just a plaintext password starting with `$2`.
                Err(StoreError::Hash(_)) => {}
                Err(e) => return Err(e),
            }
        }

        if user.password != password {
            return Err(StoreError::Unauthenticated);
        }

        let hash = hash_password(password, self.bcrypt_cost).await?;
        let mut users = self.users.write().await;
        let mut rows = users.rows().to_vec();
        if let Some(row) = rows
            .iter_mut()
            .find(|u| u.username == username && u.password == user.password)
        {
            row.password = hash;
            if let Err(e) = users.replace(rows) {
                tracing::warn!("Could not rehash legacy password for {}: {}", username, e);
            }
        }

        Ok(user.profile())
    }

    pub async fn get_profile(&self, username: &str) -> StoreResult<UserProfile> {
        let users = self.users.read().await;
        users
            .rows()
            .iter()
            .find(|u| u.username == username)
            .map(User::profile)
            .ok_or_else(|| StoreError::not_found("User"))
    }

    pub async fn update_profile(
        &self,
        username: &str,
        update: ProfileUpdate,
    ) -> StoreResult<UserProfile> {
        if let Some(about) = &update.about {
            if about.chars().count() > MAX_ABOUT_CHARS {
                return Err(StoreError::Validation(format!(
                    "About is longer than {} characters",
                    MAX_ABOUT_CHARS
                )));
            }
        }
        let new_hash = match &update.new_password {
            Some(password) => {
                check_password(password)?;
                Some(hash_password(password, self.bcrypt_cost).await?)
            }
            None => None,
        };

        let mut users = self.users.write().await;
        let mut rows = users.rows().to_vec();
        let user = rows
            .iter_mut()
            .find(|u| u.username == username)
            .ok_or_else(|| StoreError::not_found("User"))?;

        if let Some(email) = update.email {
            user.email = non_blank(email);
        }
        if let Some(about) = update.about {
            user.about = non_blank(about);
        }
        if let Some(dob) = update.date_of_birth {
            user.date_of_birth = Some(dob);
        }
        if let Some(hash) = new_hash {
            user.password = hash;
        }
        let profile = user.profile();

        users.replace(rows)?;
        tracing::info!("Updated profile for {}", username);
        Ok(profile)
    }
}

/// bcrypt is CPU-bound, so it runs on the blocking pool.
async fn hash_password(password: &str, cost: u32) -> StoreResult<String> {
    let password = password.to_string();
    Ok(tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??)
}

async fn verify_password(password: &str, hash: &str) -> StoreResult<bool> {
    let password = password.to_string();
    let hash = hash.to_string();
    Ok(tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await??)
}

fn check_password(password: &str) -> StoreResult<()> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(StoreError::Validation(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_CHARS
        )));
    }
    Ok(())
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
