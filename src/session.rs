//! Bearer-token sessions.
//!
//! Handlers resolve the `Authorization` header into a [`Session`] and pass
//! it down explicitly; nothing about the logged-in user is kept globally.

use crate::error::{StoreError, StoreResult};
use axum::http::{header::AUTHORIZATION, HeaderMap};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// The caller of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub username: String,
    pub token: String,
}

struct SessionRecord {
    username: String,
    created_at: DateTime<Utc>,
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionRecord>>,
    ttl: Duration,
}

impl SessionRegistry {
    pub fn new(ttl_hours: i64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl: Duration::hours(ttl_hours),
        }
    }

    /// Issues a fresh token. Expired sessions nobody resolved again are
    /// dropped here.
    pub async fn start(&self, username: &str) -> Session {
        let token = Uuid::new_v4().to_string();
        let now = Utc::now();

        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, record| now - record.created_at <= self.ttl);
        sessions.insert(
            token.clone(),
            SessionRecord {
                username: username.to_string(),
                created_at: now,
            },
        );
        Session {
            username: username.to_string(),
            token,
        }
    }

    pub async fn resolve_token(&self, token: &str) -> StoreResult<Session> {
        let mut sessions = self.sessions.write().await;
        let record = sessions.get(token).ok_or(StoreError::Unauthenticated)?;

        if Utc::now() - record.created_at > self.ttl {
            sessions.remove(token);
            return Err(StoreError::Unauthenticated);
        }

        Ok(Session {
            username: record.username.clone(),
            token: token.to_string(),
        })
    }

    /// Resolves the bearer token in `headers`.
    pub async fn require(&self, headers: &HeaderMap) -> StoreResult<Session> {
        let token = bearer_token(headers).ok_or(StoreError::Unauthenticated)?;
        self.resolve_token(token).await
    }

    /// Like [`require`](Self::require), but a missing or stale token just
    /// means an anonymous viewer.
    pub async fn optional(&self, headers: &HeaderMap) -> Option<Session> {
        self.require(headers).await.ok()
    }

    pub async fn end(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn issued_tokens_resolve_until_logout() {
        let registry = SessionRegistry::new(24);
        let session = registry.start("asha").await;

        let resolved = registry.require(&headers_with(&session.token)).await.unwrap();
        assert_eq!(resolved, session);

        assert!(registry.end(&session.token).await);
        assert!(matches!(
            registry.require(&headers_with(&session.token)).await,
            Err(StoreError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn expired_tokens_are_rejected() {
        let registry = SessionRegistry::new(-1);
        let session = registry.start("asha").await;
        assert!(registry.resolve_token(&session.token).await.is_err());
    }

    #[tokio::test]
    async fn expired_sessions_are_purged_on_next_login() {
        let registry = SessionRegistry::new(-1);
        let stale = registry.start("asha").await;
        let fresh = registry.start("ravi").await;

        let sessions = registry.sessions.read().await;
        assert!(!sessions.contains_key(&stale.token));
        assert!(sessions.contains_key(&fresh.token));
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test]
    async fn missing_header_is_anonymous() {
        let registry = SessionRegistry::new(24);
        assert!(registry.optional(&HeaderMap::new()).await.is_none());

        let mut basic = HeaderMap::new();
        basic.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&basic).is_none());
    }
}
