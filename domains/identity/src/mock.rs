//! In-memory identity stores for tests
//!
//! Each store mirrors the guarded single-statement semantics of its Postgres
//! counterpart under one mutex.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use opsdeck_common::RepositoryError;
use uuid::Uuid;

use crate::domain::entities::{
    FailureRecord, LoginAttempt, Principal, PrincipalStatus, VerificationPurpose,
    VerificationToken,
};
use crate::repository::{LoginAttemptStore, PrincipalStore, TokenStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryPrincipalStore {
    principals: Arc<Mutex<HashMap<Uuid, Principal>>>,
}

impl InMemoryPrincipalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a principal
    pub fn insert(&self, principal: Principal) {
        lock(&self.principals).insert(principal.id, principal);
    }

    pub fn set_status(&self, id: Uuid, status: PrincipalStatus) {
        if let Some(principal) = lock(&self.principals).get_mut(&id) {
            principal.status = status;
        }
    }
}

#[async_trait::async_trait]
impl PrincipalStore for InMemoryPrincipalStore {
    async fn get(&self, id: Uuid) -> Result<Option<Principal>, RepositoryError> {
        Ok(lock(&self.principals).get(&id).cloned())
    }

    async fn record_failure(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        max_attempts: i32,
        lockout_until: DateTime<Utc>,
    ) -> Result<Option<FailureRecord>, RepositoryError> {
        let mut principals = lock(&self.principals);
        let Some(principal) = principals.get_mut(&id) else {
            return Ok(None);
        };
        if principal.is_disabled() || principal.is_locked_at(now) {
            return Ok(None);
        }

        principal.failed_attempts += 1;
        if principal.failed_attempts >= max_attempts {
            principal.lockout_until = Some(lockout_until);
            principal.status = PrincipalStatus::Locked;
        } else {
            principal.lockout_until = None;
        }
        principal.updated_at = now;

        Ok(Some(FailureRecord {
            failed_attempts: principal.failed_attempts,
            lockout_until: principal.lockout_until,
        }))
    }

    async fn record_success(&self, id: Uuid, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        if let Some(principal) = lock(&self.principals).get_mut(&id) {
            if !principal.is_disabled() {
                principal.failed_attempts = 0;
                principal.lockout_until = None;
                principal.status = PrincipalStatus::Active;
                principal.updated_at = now;
            }
        }
        Ok(())
    }

    async fn clear_lapsed_lockout(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut principals = lock(&self.principals);
        match principals.get_mut(&id) {
            Some(principal) if !principal.is_disabled() && principal.has_lapsed_lockout(now) => {
                principal.failed_attempts = 0;
                principal.lockout_until = None;
                principal.status = PrincipalStatus::Active;
                principal.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

type TokenKey = (String, VerificationPurpose, String);

#[derive(Debug, Clone, Default)]
pub struct InMemoryTokenStore {
    tokens: Arc<Mutex<HashMap<TokenKey, VerificationToken>>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.tokens).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Codes currently held for `identifier`, unordered
    pub fn codes_for(&self, identifier: &str) -> Vec<String> {
        lock(&self.tokens)
            .values()
            .filter(|t| t.identifier == identifier)
            .map(|t| t.code.clone())
            .collect()
    }

    fn key(identifier: &str, purpose: VerificationPurpose, code: &str) -> TokenKey {
        (identifier.to_string(), purpose, code.to_string())
    }
}

#[async_trait::async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn insert(&self, token: &VerificationToken) -> Result<(), RepositoryError> {
        let key = Self::key(&token.identifier, token.purpose, &token.code);
        let mut tokens = lock(&self.tokens);
        if tokens.contains_key(&key) {
            return Err(RepositoryError::AlreadyExists);
        }
        tokens.insert(key, token.clone());
        Ok(())
    }

    async fn consume(
        &self,
        identifier: &str,
        code: &str,
        purpose: VerificationPurpose,
        now: DateTime<Utc>,
    ) -> Result<Option<VerificationToken>, RepositoryError> {
        let key = Self::key(identifier, purpose, code);
        let mut tokens = lock(&self.tokens);
        match tokens.get(&key) {
            Some(token) if !token.is_expired_at(now) => Ok(tokens.remove(&key)),
            _ => Ok(None),
        }
    }

    async fn find(
        &self,
        identifier: &str,
        code: &str,
        purpose: VerificationPurpose,
    ) -> Result<Option<VerificationToken>, RepositoryError> {
        Ok(lock(&self.tokens)
            .get(&Self::key(identifier, purpose, code))
            .cloned())
    }

    async fn delete_for_purpose(
        &self,
        identifier: &str,
        purpose: VerificationPurpose,
    ) -> Result<u64, RepositoryError> {
        let mut tokens = lock(&self.tokens);
        let before = tokens.len();
        tokens.retain(|_, t| !(t.identifier == identifier && t.purpose == purpose));
        Ok((before - tokens.len()) as u64)
    }

    async fn delete_for_identifier(&self, identifier: &str) -> Result<u64, RepositoryError> {
        let mut tokens = lock(&self.tokens);
        let before = tokens.len();
        tokens.retain(|_, t| t.identifier != identifier);
        Ok((before - tokens.len()) as u64)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut tokens = lock(&self.tokens);
        let before = tokens.len();
        tokens.retain(|_, t| !t.is_expired_at(now));
        Ok((before - tokens.len()) as u64)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryLoginAttemptStore {
    attempts: Arc<Mutex<Vec<LoginAttempt>>>,
}

impl InMemoryLoginAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.attempts).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn attempts(&self) -> Vec<LoginAttempt> {
        lock(&self.attempts).clone()
    }
}

#[async_trait::async_trait]
impl LoginAttemptStore for InMemoryLoginAttemptStore {
    async fn append(&self, attempt: &LoginAttempt) -> Result<(), RepositoryError> {
        lock(&self.attempts).push(attempt.clone());
        Ok(())
    }

    async fn count_failures_since(
        &self,
        principal_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, RepositoryError> {
        Ok(lock(&self.attempts)
            .iter()
            .filter(|a| a.principal_id == principal_id && !a.succeeded && a.created_at >= since)
            .count() as i64)
    }
}
