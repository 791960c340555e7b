use std::collections::HashMap;
use tracing::{debug, warn};

use super::password::verify_password;
use crate::config::AccountConfig;
use crate::error::{AppError, Result};

/// Exam takers and their assigned quizzes
#[derive(Debug, Clone, Default)]
pub struct ExamRoster {
    accounts: HashMap<String, AccountConfig>,
}

impl ExamRoster {
    pub fn new(accounts: &[AccountConfig]) -> Self {
        let mut map = HashMap::with_capacity(accounts.len());
        for account in accounts {
            if map.insert(account.username.clone(), account.clone()).is_some() {
                warn!("Duplicate account {}, keeping the last entry", account.username);
            }
        }
        Self { accounts: map }
    }

    /// Check credentials; returns the assigned quiz on success
    ///
    /// Argon2 verification is CPU-bound, so it runs on the blocking pool.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Option<String>> {
        if username.is_empty() || password.is_empty() {
            return Err(AppError::BadRequest(
                "Username and password are required.".to_string(),
            ));
        }

        let Some(account) = self.accounts.get(username).cloned() else {
            debug!("Login for unknown user {}", username);
            return Ok(None);
        };

        let password = password.to_string();
        let hash = account.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("Password check panicked: {}", e)))??;

        Ok(valid.then_some(account.quiz))
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::hash_password;

    fn roster() -> ExamRoster {
        ExamRoster::new(&[AccountConfig {
            username: "alice".to_string(),
            password_hash: hash_password("secret").unwrap(),
            quiz: "STEM".to_string(),
        }])
    }

    #[tokio::test]
    async fn test_authenticate() {
        let roster = roster();
        assert_eq!(roster.len(), 1);
        assert_eq!(
            roster.authenticate("alice", "secret").await.unwrap(),
            Some("STEM".to_string())
        );
        assert_eq!(roster.authenticate("alice", "wrong").await.unwrap(), None);
        assert_eq!(roster.authenticate("bob", "secret").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_credentials() {
        let roster = roster();
        assert!(matches!(
            roster.authenticate("", "secret").await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            roster.authenticate("alice", "").await,
            Err(AppError::BadRequest(_))
        ));
    }
}
